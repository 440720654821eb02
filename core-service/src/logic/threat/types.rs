//! Threat Types
//!
//! Core types cho threat pipeline.
//! KHÔNG chứa logic - chỉ data structures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// THREAT KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatKind {
    /// Timing workload ran slower than expected
    DebuggerDetected,
    /// Running process matched a suspicious pattern
    SuspiciousProcess,
    /// Visible window title matched a suspicious pattern
    SuspiciousWindow,
    /// Virtualization indicator in the system descriptor or process list
    VmDetected,
    /// Repeated fluctuation of the entropy proxy
    EntropySpike,
    /// Unattributed file event in a protected folder, or a tampered vault record
    FileAccessAttempt,
    /// Reported from outside the monitor (command surface)
    Manual,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::DebuggerDetected => "DEBUGGER_DETECTED",
            ThreatKind::SuspiciousProcess => "SUSPICIOUS_PROCESS",
            ThreatKind::SuspiciousWindow => "SUSPICIOUS_WINDOW",
            ThreatKind::VmDetected => "VM_DETECTED",
            ThreatKind::EntropySpike => "ENTROPY_SPIKE",
            ThreatKind::FileAccessAttempt => "FILE_ACCESS_ATTEMPT",
            ThreatKind::Manual => "MANUAL",
        }
    }
}

impl std::fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SECURITY LEVEL
// ============================================================================

/// Coarse system posture, derived from the threat history only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    #[default]
    Green,
    Yellow,
    Red,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Green => "GREEN",
            SecurityLevel::Yellow => "YELLOW",
            SecurityLevel::Red => "RED",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            SecurityLevel::Green => "#10b981",
            SecurityLevel::Yellow => "#f59e0b",
            SecurityLevel::Red => "#ef4444",
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// THREAT EVENT
// ============================================================================

/// Classified threat observation. Immutable once reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub id: String,
    pub kind: ThreatKind,
    pub severity: Severity,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl ThreatEvent {
    pub fn new(kind: ThreatKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            severity,
            description: description.into(),
            timestamp: Utc::now(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}
