//! Security Log Entry
//!
//! Immutable, timestamped record written to the encrypted log store.
//! Payload is free-form JSON so every component can log its own shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::logic::threat::{Severity, ThreatEvent};

// ============================================================================
// ENTRY TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    /// Classified threat from the monitor
    Threat,
    /// Countermeasure or vault action
    Action,
    Error,
    /// Unauthorized event in a protected folder
    FileAccess,
    /// Lifecycle and configuration changes
    Security,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Threat => "THREAT",
            LogType::Action => "ACTION",
            LogType::Error => "ERROR",
            LogType::FileAccess => "FILE_ACCESS",
            LogType::Security => "SECURITY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "THREAT" => Some(LogType::Threat),
            "ACTION" => Some(LogType::Action),
            "ERROR" => Some(LogType::Error),
            "FILE_ACCESS" => Some(LogType::FileAccess),
            "SECURITY" => Some(LogType::Security),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl From<Severity> for LogLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => LogLevel::Info,
            Severity::Medium => LogLevel::Warn,
            Severity::High => LogLevel::Critical,
        }
    }
}

// ============================================================================
// LOG ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

impl LogEntry {
    pub fn new(log_type: LogType, level: LogLevel, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            log_type,
            level,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn threat(event: &ThreatEvent) -> Self {
        let payload = serde_json::to_value(event).unwrap_or_else(|_| json!({ "id": event.id }));
        Self::new(LogType::Threat, event.severity.into(), payload)
    }

    /// Countermeasure / vault action, e.g. `action("lockdown_activated", json!({..}))`
    pub fn action(action: &str, detail: Value) -> Self {
        Self::new(
            LogType::Action,
            LogLevel::Warn,
            json!({ "action": action, "detail": detail }),
        )
    }

    pub fn error(context: &str, message: impl std::fmt::Display) -> Self {
        Self::new(
            LogType::Error,
            LogLevel::Error,
            json!({ "context": context, "message": message.to_string() }),
        )
    }

    pub fn file_access(path: &str, event_kind: &str, authorized: bool) -> Self {
        let level = if authorized { LogLevel::Debug } else { LogLevel::Critical };
        Self::new(
            LogType::FileAccess,
            level,
            json!({ "path": path, "event": event_kind, "authorized": authorized }),
        )
    }

    pub fn security(message: &str, detail: Value) -> Self {
        Self::new(
            LogType::Security,
            LogLevel::Info,
            json!({ "message": message, "detail": detail }),
        )
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Serialized form; the plaintext that gets encrypted per line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
