//! Commands - API cho UI / CLI bridge
//!
//! Mỗi command trả về `CommandResult<T>`: lỗi là dữ liệu, không phải panic.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::logic::context::AppContext;
use crate::logic::response::{LockdownReport, PanicTrigger};
use crate::logic::telemetry::{self, ExportFormat, LogEntry, LogQuery, LogStoreStats};
use crate::logic::threat::{SecurityLevel, Sensitivity, Severity, ThreatEvent, ThreatKind};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for CommandResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e),
        }
    }
}

/// Tổng quan trạng thái bảo mật
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStatus {
    pub level: SecurityLevel,
    pub color: &'static str,
    pub locked_down: bool,
    pub panic_mode: bool,
    pub network_disabled: bool,
    pub sensitivity: Sensitivity,
    pub protected_folders: Vec<PathBuf>,
    pub dormant_folders: Vec<PathBuf>,
    pub active_locks: usize,
    pub recent_threats: Vec<ThreatEvent>,
    pub log: LogStoreStats,
}

const STATUS_RECENT_THREATS: usize = 10;

// ============================================================================
// STATUS & LOCKDOWN
// ============================================================================

pub async fn get_security_status(ctx: &AppContext) -> CommandResult<SecurityStatus> {
    let level = ctx.monitor.security_level();
    CommandResult::ok(SecurityStatus {
        level,
        color: level.color(),
        locked_down: ctx.controller.is_locked_down(),
        panic_mode: ctx.controller.is_panic_mode(),
        network_disabled: ctx.controller.is_network_disabled(),
        sensitivity: ctx.monitor.sensitivity(),
        protected_folders: ctx.vault.protected_folders(),
        dormant_folders: ctx.vault.dormant_folders(),
        active_locks: ctx.vault.active_locks().len(),
        recent_threats: ctx.monitor.recent_threats(STATUS_RECENT_THREATS),
        log: ctx.log.stats(),
    })
}

/// `data` is `None` when lockdown was already active.
pub async fn activate_lockdown(ctx: &AppContext) -> CommandResult<Option<LockdownReport>> {
    ctx.log.record(LogEntry::security("lockdown_requested", json!({ "source": "command" })));
    CommandResult::ok(ctx.controller.activate_lockdown())
}

pub async fn deactivate_lockdown(ctx: &AppContext) -> CommandResult<bool> {
    CommandResult::ok(ctx.controller.deactivate_lockdown())
}

// ============================================================================
// THREATS
// ============================================================================

/// Most recent first
pub async fn get_threat_log(ctx: &AppContext, limit: Option<usize>) -> CommandResult<Vec<ThreatEvent>> {
    let limit = limit.unwrap_or(crate::constants::THREAT_HISTORY_CAPACITY);
    CommandResult::ok(ctx.monitor.recent_threats(limit))
}

/// Report an externally observed threat. Returns the level after the report.
pub async fn report_threat(
    ctx: &AppContext,
    kind: ThreatKind,
    severity: Severity,
    description: String,
) -> CommandResult<SecurityLevel> {
    let event = ThreatEvent::new(kind, severity, description).with_detail("source", "command");
    CommandResult::ok(ctx.monitor.report_threat(event))
}

/// Feed typed or observed text through the passphrase check.
pub async fn submit_input(ctx: &AppContext, text: String) -> CommandResult<Option<PanicTrigger>> {
    CommandResult::ok(ctx.controller.inspect_input(&text))
}

// ============================================================================
// FOLDERS
// ============================================================================

pub async fn add_protected_folder(ctx: &AppContext, path: String) -> CommandResult<bool> {
    let result = ctx.vault.add_protected_folder(&PathBuf::from(&path));
    if let Err(e) = &result {
        log::warn!("[Command] add_protected_folder({}) failed: {}", path, e);
    }
    result.into()
}

pub async fn remove_protected_folder(ctx: &AppContext, path: String) -> CommandResult<bool> {
    CommandResult::ok(ctx.vault.remove_protected_folder(&PathBuf::from(path)))
}

// ============================================================================
// SECURITY LOG
// ============================================================================

pub async fn query_security_log(ctx: &AppContext, query: LogQuery) -> CommandResult<Vec<LogEntry>> {
    telemetry::query(&ctx.log, &query).into()
}

/// Returns the number of exported entries.
pub async fn export_security_log(
    ctx: &AppContext,
    query: LogQuery,
    format: ExportFormat,
    path: String,
) -> CommandResult<usize> {
    let result = telemetry::export_to_file(&ctx.log, &query, format, &PathBuf::from(&path));
    if let Ok(count) = &result {
        log::info!("[Command] Exported {} log entries to {}", count, path);
        ctx.log.record(LogEntry::action(
            "security_log_exported",
            json!({ "path": path, "entries": count }),
        ));
    }
    result.into()
}
