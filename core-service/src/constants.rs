//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Runtime overrides come from environment variables or `config.json`.

use std::path::PathBuf;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Guardian";

/// Directory name under the platform data dir
pub const DATA_DIR_NAME: &str = "guardian";

/// Main scan period (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Debugger timing check period (seconds)
pub const DEFAULT_DEBUGGER_CHECK_INTERVAL_SECS: u64 = 10;

/// Debugger timing threshold (microseconds)
pub const DEFAULT_TIMING_THRESHOLD_US: u64 = 1_000;

/// Per-call timeout at the signal source boundary (milliseconds)
pub const DEFAULT_SIGNAL_TIMEOUT_MS: u64 = 2_000;

/// Rolling threat history capacity
pub const THREAT_HISTORY_CAPACITY: usize = 100;

/// Automatic lockdown expiry (seconds)
pub const DEFAULT_LOCKDOWN_SECS: u64 = 300;

/// Vanishing lock lifetime (seconds)
pub const VANISHING_LOCK_TTL_SECS: u64 = 30;

/// Decoy pool size materialized at startup
pub const DEFAULT_DECOY_POOL_SIZE: usize = 50;

/// Log rotation ceiling (10 MB)
pub const DEFAULT_MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated log files kept on disk
pub const DEFAULT_MAX_LOG_FILES: usize = 10;

/// Background rotation check period (seconds)
pub const LOG_ROTATION_CHECK_SECS: u64 = 300;

/// Grace window in which a watch event on a path the agent just touched
/// counts as the agent's own (milliseconds)
pub const OWN_WRITE_GRACE_MS: u64 = 5_000;

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get data directory from environment or use the platform default
pub fn get_data_dir() -> PathBuf {
    std::env::var("GUARDIAN_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DATA_DIR_NAME)
        })
}

/// Get poll interval from environment, if set
pub fn get_poll_interval() -> Option<u64> {
    std::env::var("GUARDIAN_POLL_INTERVAL")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|secs| *secs > 0)
}

/// Get lockdown duration from environment, if set
pub fn get_lockdown_secs() -> Option<u64> {
    std::env::var("GUARDIAN_LOCKDOWN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|secs| *secs > 0)
}
