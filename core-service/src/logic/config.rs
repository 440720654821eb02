//! Application Configuration
//!
//! Loaded from `config.json` in the data directory when present; every field
//! falls back to the defaults in `constants.rs`. Environment overrides are
//! applied last.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use super::threat::RuleTable;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Threat monitor timing and heuristic tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub debugger_check_interval_secs: u64,
    /// Elapsed time above which the timing workload counts as stepped
    pub timing_threshold_us: u64,
    /// Iterations of the fixed-cost timing workload
    pub timing_workload_iterations: u32,
    /// Distance from the baseline that counts as one spike
    pub entropy_spike_delta: f64,
    /// Spikes needed (strictly more than) before ENTROPY_SPIKE fires
    pub entropy_spike_limit: u32,
    pub signal_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: constants::DEFAULT_POLL_INTERVAL_SECS,
            debugger_check_interval_secs: constants::DEFAULT_DEBUGGER_CHECK_INTERVAL_SECS,
            timing_threshold_us: constants::DEFAULT_TIMING_THRESHOLD_US,
            timing_workload_iterations: 10_000,
            entropy_spike_delta: 0.5,
            entropy_spike_limit: 3,
            signal_timeout_ms: constants::DEFAULT_SIGNAL_TIMEOUT_MS,
        }
    }
}

/// Vault behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub decoy_pool_size: usize,
    /// Extensions (without dot, lower-case) whose files are protected
    pub sensitive_extensions: Vec<String>,
    pub lock_ttl_secs: u64,
    pub own_write_grace_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            decoy_pool_size: constants::DEFAULT_DECOY_POOL_SIZE,
            sensitive_extensions: [
                "py", "js", "ts", "rs", "go", "java", "c", "cpp", "h", "cs", "rb", "php", "sh",
                "json", "yaml", "yml", "toml", "env", "ini", "cfg", "conf", "xml",
                "txt", "sql", "csv", "key", "pem",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            lock_ttl_secs: constants::VANISHING_LOCK_TTL_SECS,
            own_write_grace_ms: constants::OWN_WRITE_GRACE_MS,
        }
    }
}

impl VaultConfig {
    pub fn is_sensitive(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.sensitive_extensions
                    .iter()
                    .any(|s| s.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }
}

/// Encrypted log store limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogStoreConfig {
    pub max_file_size: u64,
    pub max_files: usize,
    pub rotation_check_secs: u64,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            max_file_size: constants::DEFAULT_MAX_LOG_FILE_SIZE,
            max_files: constants::DEFAULT_MAX_LOG_FILES,
            rotation_check_secs: constants::LOG_ROTATION_CHECK_SECS,
        }
    }
}

/// Countermeasure ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountermeasureConfig {
    pub lockdown_duration_secs: u64,
    /// Enter lockdown automatically when the level reaches RED
    pub auto_lockdown: bool,
    /// Phrases that start the panic ladder (case-insensitive)
    pub emergency_passphrases: Vec<String>,
    /// Phrase that additionally triggers self-obliteration
    pub destruct_passphrase: String,
}

impl Default for CountermeasureConfig {
    fn default() -> Self {
        Self {
            lockdown_duration_secs: constants::DEFAULT_LOCKDOWN_SECS,
            auto_lockdown: true,
            emergency_passphrases: vec![
                "red sky at morning".to_string(),
                "the eagle has landed".to_string(),
            ],
            destruct_passphrase: "burn after reading".to_string(),
        }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub rules: RuleTable,
    pub vault: VaultConfig,
    pub log_store: LogStoreConfig,
    pub countermeasures: CountermeasureConfig,
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Load, falling back to defaults on a broken file, then apply env overrides.
    pub fn load_or_default(path: &Path) -> Self {
        let mut config = Self::load(path).unwrap_or_else(|e| {
            log::warn!("Ignoring config {}: {} - using defaults", path.display(), e);
            Self::default()
        });
        config.apply_env_overrides();
        config
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(secs) = constants::get_poll_interval() {
            self.monitor.poll_interval_secs = secs;
        }
        if let Some(secs) = constants::get_lockdown_secs() {
            self.countermeasures.lockdown_duration_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.monitor.poll_interval_secs, 5);
        assert_eq!(config.monitor.debugger_check_interval_secs, 10);
        assert_eq!(config.countermeasures.lockdown_duration_secs, 300);
        assert_eq!(config.vault.decoy_pool_size, 50);
        assert_eq!(config.log_store.max_files, 10);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("config.json")).unwrap();
        assert!(config.countermeasures.auto_lockdown);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"countermeasures": {"lockdown_duration_secs": 60}}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.countermeasures.lockdown_duration_secs, 60);
        assert!(!config.countermeasures.emergency_passphrases.is_empty());
        assert_eq!(config.monitor.poll_interval_secs, 5);
    }

    #[test]
    fn test_save_load_keeps_rules() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.rules.suspicious_patterns.push("custom-sniffer".to_string());
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert!(loaded.rules.suspicious_patterns.contains(&"custom-sniffer".to_string()));
    }

    #[test]
    fn test_sensitive_extensions() {
        let vault = VaultConfig::default();
        assert!(vault.is_sensitive(Path::new("/proj/a.py")));
        assert!(vault.is_sensitive(Path::new("/proj/SETTINGS.JSON")));
        assert!(!vault.is_sensitive(Path::new("/proj/readme.md")));
        assert!(!vault.is_sensitive(Path::new("/proj/a.py.vault")));
        assert!(!vault.is_sensitive(Path::new("/proj/Makefile")));
    }
}
