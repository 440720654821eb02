//! Panic ladder helpers
//!
//! Passphrase detection, the fabricated crash report and process termination.
//! The ladder itself is driven by the controller.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::logic::config::CountermeasureConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanicTrigger {
    /// Any configured emergency passphrase
    Emergency,
    /// The destruct passphrase: full ladder plus self-obliteration
    Destruct,
}

impl PanicTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanicTrigger::Emergency => "emergency",
            PanicTrigger::Destruct => "destruct",
        }
    }
}

/// Case-insensitive substring match. The destruct phrase is checked first.
pub fn detect_passphrase(text: &str, config: &CountermeasureConfig) -> Option<PanicTrigger> {
    let text = text.to_lowercase();
    let hit = |phrase: &str| {
        let phrase = phrase.trim().to_lowercase();
        !phrase.is_empty() && text.contains(&phrase)
    };

    if hit(&config.destruct_passphrase) {
        return Some(PanicTrigger::Destruct);
    }
    if config.emergency_passphrases.iter().any(|p| hit(p)) {
        return Some(PanicTrigger::Emergency);
    }
    None
}

// ============================================================================
// TERMINATION
// ============================================================================

/// Ends the process. Injected so the ladder can be exercised in tests.
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Default terminator: `std::process::exit`
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, code: i32) {
        log::logger().flush();
        std::process::exit(code);
    }
}

// ============================================================================
// SIMULATED CRASH
// ============================================================================

pub const CRASH_TITLE: &str = "Application Error";
pub const CRASH_MESSAGE: &str =
    "The application encountered an unexpected error and must close. (0xC0000005)";

/// Write a fabricated crash log into `dir`.
pub fn write_crash_report(dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let now = Utc::now();
    let path = dir.join(format!("crash_{}.log", now.format("%Y%m%d_%H%M%S")));
    let report = format!(
        "Crash report generated {}\n\
         Exception: EXCEPTION_ACCESS_VIOLATION (0xC0000005)\n\
         Faulting module: libcore_render.so+0x3f2a1\n\
         Thread 0 crashed:\n\
         \x20 #0 0x00007f3a12c4e2a1 render_frame\n\
         \x20 #1 0x00007f3a12c4d0f8 event_loop_dispatch\n\
         \x20 #2 0x00007f3a12c41c33 main\n\
         Memory: heap corrupted, state not recoverable\n",
        now.to_rfc3339()
    );
    fs::write(&path, report)?;
    Ok(path)
}

/// Autostart / persistence entries that self-obliteration asks to remove
pub fn persistence_entries() -> Vec<String> {
    let mut entries = Vec::new();
    if let Some(config) = dirs::config_dir() {
        entries.push(config.join("autostart").join("guardian.desktop").display().to_string());
    }
    if let Some(home) = dirs::home_dir() {
        entries.push(
            home.join("Library/LaunchAgents/com.guardian.agent.plist")
                .display()
                .to_string(),
        );
    }
    entries.push("HKCU\\Software\\Microsoft\\Windows\\CurrentVersion\\Run\\Guardian".to_string());
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generic_passphrase_is_emergency() {
        let config = CountermeasureConfig::default();
        assert_eq!(
            detect_passphrase("Notes - RED SKY AT MORNING.txt", &config),
            Some(PanicTrigger::Emergency)
        );
    }

    #[test]
    fn test_destruct_passphrase_wins() {
        let config = CountermeasureConfig {
            emergency_passphrases: vec!["burn".to_string()],
            ..Default::default()
        };
        // Also contains the emergency phrase "burn"
        assert_eq!(
            detect_passphrase("please Burn After Reading", &config),
            Some(PanicTrigger::Destruct)
        );
    }

    #[test]
    fn test_no_match_and_empty_phrases() {
        let config = CountermeasureConfig {
            emergency_passphrases: vec![String::new(), "  ".to_string()],
            destruct_passphrase: String::new(),
            ..Default::default()
        };
        assert_eq!(detect_passphrase("anything at all", &config), None);
        assert_eq!(detect_passphrase("", &CountermeasureConfig::default()), None);
    }

    #[test]
    fn test_crash_report_written() {
        let dir = TempDir::new().unwrap();
        let path = write_crash_report(dir.path()).unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(fs::read_to_string(path).unwrap().contains("EXCEPTION_ACCESS_VIOLATION"));
    }
}
