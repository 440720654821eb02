//! Persisted State Layout
//!
//! Everything the agent keeps on disk lives under one data directory:
//!
//! ```text
//! <root>/
//!   keys/vault.key          vault key (hex)
//!   keys/log.key            log store key (hex, independent)
//!   protected_folders.json  JSON array of absolute paths
//!   security_logs/          rotated encrypted log files
//!   decoys/                 decoy pool
//!   emergency/              plain fallback procedures
//!   ephemeral/              decrypted temp files (wiped on shutdown)
//!   cache/  logs/  crash/   scratch areas wiped by the panic ladder
//!   config.json             optional overrides
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const EMERGENCY_README: &str = "\
GUARDIAN EMERGENCY PROCEDURES
=============================

These files are intentionally stored in plain text so they can be used
when the agent itself is not running.

1. Stop the agent:            run kill_agent.sh (or end the guardian-core process)
2. Recover sealed files:      every protected file has a `<name>.vault` record next
                              to it; start the agent and use the decrypt command
3. Vault key location:        keys/vault.key in this data directory
4. Remove stale lock markers: delete any `.<name>.vlock` files in protected folders
";

const KILL_AGENT_SCRIPT: &str = "#!/bin/sh\n\
# Stops every running guardian-core process.\n\
pkill -f guardian-core || true\n";

/// Resolved paths of the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn vault_key_file(&self) -> PathBuf {
        self.keys_dir().join("vault.key")
    }

    pub fn log_key_file(&self) -> PathBuf {
        self.keys_dir().join("log.key")
    }

    pub fn folders_file(&self) -> PathBuf {
        self.root.join("protected_folders.json")
    }

    pub fn security_log_dir(&self) -> PathBuf {
        self.root.join("security_logs")
    }

    pub fn decoy_dir(&self) -> PathBuf {
        self.root.join("decoys")
    }

    pub fn emergency_dir(&self) -> PathBuf {
        self.root.join("emergency")
    }

    pub fn ephemeral_dir(&self) -> PathBuf {
        self.root.join("ephemeral")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Plain (non-security) application logs
    pub fn app_log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn crash_dir(&self) -> PathBuf {
        self.root.join("crash")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Create every required directory. Failure here aborts initialization.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            self.root.clone(),
            self.keys_dir(),
            self.security_log_dir(),
            self.decoy_dir(),
            self.emergency_dir(),
            self.ephemeral_dir(),
            self.cache_dir(),
            self.app_log_dir(),
            self.crash_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Write the plain emergency procedures if they are missing.
    pub fn ensure_emergency_scripts(&self) -> io::Result<()> {
        let dir = self.emergency_dir();
        let readme = dir.join("README.txt");
        if !readme.exists() {
            fs::write(&readme, EMERGENCY_README)?;
        }

        let script = dir.join("kill_agent.sh");
        if !script.exists() {
            fs::write(&script, KILL_AGENT_SCRIPT)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&script, fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(())
    }

    /// True if `path` is inside the data directory.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}
