//! Encrypted Vault
//!
//! Owns the vault key and everything the agent does to protected data:
//! sealing files (AES-256-GCM record beside the file, decoy cover in place),
//! decrypting to the ephemeral area, decoys, ghosts, vanishing locks and
//! the protected-folder watches.
//!
//! ## Structure
//! - `folders`: protected folder set + persistence
//! - `watch`: notify watches, own-write ledger
//! - `decoy`: decoy pool and generator
//! - `ghost`: ghost markers
//! - `locks`: vanishing locks

pub mod decoy;
pub mod folders;
pub mod ghost;
pub mod locks;
pub mod watch;


use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::Event;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch as watch_channel};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::logic::config::VaultConfig;
use crate::logic::crypto::{Cipher, CryptoError, EncryptedBlob, SecretKey};
use crate::logic::layout::DataLayout;
use crate::logic::telemetry::{EncryptedLogStore, LogEntry};
use crate::logic::threat::{Sensitivity, Severity, ThreatEvent, ThreatKind, ThreatMonitor};

pub use decoy::{DecoyFile, DecoyGenerator, DecoyKind, DecoyPool, TemplateDecoyGenerator};
pub use folders::ProtectedFolders;
pub use locks::{VanishingLock, VanishingLocks};
pub use watch::RecentPaths;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Associated data bound to every sealed file
pub const VAULT_AAD: &[u8] = b"guardian-vault/v1";

const RECORD_EXT: &str = "vault";
const RECORD_VERSION: u32 = 1;
const VM_DECOY_NAME: &str = "vm_settings.vmx";

/// Honey files planted by `activate_decoy_files`, one per family
const HONEY_FILES: [(&str, DecoyKind); 3] = [
    ("deploy_helper.py", DecoyKind::Script),
    ("service_credentials.json", DecoyKind::Config),
    ("access_notes.txt", DecoyKind::Text),
];

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("path must be absolute: {0:?}")]
    NotAbsolute(PathBuf),

    #[error("not a directory: {0:?}")]
    NotADirectory(PathBuf),

    #[error("no vault record for {0:?}")]
    NotFound(PathBuf),

    #[error("watch failed for {path:?}: {message}")]
    Watch { path: PathBuf, message: String },

    #[error("vault I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("vault record: {0}")]
    Record(#[from] serde_json::Error),
}

/// On-disk `<name>.vault` record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedRecord {
    pub version: u32,
    pub original_name: String,
    pub sealed_at: DateTime<Utc>,
    pub blob: EncryptedBlob,
    /// SHA-256 of the cover currently occupying the original path
    pub cover_digest: String,
}

pub fn record_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}", name, RECORD_EXT))
}

/// `name` when it is a bare file name; the record is outside the AEAD, so a
/// path here means the record was edited.
fn plain_file_name(name: &str) -> Option<&str> {
    let file_name = Path::new(name).file_name()?;
    (file_name == name && name != "." && name != "..").then_some(name)
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Counts from `apply_standard_protections`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProtectionSummary {
    pub locks: usize,
    pub ghosts: usize,
}

// ============================================================================
// VAULT
// ============================================================================

pub struct EncryptedVault {
    layout: DataLayout,
    config: VaultConfig,
    cipher: Cipher,
    monitor: Arc<ThreatMonitor>,
    log: Arc<EncryptedLogStore>,
    folders: Mutex<ProtectedFolders>,
    decoys: DecoyPool,
    ghosts: Mutex<HashSet<PathBuf>>,
    planted: Mutex<HashSet<PathBuf>>,
    locks: Arc<VanishingLocks>,
    own_writes: Arc<RecentPaths>,
    reported: RecentPaths,
    /// temp plaintext path -> record it came from
    ephemeral: Mutex<HashMap<PathBuf, PathBuf>>,
    watch_rx: Mutex<Option<watch::WatchReceiver>>,
}

impl EncryptedVault {
    /// Key, folders + watches, decoy pool. Key failure is fatal.
    /// Expects `layout.ensure()` to have run.
    pub fn initialize(
        layout: DataLayout,
        config: VaultConfig,
        generator: Arc<dyn DecoyGenerator>,
        monitor: Arc<ThreatMonitor>,
        log: Arc<EncryptedLogStore>,
    ) -> Result<Self, VaultError> {
        let key = SecretKey::load_or_generate(&layout.vault_key_file())?;
        let grace = Duration::from_millis(config.own_write_grace_ms);
        let own_writes = Arc::new(RecentPaths::new(grace));
        let locks = Arc::new(VanishingLocks::new(
            Duration::from_secs(config.lock_ttl_secs),
            Arc::clone(&own_writes),
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let mut folders = ProtectedFolders::new(layout.folders_file(), tx);
        folders.restore();

        let decoys = DecoyPool::materialize(&layout.decoy_dir(), config.decoy_pool_size, generator)?;

        log.record(LogEntry::security(
            "vault_initialized",
            json!({ "folders": folders.active(), "dormant": folders.dormant(), "decoys": decoys.len() }),
        ));

        Ok(Self {
            cipher: Cipher::new(&key, VAULT_AAD),
            layout,
            config,
            monitor,
            log,
            folders: Mutex::new(folders),
            decoys,
            ghosts: Mutex::new(HashSet::new()),
            planted: Mutex::new(HashSet::new()),
            locks,
            own_writes,
            reported: RecentPaths::new(grace),
            ephemeral: Mutex::new(HashMap::new()),
            watch_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn decoy_pool(&self) -> &DecoyPool {
        &self.decoys
    }

    // ========================================================================
    // PROTECTED FOLDERS
    // ========================================================================

    /// Idempotent add. Returns whether the active set changed.
    pub fn add_protected_folder(&self, folder: &Path) -> Result<bool, VaultError> {
        let changed = self.folders.lock().add(folder)?;
        if changed {
            log::info!("[Vault] Protecting {:?}", folder);
            self.log.record(LogEntry::security("folder_added", json!({ "path": folder })));
        }
        Ok(changed)
    }

    /// Idempotent remove. Returns whether the set changed.
    pub fn remove_protected_folder(&self, folder: &Path) -> bool {
        let changed = self.folders.lock().remove(folder);
        if changed {
            log::info!("[Vault] No longer protecting {:?}", folder);
            self.log.record(LogEntry::security("folder_removed", json!({ "path": folder })));
        }
        changed
    }

    pub fn protected_folders(&self) -> Vec<PathBuf> {
        self.folders.lock().active()
    }

    pub fn dormant_folders(&self) -> Vec<PathBuf> {
        self.folders.lock().dormant()
    }

    pub fn watch_count(&self) -> usize {
        self.folders.lock().watch_count()
    }

    /// Sensitive regular files directly inside `folder`
    pub fn sensitive_files(&self, folder: &Path) -> Vec<PathBuf> {
        let entries = match fs::read_dir(folder) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("[Vault] Cannot list {:?}: {}", folder, e);
                return Vec::new();
            }
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && self.config.is_sensitive(p))
            .collect();
        files.sort();
        files
    }

    // ========================================================================
    // SEAL / UNSEAL
    // ========================================================================

    fn read_record(&self, record_path: &Path) -> Result<SealedRecord, VaultError> {
        let content = fs::read(record_path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn write_own(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        self.own_writes.note(path);
        fs::write(path, bytes)
    }

    /// True when `path` currently holds the cover recorded in its vault record.
    pub fn is_sealed(&self, path: &Path) -> bool {
        let record_path = record_path_for(path);
        if !record_path.exists() {
            return false;
        }
        match (self.read_record(&record_path), fs::read(path)) {
            (Ok(record), Ok(current)) => digest(&current) == record.cover_digest,
            _ => false,
        }
    }

    /// Replace the bytes at `path`, keeping an existing record's cover digest
    /// in step so the file still counts as sealed.
    fn write_cover(&self, path: &Path, bytes: &[u8]) -> Result<(), VaultError> {
        let record_path = record_path_for(path);
        let sealed = self.is_sealed(path);
        self.write_own(path, bytes)?;
        if sealed {
            let mut record = self.read_record(&record_path)?;
            record.cover_digest = digest(bytes);
            self.write_own(&record_path, &serde_json::to_vec_pretty(&record)?)?;
        }
        Ok(())
    }

    /// Seal `path`: record beside it, decoy cover in place.
    /// `Ok(false)` when the file is already sealed.
    pub fn encrypt_file(&self, path: &Path) -> Result<bool, VaultError> {
        if self.is_sealed(path) {
            return Ok(false);
        }
        let plaintext = fs::read(path).map_err(|e| {
            log::warn!("[Vault] Cannot read {:?} for sealing: {}", path, e);
            e
        })?;

        let blob = self.cipher.seal(&plaintext)?;
        let cover = self.decoys.content_for(DecoyKind::for_path(path));
        let record = SealedRecord {
            version: RECORD_VERSION,
            original_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            sealed_at: Utc::now(),
            blob,
            cover_digest: digest(&cover),
        };

        // Record first: a crash in between leaves plaintext + record, never cover alone
        self.write_own(&record_path_for(path), &serde_json::to_vec_pretty(&record)?)?;
        self.write_own(path, &cover)?;
        self.ghosts.lock().remove(path);

        log::info!("[Vault] Sealed {:?}", path);
        self.log.record(LogEntry::action("file_encrypted", json!({ "path": path })));
        Ok(true)
    }

    /// Decrypt to the ephemeral directory.
    ///
    /// `Ok(None)` on a tampered or unreadable record (reported as a threat),
    /// `Err(NotFound)` when there is no record.
    pub fn decrypt_file(&self, path: &Path) -> Result<Option<PathBuf>, VaultError> {
        let record_path = if path.extension().map_or(false, |e| e == RECORD_EXT) {
            path.to_path_buf()
        } else {
            record_path_for(path)
        };
        if !record_path.is_file() {
            return Err(VaultError::NotFound(path.to_path_buf()));
        }

        let opened = self.read_record(&record_path).and_then(|record| {
            let name = plain_file_name(&record.original_name).ok_or_else(|| {
                CryptoError::Malformed(format!("record name {:?}", record.original_name))
            })?;
            Ok((self.cipher.open(&record.blob)?, name.to_string()))
        });
        let (plaintext, name) = match opened {
            Ok(v) => v,
            Err(VaultError::Io(e)) => return Err(VaultError::Io(e)),
            Err(e) => {
                self.report_tamper(&record_path, &e);
                return Ok(None);
            }
        };

        let temp = self
            .layout
            .ephemeral_dir()
            .join(format!("{}_{}", Uuid::new_v4().simple(), name));
        fs::write(&temp, &plaintext)?;
        self.ephemeral.lock().insert(temp.clone(), record_path.clone());

        self.log.record(LogEntry::action(
            "file_decrypted",
            json!({ "record": record_path, "temp": temp }),
        ));
        Ok(Some(temp))
    }

    fn report_tamper(&self, record_path: &Path, error: &VaultError) {
        log::error!("[Vault] Record {:?} failed to open: {}", record_path, error);
        self.log.record(LogEntry::error("decrypt_file", error));
        self.monitor.report_threat(
            ThreatEvent::new(
                ThreatKind::FileAccessAttempt,
                Severity::High,
                format!("Vault record rejected: {}", record_path.display()),
            )
            .with_detail("path", record_path.display())
            .with_detail("reason", "tamper"),
        );
    }

    /// Seal every sensitive file in every protected folder.
    pub fn seal_all(&self) -> usize {
        let mut sealed = 0;
        for folder in self.protected_folders() {
            sealed += self.seal_folder(&folder);
        }
        sealed
    }

    pub fn seal_folder(&self, folder: &Path) -> usize {
        let mut sealed = 0;
        for file in self.sensitive_files(folder) {
            match self.encrypt_file(&file) {
                Ok(true) => sealed += 1,
                Ok(false) => {}
                Err(e) => {
                    log::warn!("[Vault] Failed to seal {:?}: {}", file, e);
                    self.log.record(LogEntry::error("encrypt_file", &e));
                }
            }
        }
        sealed
    }

    // ========================================================================
    // DECOYS / GHOSTS
    // ========================================================================

    /// Overwrite sensitive files directly in `folder` with fresh decoy
    /// content. Destructive.
    pub fn replace_with_decoys(&self, folder: &Path) -> Result<usize, VaultError> {
        if !folder.is_dir() {
            return Err(VaultError::NotADirectory(folder.to_path_buf()));
        }
        let mut replaced = 0;
        for file in self.sensitive_files(folder) {
            let content = self.decoys.fresh(DecoyKind::for_path(&file));
            match self.write_cover(&file, &content) {
                Ok(()) => replaced += 1,
                Err(e) => log::warn!("[Vault] Decoy replacement failed for {:?}: {}", file, e),
            }
        }
        log::warn!("[Vault] Replaced {} files in {:?} with decoys", replaced, folder);
        self.log.record(LogEntry::action(
            "replaced_with_decoys",
            json!({ "folder": folder, "files": replaced }),
        ));
        Ok(replaced)
    }

    pub fn create_ghost(&self, path: &Path) -> Result<(), VaultError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.write_cover(path, &ghost::marker(&name, Utc::now()))?;
        self.ghosts.lock().insert(path.to_path_buf());
        log::debug!("[Vault] Ghosted {:?}", path);
        Ok(())
    }

    pub fn is_ghost(&self, path: &Path) -> bool {
        self.ghosts.lock().contains(path)
    }

    /// Overwrite every sensitive file in every protected folder with decoy
    /// content, then plant one honey file per family where missing.
    /// Returns files rewritten plus files planted.
    pub fn activate_decoy_files(&self) -> usize {
        let mut replaced = 0;
        let mut planted = 0;
        for folder in self.protected_folders() {
            match self.replace_with_decoys(&folder) {
                Ok(n) => replaced += n,
                Err(e) => log::warn!("[Vault] Decoy replacement skipped {:?}: {}", folder, e),
            }
            for (name, kind) in HONEY_FILES {
                let path = folder.join(name);
                if path.exists() {
                    continue;
                }
                match self.write_own(&path, &self.decoys.content_for(kind)) {
                    Ok(()) => {
                        self.planted.lock().insert(path);
                        planted += 1;
                    }
                    Err(e) => log::warn!("[Vault] Failed to plant {:?}: {}", path, e),
                }
            }
        }
        log::info!("[Vault] Decoys active: {} replaced, {} planted", replaced, planted);
        self.log.record(LogEntry::action(
            "decoys_activated",
            json!({ "replaced": replaced, "planted": planted }),
        ));
        replaced + planted
    }

    /// VM-flavored decoys in every protected folder and High sensitivity.
    pub fn activate_vm_protections(&self) -> usize {
        let mut planted = 0;
        for folder in self.protected_folders() {
            let path = folder.join(VM_DECOY_NAME);
            if path.exists() {
                continue;
            }
            match self.write_own(&path, decoy::vm_settings(rand::random()).as_bytes()) {
                Ok(()) => {
                    self.planted.lock().insert(path);
                    planted += 1;
                }
                Err(e) => log::warn!("[Vault] Failed to plant {:?}: {}", path, e),
            }
        }
        self.monitor.set_sensitivity(Sensitivity::High);
        log::warn!("[Vault] VM protections active ({} decoys)", planted);
        self.log.record(LogEntry::action("vm_protections_activated", json!({ "files": planted })));
        planted
    }

    pub fn planted_decoys(&self) -> Vec<PathBuf> {
        self.planted.lock().iter().cloned().collect()
    }

    /// Lock every sensitive file; ghost the ones already sealed.
    pub fn apply_standard_protections(&self) -> ProtectionSummary {
        let mut summary = ProtectionSummary::default();
        for folder in self.protected_folders() {
            for file in self.sensitive_files(&folder) {
                match self.locks.create(&file) {
                    Ok(_) => summary.locks += 1,
                    Err(e) => log::warn!("[Vault] Lock failed for {:?}: {}", file, e),
                }
                if self.is_sealed(&file) && !self.is_ghost(&file) {
                    match self.create_ghost(&file) {
                        Ok(()) => summary.ghosts += 1,
                        Err(e) => log::warn!("[Vault] Ghost failed for {:?}: {}", file, e),
                    }
                }
            }
        }
        log::info!(
            "[Vault] Standard protections: {} locks, {} ghosts",
            summary.locks,
            summary.ghosts
        );
        self.log.record(LogEntry::action("standard_protections_applied", json!(summary)));
        summary
    }

    // ========================================================================
    // LOCKS
    // ========================================================================

    pub fn create_vanishing_lock(&self, path: &Path) -> Result<VanishingLock, VaultError> {
        Ok(self.locks.create(path)?)
    }

    pub fn release_vanishing_lock(&self, path: &Path) -> bool {
        self.locks.release(path)
    }

    /// Lock every sensitive file in every protected folder.
    pub fn lock_all(&self) -> usize {
        let mut locked = 0;
        for folder in self.protected_folders() {
            for file in self.sensitive_files(&folder) {
                if self.locks.create(&file).is_ok() {
                    locked += 1;
                }
            }
        }
        locked
    }

    pub fn release_all_locks(&self) -> usize {
        self.locks.release_all()
    }

    pub fn active_locks(&self) -> Vec<VanishingLock> {
        self.locks.active()
    }

    // ========================================================================
    // WATCH EVENTS
    // ========================================================================

    /// Classify one watch event. Returns the threats it produced.
    pub fn handle_watch_event(&self, event: &Event) -> Vec<ThreatEvent> {
        let Some(kind) = watch::change_kind(&event.kind) else {
            return Vec::new();
        };

        let mut threats = Vec::new();
        for path in &event.paths {
            if self.own_writes.contains(path) || self.layout.contains(path) {
                continue;
            }
            let folder = match self.folders.lock().owner_of(path) {
                Some(f) => f.to_path_buf(),
                None => continue,
            };
            if self.reported.contains(path) {
                continue;
            }
            self.reported.note(path);

            log::warn!("[Vault] Unauthorized {} on {:?}", kind, path);
            self.log.record(LogEntry::file_access(&path.to_string_lossy(), kind, false));
            let threat = ThreatEvent::new(
                ThreatKind::FileAccessAttempt,
                Severity::High,
                format!("Unauthorized {} in protected folder: {}", kind, path.display()),
            )
            .with_detail("path", path.display())
            .with_detail("folder", folder.display())
            .with_detail("event", kind);
            self.monitor.report_threat(threat.clone());

            // Block is advisory: recorded, not enforced by the OS
            self.log.record(LogEntry::action(
                "access_blocked",
                json!({ "path": path, "event": kind, "enforced": false }),
            ));
            threats.push(threat);
        }
        threats
    }

    /// Drain watch events until shutdown. Only the first call gets the channel.
    pub fn spawn_watch_handler(
        self: &Arc<Self>,
        mut shutdown: watch_channel::Receiver<bool>,
    ) -> Option<JoinHandle<()>> {
        let mut rx = self.watch_rx.lock().take()?;
        let vault = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => {
                            vault.handle_watch_event(&event);
                        }
                        None => break,
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            log::info!("[Vault] Watch handler stopped");
        }))
    }

    // ========================================================================
    // CLEANUP
    // ========================================================================

    /// Delete decrypted temp files (tracked ones and strays).
    pub fn wipe_ephemeral(&self) -> usize {
        let tracked: Vec<PathBuf> = self.ephemeral.lock().drain().map(|(temp, _)| temp).collect();
        let mut removed = 0;
        for temp in tracked {
            if fs::remove_file(&temp).is_ok() {
                removed += 1;
            }
        }
        removed + clear_dir(&self.layout.ephemeral_dir())
    }

    /// Empty the cache directory and forget in-memory bookkeeping.
    pub fn clear_caches(&self) -> usize {
        self.own_writes.clear();
        self.reported.clear();
        clear_dir(&self.layout.cache_dir())
    }

    pub fn ephemeral_files(&self) -> Vec<PathBuf> {
        self.ephemeral.lock().keys().cloned().collect()
    }

    /// Stop watches, delete ephemeral files, release locks.
    pub fn shutdown(&self) {
        let watches = self.folders.lock().stop_all();
        let wiped = self.wipe_ephemeral();
        let locks = self.locks.release_all();
        log::info!(
            "[Vault] Shutdown: {} watches stopped, {} temp files wiped, {} locks released",
            watches,
            wiped,
            locks
        );
    }
}

/// Remove every entry inside `dir`, keeping `dir` itself.
pub(crate) fn clear_dir(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return 0,
    };
    let mut removed = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("[Vault] Failed to remove {:?}: {}", path, e),
        }
    }
    removed
}
