//! Protected folder set
//!
//! Active folders map 1:1 to running watches. Folders whose watch could not
//! be started at load time stay "dormant": persisted, listed, not watched,
//! and activated again by a later `add`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use notify::RecommendedWatcher;

use super::watch::{start_watch, WatchSender};
use super::VaultError;

pub struct ProtectedFolders {
    file: PathBuf,
    tx: WatchSender,
    active: BTreeMap<PathBuf, RecommendedWatcher>,
    dormant: BTreeSet<PathBuf>,
}

/// Persisted folder list; missing or unreadable file means none.
pub fn load_folder_list(file: &Path) -> Vec<PathBuf> {
    let content = match fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("[Vault] Cannot read {:?}: {}", file, e);
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<PathBuf>>(&content) {
        Ok(list) => list,
        Err(e) => {
            log::warn!("[Vault] Ignoring malformed folder list {:?}: {}", file, e);
            Vec::new()
        }
    }
}

impl ProtectedFolders {
    pub fn new(file: PathBuf, tx: WatchSender) -> Self {
        Self {
            file,
            tx,
            active: BTreeMap::new(),
            dormant: BTreeSet::new(),
        }
    }

    /// Start watches for the persisted list. Failures are logged per folder.
    pub fn restore(&mut self) -> usize {
        for folder in load_folder_list(&self.file) {
            if !folder.is_absolute() {
                log::warn!("[Vault] Skipping relative folder entry {:?}", folder);
                continue;
            }
            match start_watch(&folder, self.tx.clone()) {
                Ok(watcher) => {
                    self.active.insert(folder, watcher);
                }
                Err(e) => {
                    log::warn!("[Vault] Watch failed for {:?}, keeping it dormant: {}", folder, e);
                    self.dormant.insert(folder);
                }
            }
        }
        log::info!(
            "[Vault] Restored {} protected folders ({} dormant)",
            self.active.len(),
            self.dormant.len()
        );
        self.active.len()
    }

    /// Add and watch `folder`. `Ok(false)` when it was already watched.
    pub fn add(&mut self, folder: &Path) -> Result<bool, VaultError> {
        if !folder.is_absolute() {
            return Err(VaultError::NotAbsolute(folder.to_path_buf()));
        }
        if self.active.contains_key(folder) {
            return Ok(false);
        }
        if !folder.is_dir() {
            return Err(VaultError::NotADirectory(folder.to_path_buf()));
        }

        let watcher = start_watch(folder, self.tx.clone()).map_err(|e| VaultError::Watch {
            path: folder.to_path_buf(),
            message: e.to_string(),
        })?;
        self.dormant.remove(folder);
        self.active.insert(folder.to_path_buf(), watcher);
        self.persist();
        Ok(true)
    }

    /// Stop watching and forget `folder`. `false` when it was not in the set.
    pub fn remove(&mut self, folder: &Path) -> bool {
        // Dropping the watcher stops it
        let was_active = self.active.remove(folder).is_some();
        let was_dormant = self.dormant.remove(folder);
        if was_active || was_dormant {
            self.persist();
            true
        } else {
            false
        }
    }

    /// Write active + dormant folders. Failure is logged, state unchanged.
    fn persist(&self) {
        let list: Vec<&PathBuf> = self.active.keys().chain(self.dormant.iter()).collect();
        let result = serde_json::to_vec_pretty(&list)
            .map_err(std::io::Error::from)
            .and_then(|json| {
                let tmp = self.file.with_extension("json.tmp");
                fs::write(&tmp, json)?;
                fs::rename(&tmp, &self.file)
            });
        if let Err(e) = result {
            log::error!("[Vault] Failed to persist protected folders: {}", e);
        }
    }

    pub fn active(&self) -> Vec<PathBuf> {
        self.active.keys().cloned().collect()
    }

    pub fn dormant(&self) -> Vec<PathBuf> {
        self.dormant.iter().cloned().collect()
    }

    pub fn watch_count(&self) -> usize {
        self.active.len()
    }

    /// Protected folder containing `path`, if any
    pub fn owner_of(&self, path: &Path) -> Option<&Path> {
        self.active
            .keys()
            .find(|folder| path.starts_with(folder))
            .map(PathBuf::as_path)
    }

    /// Drop every watch; the persisted list is kept.
    pub fn stop_all(&mut self) -> usize {
        let count = self.active.len();
        let stopped: Vec<PathBuf> = std::mem::take(&mut self.active).into_keys().collect();
        self.dormant.extend(stopped);
        count
    }
}
