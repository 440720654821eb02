//! Vanishing locks
//!
//! A lock is a hidden `.<name>.vlock` sidecar next to the protected file,
//! removed again after its TTL or on release. Advisory only: nothing stops a
//! process from opening the file while the sidecar exists.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use super::watch::RecentPaths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VanishingLock {
    pub path: PathBuf,
    pub lock_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub signature: String,
}

struct LockSlot {
    lock: VanishingLock,
    expiry: Option<JoinHandle<()>>,
}

pub fn lock_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.vlock", name))
}

fn signature_for(path: &Path) -> String {
    let mut nonce = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(path.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

pub struct VanishingLocks {
    ttl: Duration,
    own_writes: Arc<RecentPaths>,
    slots: Mutex<HashMap<PathBuf, LockSlot>>,
}

impl VanishingLocks {
    pub fn new(ttl: Duration, own_writes: Arc<RecentPaths>) -> Self {
        Self {
            ttl,
            own_writes,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Lock `path`. An existing lock is kept and returned as is.
    ///
    /// Expiry needs a tokio runtime; outside one the lock lives until released.
    pub fn create(self: &Arc<Self>, path: &Path) -> std::io::Result<VanishingLock> {
        if let Some(slot) = self.slots.lock().get(path) {
            return Ok(slot.lock.clone());
        }

        let lock = VanishingLock {
            path: path.to_path_buf(),
            lock_path: lock_path_for(path),
            created_at: Utc::now(),
            signature: signature_for(path),
        };
        self.own_writes.note(&lock.lock_path);
        fs::write(&lock.lock_path, serde_json::to_vec_pretty(&lock)?)?;

        let expiry = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let locks = Arc::clone(self);
                let path = lock.path.clone();
                let signature = lock.signature.clone();
                let ttl = self.ttl;
                Some(handle.spawn(async move {
                    tokio::time::sleep(ttl).await;
                    locks.expire(&path, &signature);
                }))
            }
            Err(_) => {
                log::warn!("[Vault] No runtime, lock on {:?} will not expire", path);
                None
            }
        };

        let mut slots = self.slots.lock();
        // Lost a race with a concurrent create: keep the first lock
        if let Some(existing) = slots.get(path) {
            if let Some(task) = expiry {
                task.abort();
            }
            return Ok(existing.lock.clone());
        }
        slots.insert(
            path.to_path_buf(),
            LockSlot {
                lock: lock.clone(),
                expiry,
            },
        );
        log::debug!("[Vault] Vanishing lock on {:?}", path);
        Ok(lock)
    }

    fn expire(&self, path: &Path, signature: &str) {
        let removed = {
            let mut slots = self.slots.lock();
            match slots.get(path) {
                Some(slot) if slot.lock.signature == signature => slots.remove(path),
                _ => None,
            }
        };
        if let Some(slot) = removed {
            self.delete_sidecar(&slot.lock.lock_path);
            log::debug!("[Vault] Lock on {:?} expired", path);
        }
    }

    /// Cancel the timer and delete the sidecar. Returns false when unlocked.
    pub fn release(&self, path: &Path) -> bool {
        let removed = self.slots.lock().remove(path);
        match removed {
            Some(slot) => {
                if let Some(task) = slot.expiry {
                    task.abort();
                }
                self.delete_sidecar(&slot.lock.lock_path);
                true
            }
            None => false,
        }
    }

    pub fn release_all(&self) -> usize {
        let slots: Vec<LockSlot> = self.slots.lock().drain().map(|(_, s)| s).collect();
        let count = slots.len();
        for slot in slots {
            if let Some(task) = slot.expiry {
                task.abort();
            }
            self.delete_sidecar(&slot.lock.lock_path);
        }
        count
    }

    fn delete_sidecar(&self, lock_path: &Path) {
        self.own_writes.note(lock_path);
        if let Err(e) = fs::remove_file(lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("[Vault] Failed to remove lock file {:?}: {}", lock_path, e);
            }
        }
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.slots.lock().contains_key(path)
    }

    pub fn active(&self) -> Vec<VanishingLock> {
        self.slots.lock().values().map(|s| s.lock.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }
}
