//! Encrypted Log Store
//!
//! Append-only writer for security log entries. Each entry is encrypted on
//! its own (fresh IV, independent log key) and written as one JSON line, so
//! a damaged line never costs more than that entry.
//!
//! Files: `security_YYYYMMDD_HHMMSS_mmm.log`, size-rotated, newest
//! `max_files` retained by the timestamp in the name.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use super::event::LogEntry;
use crate::logic::config::LogStoreConfig;
use crate::logic::crypto::{Cipher, CryptoError, EncryptedBlob, SecretKey};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Associated data bound to every log line
pub const LOG_AAD: &[u8] = b"guardian-log/v1";

const FILE_PREFIX: &str = "security_";
const FILE_EXT: &str = ".log";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    #[error("log store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("log entry encryption: {0}")]
    Crypto(#[from] CryptoError),

    #[error("log entry serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// FILE NAMING
// ============================================================================

fn file_name(stamp: DateTime<Utc>) -> String {
    format!(
        "{}{}_{:03}{}",
        FILE_PREFIX,
        stamp.format(STAMP_FORMAT),
        stamp.timestamp_subsec_millis(),
        FILE_EXT
    )
}

/// Timestamp encoded in a log file name, `None` for foreign files.
pub fn parse_file_stamp(name: &str) -> Option<DateTime<Utc>> {
    let body = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_EXT)?;
    let (head, millis) = body.rsplit_once('_')?;
    if millis.len() != 3 {
        return None;
    }
    let millis: i64 = millis.parse().ok()?;
    let naive = NaiveDateTime::parse_from_str(head, STAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive) + chrono::Duration::milliseconds(millis))
}

/// Log files in `dir`, oldest first by parsed timestamp.
pub fn list_log_files(dir: &Path) -> std::io::Result<Vec<(DateTime<Utc>, PathBuf)>> {
    let mut files = Vec::new();
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let stamp = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_file_stamp);
            if let Some(stamp) = stamp {
                files.push((stamp, path));
            }
        }
    }
    files.sort();
    Ok(files)
}

// ============================================================================
// STORE
// ============================================================================

struct ActiveFile {
    path: PathBuf,
    stamp: DateTime<Utc>,
    writer: BufWriter<File>,
    size: u64,
}

/// Result of reading the whole store
#[derive(Debug, Clone, Default)]
pub struct LogReadout {
    pub entries: Vec<LogEntry>,
    /// Lines that failed to parse, authenticate or deserialize
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStoreStats {
    pub entries_written: u64,
    pub current_file: Option<String>,
    pub file_count: usize,
    pub directory: String,
}

pub struct EncryptedLogStore {
    dir: PathBuf,
    config: LogStoreConfig,
    cipher: Cipher,
    active: Mutex<Option<ActiveFile>>,
    entries_written: AtomicU64,
}

impl EncryptedLogStore {
    /// Open the store in `dir`. The first file is created on first append.
    pub fn open(dir: PathBuf, key: &SecretKey, config: LogStoreConfig) -> Result<Self, LogStoreError> {
        fs::create_dir_all(&dir)?;
        let store = Self {
            dir,
            config,
            cipher: Cipher::new(key, LOG_AAD),
            active: Mutex::new(None),
            entries_written: AtomicU64::new(0),
        };
        store.enforce_retention()?;
        log::info!("[LogStore] Opened {:?}", store.dir);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open a fresh file, never reusing or preceding an existing name
    fn open_new_file(&self, after: Option<DateTime<Utc>>) -> std::io::Result<ActiveFile> {
        let mut stamp = Utc::now().trunc_subsecs(3);
        let newest = list_log_files(&self.dir)?.last().map(|(s, _)| *s);
        for floor in [after, newest].into_iter().flatten() {
            if stamp <= floor {
                stamp = floor + chrono::Duration::milliseconds(1);
            }
        }
        while self.dir.join(file_name(stamp)).exists() {
            stamp += chrono::Duration::milliseconds(1);
        }

        let path = self.dir.join(file_name(stamp));
        let file = OpenOptions::new().create_new(true).append(true).open(&path)?;
        log::info!("[LogStore] Opened security log: {:?}", path);
        Ok(ActiveFile {
            path,
            stamp,
            writer: BufWriter::new(file),
            size: 0,
        })
    }

    /// Encrypt and append one entry.
    pub fn append(&self, entry: &LogEntry) -> Result<(), LogStoreError> {
        let blob = self.cipher.seal(entry.to_json().as_bytes())?;
        let line = serde_json::to_string(&blob)?;

        let mut guard = self.active.lock();
        let needs_new = match guard.as_ref() {
            None => true,
            Some(active) => active.size >= self.config.max_file_size,
        };
        if needs_new {
            self.rotate_locked(&mut guard)?;
        }

        if let Some(active) = guard.as_mut() {
            active.writer.write_all(line.as_bytes())?;
            active.writer.write_all(b"\n")?;
            active.writer.flush()?;
            active.size += line.len() as u64 + 1;
        }

        self.entries_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Best-effort append: failures go to the process log only.
    pub fn record(&self, entry: LogEntry) {
        if let Err(e) = self.append(&entry) {
            log::error!("[LogStore] Failed to record {} entry: {}", entry.log_type, e);
        }
    }

    fn rotate_locked(&self, guard: &mut Option<ActiveFile>) -> Result<(), LogStoreError> {
        let previous = guard.take();
        let after = match previous {
            Some(mut old) => {
                old.writer.flush()?;
                log::info!("[LogStore] Rotating {:?} ({} bytes)", old.path, old.size);
                Some(old.stamp)
            }
            None => None,
        };
        *guard = Some(self.open_new_file(after)?);
        self.enforce_retention()?;
        Ok(())
    }

    /// Rotate now when the active file reached the size limit.
    pub fn rotate_if_needed(&self) -> Result<bool, LogStoreError> {
        let mut guard = self.active.lock();
        let full = guard
            .as_ref()
            .map_or(false, |a| a.size >= self.config.max_file_size);
        if full {
            self.rotate_locked(&mut guard)?;
        }
        Ok(full)
    }

    /// Keep only the newest `max_files` files.
    fn enforce_retention(&self) -> std::io::Result<()> {
        let files = list_log_files(&self.dir)?;
        let keep = self.config.max_files.max(1);
        if files.len() <= keep {
            return Ok(());
        }
        let excess = files.len() - keep;
        for (_, path) in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => log::info!("[LogStore] Retention removed {:?}", path),
                Err(e) => log::warn!("[LogStore] Failed to remove {:?}: {}", path, e),
            }
        }
        Ok(())
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Decrypt every retained entry, oldest file first.
    pub fn read_all(&self) -> Result<LogReadout, LogStoreError> {
        if let Some(active) = self.active.lock().as_mut() {
            active.writer.flush()?;
        }

        let mut readout = LogReadout::default();
        for (_, path) in list_log_files(&self.dir)? {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    log::warn!("[LogStore] Cannot read {:?}: {}", path, e);
                    continue;
                }
            };
            for line in BufReader::new(file).lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(_) => {
                        readout.skipped += 1;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match self.decode_line(&line) {
                    Some(entry) => readout.entries.push(entry),
                    None => readout.skipped += 1,
                }
            }
        }

        if readout.skipped > 0 {
            log::warn!("[LogStore] Skipped {} unreadable log lines", readout.skipped);
        }
        Ok(readout)
    }

    fn decode_line(&self, line: &str) -> Option<LogEntry> {
        let blob: EncryptedBlob = serde_json::from_str(line).ok()?;
        let plain = self.cipher.open(&blob).ok()?;
        serde_json::from_slice(&plain).ok()
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Periodic rotation check until shutdown.
    pub async fn run_rotation(self: std::sync::Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.rotation_check_secs.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.rotate_if_needed() {
                        log::error!("[LogStore] Rotation check failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    pub fn entries_written(&self) -> u64 {
        self.entries_written.load(Ordering::SeqCst)
    }

    pub fn current_file(&self) -> Option<PathBuf> {
        self.active.lock().as_ref().map(|a| a.path.clone())
    }

    pub fn stats(&self) -> LogStoreStats {
        LogStoreStats {
            entries_written: self.entries_written(),
            current_file: self.current_file().map(|p| p.to_string_lossy().to_string()),
            file_count: list_log_files(&self.dir).map(|f| f.len()).unwrap_or(0),
            directory: self.dir.to_string_lossy().to_string(),
        }
    }

    /// Flush and close the active file.
    pub fn shutdown(&self) {
        if let Some(mut active) = self.active.lock().take() {
            let _ = active.writer.flush();
            log::info!(
                "[LogStore] Closed. Total entries this session: {}",
                self.entries_written()
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
