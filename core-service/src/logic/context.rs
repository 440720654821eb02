//! Application Context
//!
//! Built once at startup; every component is shared by `Arc` from here.
//! `start()` spawns the background loops, `shutdown()` stops them.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::logic::config::AppConfig;
use crate::logic::crypto::{CryptoError, SecretKey};
use crate::logic::events::Notifier;
use crate::logic::layout::DataLayout;
use crate::logic::response::{CountermeasureController, ProcessTerminator, Terminator};
use crate::logic::telemetry::{EncryptedLogStore, LogEntry, LogStoreError};
use crate::logic::threat::{SignalSource, SysinfoSignalSource, ThreatMonitor};
use crate::logic::vault::{DecoyGenerator, EncryptedVault, TemplateDecoyGenerator, VaultError};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Cannot prepare data directory {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Log key unavailable: {0}")]
    Key(#[from] CryptoError),
    #[error("Encrypted log store: {0}")]
    LogStore(#[from] LogStoreError),
    #[error("Vault: {0}")]
    Vault(#[from] VaultError),
}

/// Injection points for `AppContext::initialize`
pub struct ContextOptions {
    pub data_dir: PathBuf,
    /// `None` loads `config.json` from the data dir
    pub config: Option<AppConfig>,
    pub signal_source: Arc<dyn SignalSource>,
    pub decoy_generator: Arc<dyn DecoyGenerator>,
    pub terminator: Arc<dyn Terminator>,
}

impl ContextOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            config: None,
            signal_source: Arc::new(SysinfoSignalSource::new()),
            decoy_generator: Arc::new(TemplateDecoyGenerator),
            terminator: Arc::new(ProcessTerminator),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_signal_source(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.signal_source = source;
        self
    }

    pub fn with_decoy_generator(mut self, generator: Arc<dyn DecoyGenerator>) -> Self {
        self.decoy_generator = generator;
        self
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }
}

pub struct AppContext {
    pub layout: DataLayout,
    pub config: AppConfig,
    pub notifier: Notifier,
    pub log: Arc<EncryptedLogStore>,
    pub monitor: Arc<ThreatMonitor>,
    pub vault: Arc<EncryptedVault>,
    pub controller: Arc<CountermeasureController>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    pub fn initialize(options: ContextOptions) -> Result<Self, InitError> {
        let layout = DataLayout::new(options.data_dir);
        let storage_err = |source: std::io::Error| InitError::Storage {
            path: layout.root().to_path_buf(),
            source,
        };
        layout.ensure().map_err(storage_err)?;
        if let Err(e) = layout.ensure_emergency_scripts() {
            log::warn!("[Init] Emergency scripts not written: {}", e);
        }

        let mut config = match options.config {
            Some(config) => config,
            None => AppConfig::load_or_default(&layout.config_file()),
        };
        if let Some(exe) = current_exe_name() {
            config.rules.exclude(&exe);
        }

        let log_key = SecretKey::load_or_generate(&layout.log_key_file())?;
        let log = Arc::new(EncryptedLogStore::open(
            layout.security_log_dir(),
            &log_key,
            config.log_store.clone(),
        )?);

        let monitor = Arc::new(ThreatMonitor::new(
            config.monitor.clone(),
            config.rules.clone(),
            options.signal_source,
        ));
        let vault = Arc::new(EncryptedVault::initialize(
            layout.clone(),
            config.vault.clone(),
            options.decoy_generator,
            Arc::clone(&monitor),
            Arc::clone(&log),
        )?);

        let notifier = Notifier::new();
        let controller = Arc::new(CountermeasureController::new(
            config.countermeasures.clone(),
            layout.clone(),
            Arc::clone(&vault),
            Arc::clone(&log),
            notifier.clone(),
            options.terminator,
        ));

        log::info!("[Init] Data directory: {}", layout.root().display());
        log.record(LogEntry::security(
            "agent_started",
            json!({
                "version": crate::constants::APP_VERSION,
                "protected_folders": vault.protected_folders().len(),
            }),
        ));

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            layout,
            config,
            notifier,
            log,
            monitor,
            vault,
            controller,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn monitor, dispatch, watch handler and log rotation loops.
    /// Must run inside a tokio runtime.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        // Subscribe before the monitor runs so no notice is missed
        let notices = self.monitor.subscribe();
        tasks.push(tokio::spawn(
            Arc::clone(&self.controller).run(notices, self.shutdown_tx.subscribe()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&self.monitor).run(self.shutdown_tx.subscribe()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&self.log).run_rotation(self.shutdown_tx.subscribe()),
        ));
        if let Some(handler) = self.vault.spawn_watch_handler(self.shutdown_tx.subscribe()) {
            tasks.push(handler);
        }
        log::info!("[Init] {} background tasks started", tasks.len());
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Signal all loops, wait for them, then release resources.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                log::warn!("[Shutdown] Task ended abnormally: {}", e);
            }
        }

        self.controller.shutdown();
        self.vault.shutdown();
        self.log.record(LogEntry::security("agent_stopped", json!({})));
        self.log.shutdown();
        log::info!("[Shutdown] Complete");
    }
}

fn current_exe_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    exe.file_stem().map(|s| s.to_string_lossy().to_string())
}
