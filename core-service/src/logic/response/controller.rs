//! Countermeasure Controller
//!
//! Two independent flags, `locked_down` and `panic_mode`, each with its own
//! entry and exit actions. Monitor notices and external commands both land
//! here; every action is written to the encrypted log before or while it
//! runs, so a failing later step still leaves an audit trail.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::network::NetworkKillSwitch;
use super::panic::{
    detect_passphrase, persistence_entries, write_crash_report, PanicTrigger, Terminator,
    CRASH_MESSAGE, CRASH_TITLE,
};
use crate::logic::config::CountermeasureConfig;
use crate::logic::events::Notifier;
use crate::logic::layout::DataLayout;
use crate::logic::telemetry::{EncryptedLogStore, LogEntry, LogLevel};
use crate::logic::threat::{MonitorNotice, SecurityLevel, ThreatKind};
use crate::logic::vault::{self, EncryptedVault};

// ============================================================================
// STATE
// ============================================================================

#[derive(Default)]
struct ControllerState {
    locked_down: bool,
    panic_mode: bool,
    /// Bumped on every lockdown entry; a timer only acts on its own generation
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// What one lockdown entry did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockdownReport {
    pub sealed: usize,
    pub locks: usize,
    pub decoys: usize,
}

pub struct CountermeasureController {
    config: CountermeasureConfig,
    layout: DataLayout,
    vault: Arc<EncryptedVault>,
    log: Arc<EncryptedLogStore>,
    notifier: Notifier,
    kill_switch: NetworkKillSwitch,
    terminator: Arc<dyn Terminator>,
    state: Mutex<ControllerState>,
    vm_protected: AtomicBool,
}

impl CountermeasureController {
    pub fn new(
        config: CountermeasureConfig,
        layout: DataLayout,
        vault: Arc<EncryptedVault>,
        log: Arc<EncryptedLogStore>,
        notifier: Notifier,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        Self {
            config,
            layout,
            vault,
            log,
            notifier,
            kill_switch: NetworkKillSwitch::new(),
            terminator,
            state: Mutex::new(ControllerState::default()),
            vm_protected: AtomicBool::new(false),
        }
    }

    pub fn is_locked_down(&self) -> bool {
        self.state.lock().locked_down
    }

    pub fn is_panic_mode(&self) -> bool {
        self.state.lock().panic_mode
    }

    pub fn is_network_disabled(&self) -> bool {
        self.kill_switch.is_engaged()
    }

    // ========================================================================
    // LOCKDOWN
    // ========================================================================

    /// Enter lockdown. `None` when already locked down.
    pub fn activate_lockdown(self: &Arc<Self>) -> Option<LockdownReport> {
        let generation = {
            let mut state = self.state.lock();
            if state.locked_down {
                return None;
            }
            state.locked_down = true;
            state.generation += 1;
            state.generation
        };

        log::warn!("[Countermeasure] Lockdown activated");
        self.log.record(LogEntry::action(
            "lockdown_activated",
            json!({ "duration_secs": self.config.lockdown_duration_secs }),
        ));

        let report = LockdownReport {
            sealed: self.vault.seal_all(),
            locks: {
                self.kill_switch.engage();
                self.vault.lock_all()
            },
            decoys: self.vault.activate_decoy_files(),
        };
        self.log.record(LogEntry::action("lockdown_applied", json!(report)));
        self.schedule_auto_deactivation(generation);

        self.notifier.emit_show_warning(
            "Lockdown active",
            &format!("Protected files sealed ({}), network disabled", report.sealed),
        );
        Some(report)
    }

    fn schedule_auto_deactivation(self: &Arc<Self>, generation: u64) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                log::warn!("[Countermeasure] No runtime, lockdown will not auto-expire");
                return;
            }
        };
        let controller = Arc::clone(self);
        let duration = Duration::from_secs(self.config.lockdown_duration_secs);
        let task = handle.spawn(async move {
            tokio::time::sleep(duration).await;
            controller.expire_lockdown(generation);
        });

        let mut state = self.state.lock();
        if state.locked_down && state.generation == generation {
            if let Some(old) = state.timer.replace(task) {
                old.abort();
            }
        } else {
            // Deactivated while the timer was being set up
            task.abort();
        }
    }

    fn expire_lockdown(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            if !state.locked_down || state.generation != generation {
                return;
            }
            state.locked_down = false;
            // This task is the timer; dropping the handle detaches it
            state.timer = None;
        }
        self.lift_lockdown("timer");
    }

    /// Leave lockdown. Returns false when not locked down.
    pub fn deactivate_lockdown(&self) -> bool {
        {
            let mut state = self.state.lock();
            if !state.locked_down {
                return false;
            }
            state.locked_down = false;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
        self.lift_lockdown("manual");
        true
    }

    fn lift_lockdown(&self, reason: &str) {
        let released = self.vault.release_all_locks();
        self.kill_switch.disengage();
        log::info!("[Countermeasure] Lockdown lifted ({})", reason);
        self.log.record(LogEntry::action(
            "lockdown_deactivated",
            json!({ "reason": reason, "locks_released": released }),
        ));
    }

    // ========================================================================
    // PANIC
    // ========================================================================

    /// Check `text` for a passphrase and run the ladder on a hit.
    pub fn inspect_input(self: &Arc<Self>, text: &str) -> Option<PanicTrigger> {
        let trigger = detect_passphrase(text, &self.config)?;
        self.trigger_panic(trigger);
        Some(trigger)
    }

    /// Run the panic ladder. Returns false when panic mode is already on.
    pub fn trigger_panic(self: &Arc<Self>, trigger: PanicTrigger) -> bool {
        {
            let mut state = self.state.lock();
            if state.panic_mode {
                return false;
            }
            state.panic_mode = true;
        }

        log::error!("[Countermeasure] PANIC ({})", trigger.as_str());
        self.log.record(
            LogEntry::action("panic_triggered", json!({ "trigger": trigger }))
                .with_level(LogLevel::Critical),
        );

        // 1. wipe
        self.wipe_sensitive_data();

        // 2. lockdown
        self.activate_lockdown();

        // 3. simulated crash
        match write_crash_report(&self.layout.crash_dir()) {
            Ok(path) => {
                self.log.record(LogEntry::action("simulated_crash", json!({ "report": path })));
            }
            Err(e) => {
                log::warn!("[Countermeasure] Crash report failed: {}", e);
                self.log.record(LogEntry::error("simulated_crash", e));
            }
        }
        self.notifier.emit_show_warning(CRASH_TITLE, CRASH_MESSAGE);

        // 4. destruct only
        if trigger == PanicTrigger::Destruct {
            self.self_obliterate();
        }
        true
    }

    fn wipe_sensitive_data(&self) {
        let ephemeral = self.vault.wipe_ephemeral();
        let cache = self.vault.clear_caches();
        let app_logs = vault::clear_dir(&self.layout.app_log_dir());
        log::warn!(
            "[Countermeasure] Wiped {} temp files, {} cache entries, {} app logs",
            ephemeral,
            cache,
            app_logs
        );
        self.log.record(LogEntry::action(
            "sensitive_data_wiped",
            json!({ "ephemeral": ephemeral, "cache": cache, "app_logs": app_logs }),
        ));
    }

    /// Clear the panic flag. Lockdown state is left alone.
    pub fn exit_panic_mode(&self) -> bool {
        let changed = std::mem::replace(&mut self.state.lock().panic_mode, false);
        if changed {
            log::info!("[Countermeasure] Panic mode cleared");
            self.log.record(LogEntry::action("panic_cleared", json!({})));
        }
        changed
    }

    /// Terminal. Only reachable from the destruct trigger.
    fn self_obliterate(&self) {
        let root = self.layout.root().to_path_buf();
        let exe = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let persistence = persistence_entries();

        log::error!("[Countermeasure] Self-obliteration started");
        self.log.record(
            LogEntry::action("self_obliteration", json!({ "data_dir": root }))
                .with_level(LogLevel::Critical),
        );
        // Requested only: binary and autostart entries are left to the operator
        self.log.record(LogEntry::action(
            "application_files_deletion_requested",
            json!({ "path": exe, "executed": false }),
        ));
        self.log.record(LogEntry::action(
            "persistence_removal_requested",
            json!({ "entries": persistence, "executed": false }),
        ));
        self.log.shutdown();
        self.vault.shutdown();

        match fs::remove_dir_all(&root) {
            Ok(()) => log::error!("[Countermeasure] Data directory {:?} deleted", root),
            Err(e) => log::error!("[Countermeasure] Failed to delete {:?}: {}", root, e),
        }
        self.terminator.terminate(0);
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    pub fn handle_notice(self: &Arc<Self>, notice: MonitorNotice) {
        match notice {
            MonitorNotice::ThreatDetected(threat) => {
                self.log.record(LogEntry::threat(&threat));
                self.notifier.emit_threat_detected(&threat);
                if threat.kind == ThreatKind::VmDetected
                    && !self.vm_protected.swap(true, Ordering::SeqCst)
                {
                    self.vault.activate_vm_protections();
                }
            }
            MonitorNotice::LevelChanged { previous, current } => {
                self.notifier.emit_level_changed(previous, current);
                self.log.record(LogEntry::security(
                    "security_level_changed",
                    json!({ "previous": previous, "current": current }),
                ));
                match current {
                    SecurityLevel::Yellow => {
                        self.vault.apply_standard_protections();
                    }
                    SecurityLevel::Red if self.config.auto_lockdown => {
                        self.activate_lockdown();
                    }
                    _ => {}
                }
            }
            MonitorNotice::InputObserved(text) => {
                self.inspect_input(&text);
            }
        }
    }

    /// Consume monitor notices in emission order until shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut notices: broadcast::Receiver<MonitorNotice>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        log::info!("[Countermeasure] Dispatch started");
        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Ok(notice) => self.handle_notice(notice),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("[Countermeasure] Dispatch lagged, {} notices missed", missed);
                        self.log.record(LogEntry::error("dispatch", format!("{} notices missed", missed)));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("[Countermeasure] Dispatch stopped");
    }

    /// Cancel the lockdown timer and disengage the kill switch.
    pub fn shutdown(&self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
        self.kill_switch.disengage();
    }
}
