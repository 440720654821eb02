//! Countermeasure ladder tests

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::*;
use crate::logic::config::{
    CountermeasureConfig, LogStoreConfig, MonitorConfig, VaultConfig,
};
use crate::logic::crypto::SecretKey;
use crate::logic::events::{events, Notifier};
use crate::logic::layout::DataLayout;
use crate::logic::telemetry::{EncryptedLogStore, LogType};
use crate::logic::test_support::{RecordingTerminator, StaticSignalSource};
use crate::logic::threat::{
    MonitorNotice, RuleTable, SecurityLevel, Sensitivity, Severity, ThreatEvent, ThreatKind,
    ThreatMonitor,
};
use crate::logic::vault::{record_path_for, EncryptedVault, TemplateDecoyGenerator};

struct Fixture {
    _dir: TempDir,
    layout: DataLayout,
    folder: PathBuf,
    monitor: Arc<ThreatMonitor>,
    vault: Arc<EncryptedVault>,
    log: Arc<EncryptedLogStore>,
    notifier: Notifier,
    terminator: Arc<RecordingTerminator>,
    controller: Arc<CountermeasureController>,
}

fn fixture_with(config: CountermeasureConfig) -> Fixture {
    let dir = TempDir::new().unwrap();
    let layout = DataLayout::new(dir.path().join("data"));
    layout.ensure().unwrap();
    let folder = dir.path().join("project");
    fs::create_dir(&folder).unwrap();
    fs::write(folder.join("secret.py"), "API_KEY = 'abc123'\n").unwrap();

    let monitor = Arc::new(ThreatMonitor::new(
        MonitorConfig::default(),
        RuleTable::default(),
        StaticSignalSource::new(),
    ));
    let log = Arc::new(
        EncryptedLogStore::open(
            layout.security_log_dir(),
            &SecretKey::load_or_generate(&layout.log_key_file()).unwrap(),
            LogStoreConfig::default(),
        )
        .unwrap(),
    );
    let vault = Arc::new(
        EncryptedVault::initialize(
            layout.clone(),
            VaultConfig {
                decoy_pool_size: 3,
                ..Default::default()
            },
            Arc::new(TemplateDecoyGenerator),
            Arc::clone(&monitor),
            Arc::clone(&log),
        )
        .unwrap(),
    );
    vault.add_protected_folder(&folder).unwrap();

    let notifier = Notifier::new();
    let terminator = Arc::new(RecordingTerminator::default());
    let controller = Arc::new(CountermeasureController::new(
        config,
        layout.clone(),
        Arc::clone(&vault),
        Arc::clone(&log),
        notifier.clone(),
        terminator.clone(),
    ));
    Fixture {
        _dir: dir,
        layout,
        folder,
        monitor,
        vault,
        log,
        notifier,
        terminator,
        controller,
    }
}

fn fixture() -> Fixture {
    fixture_with(CountermeasureConfig::default())
}

fn logged_actions(log: &EncryptedLogStore) -> Vec<String> {
    log.read_all()
        .unwrap()
        .entries
        .into_iter()
        .filter(|e| e.log_type == LogType::Action)
        .filter_map(|e| e.payload["action"].as_str().map(str::to_string))
        .collect()
}

// ============================================================================
// LOCKDOWN
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_lockdown_is_idempotent() {
    let f = fixture();

    let report = f.controller.activate_lockdown().unwrap();
    assert_eq!(report.sealed, 1);
    // secret.py cover rewritten + three honey files planted
    assert_eq!(report.decoys, 4);
    assert!(f.controller.is_locked_down());
    assert!(f.controller.is_network_disabled());
    assert!(record_path_for(&f.folder.join("secret.py")).exists());
    assert!(f.vault.is_sealed(&f.folder.join("secret.py")));
    assert!(f.folder.join("deploy_helper.py").exists());

    assert!(f.controller.activate_lockdown().is_none());
    let activations = logged_actions(&f.log)
        .iter()
        .filter(|a| *a == "lockdown_activated")
        .count();
    assert_eq!(activations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lockdown_expires_automatically() {
    let f = fixture();
    f.controller.activate_lockdown().unwrap();

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert!(f.controller.is_locked_down());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!f.controller.is_locked_down());
    assert!(!f.controller.is_network_disabled());
    assert!(f.vault.active_locks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_deactivation_cancels_timer() {
    let f = fixture();
    f.controller.activate_lockdown().unwrap();

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(f.controller.deactivate_lockdown());
    assert!(!f.controller.deactivate_lockdown());

    // Re-enter: the first timer (due at 300s) must not end this lockdown
    f.controller.activate_lockdown().unwrap();
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert!(f.controller.is_locked_down());

    // Second timer due at 500s
    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(!f.controller.is_locked_down());

    let deactivations = logged_actions(&f.log)
        .iter()
        .filter(|a| *a == "lockdown_deactivated")
        .count();
    assert_eq!(deactivations, 2);
}

#[test]
fn test_lockdown_without_runtime_stays_until_deactivated() {
    let f = fixture();
    f.controller.activate_lockdown().unwrap();
    assert!(f.controller.is_locked_down());
    assert!(f.controller.deactivate_lockdown());
    assert!(!f.controller.is_network_disabled());
}

// ============================================================================
// PANIC
// ============================================================================

#[test]
fn test_emergency_passphrase_runs_ladder_without_destruct() {
    let f = fixture();
    let mut ui = f.notifier.subscribe();
    fs::write(f.layout.ephemeral_dir().join("open.tmp"), "plaintext").unwrap();
    fs::write(f.layout.app_log_dir().join("agent.log"), "debug output").unwrap();

    assert_eq!(
        f.controller.inspect_input("Notes - Red Sky At Morning"),
        Some(PanicTrigger::Emergency)
    );
    assert!(f.controller.is_panic_mode());
    assert!(f.controller.is_locked_down());
    assert_eq!(f.terminator.calls(), 0);

    assert!(f.layout.root().exists());
    assert_eq!(fs::read_dir(f.layout.ephemeral_dir()).unwrap().count(), 0);
    assert_eq!(fs::read_dir(f.layout.app_log_dir()).unwrap().count(), 0);
    assert_eq!(fs::read_dir(f.layout.crash_dir()).unwrap().count(), 1);

    let actions = logged_actions(&f.log);
    let wiped = actions.iter().position(|a| a == "sensitive_data_wiped").unwrap();
    let locked = actions.iter().position(|a| a == "lockdown_activated").unwrap();
    let crashed = actions.iter().position(|a| a == "simulated_crash").unwrap();
    assert!(wiped < locked && locked < crashed);
    assert!(!actions.iter().any(|a| a == "self_obliteration"));

    let mut saw_crash_dialog = false;
    while let Ok(n) = ui.try_recv() {
        if n.event == events::SHOW_WARNING && n.payload["title"] == panic::CRASH_TITLE {
            saw_crash_dialog = true;
        }
    }
    assert!(saw_crash_dialog);
}

#[test]
fn test_panic_is_idempotent_until_cleared() {
    let f = fixture();
    assert!(f.controller.trigger_panic(PanicTrigger::Emergency));
    assert!(!f.controller.trigger_panic(PanicTrigger::Emergency));

    assert!(f.controller.exit_panic_mode());
    assert!(!f.controller.exit_panic_mode());
    // Lockdown is independent of the panic flag
    assert!(f.controller.is_locked_down());
}

#[test]
fn test_destruct_passphrase_obliterates_data_dir() {
    let f = fixture();
    assert_eq!(
        f.controller.inspect_input("burn after reading"),
        Some(PanicTrigger::Destruct)
    );
    assert_eq!(f.terminator.calls(), 1);
    assert!(!f.layout.root().exists());
    // Protected folder lives outside the data dir and survives
    assert!(f.folder.exists());
}

#[test]
fn test_ordinary_input_is_ignored() {
    let f = fixture();
    assert_eq!(f.controller.inspect_input("Quarterly report.xlsx"), None);
    assert!(!f.controller.is_panic_mode());
    assert!(!f.controller.is_locked_down());
}

// ============================================================================
// DISPATCH
// ============================================================================

#[test]
fn test_red_level_triggers_lockdown() {
    let f = fixture();
    f.controller.handle_notice(MonitorNotice::LevelChanged {
        previous: SecurityLevel::Yellow,
        current: SecurityLevel::Red,
    });
    assert!(f.controller.is_locked_down());
}

#[test]
fn test_red_level_respects_auto_lockdown_flag() {
    let f = fixture_with(CountermeasureConfig {
        auto_lockdown: false,
        ..Default::default()
    });
    f.controller.handle_notice(MonitorNotice::LevelChanged {
        previous: SecurityLevel::Green,
        current: SecurityLevel::Red,
    });
    assert!(!f.controller.is_locked_down());
}

#[test]
fn test_yellow_level_applies_standard_protections() {
    let f = fixture();
    f.controller.handle_notice(MonitorNotice::LevelChanged {
        previous: SecurityLevel::Green,
        current: SecurityLevel::Yellow,
    });
    assert!(!f.controller.is_locked_down());
    assert!(!f.vault.active_locks().is_empty());
}

#[test]
fn test_vm_detection_activates_protections_once() {
    let f = fixture();
    let vm = || ThreatEvent::new(ThreatKind::VmDetected, Severity::Medium, "vm");

    f.controller.handle_notice(MonitorNotice::ThreatDetected(vm()));
    assert_eq!(f.monitor.sensitivity(), Sensitivity::High);
    let decoy = f.folder.join("vm_settings.vmx");
    assert!(decoy.exists());

    fs::remove_file(&decoy).unwrap();
    f.controller.handle_notice(MonitorNotice::ThreatDetected(vm()));
    assert!(!decoy.exists());
}

#[test]
fn test_observed_window_title_reaches_passphrase_check() {
    let f = fixture();
    f.controller
        .handle_notice(MonitorNotice::InputObserved("the eagle has landed - Notepad".to_string()));
    assert!(f.controller.is_panic_mode());
}

#[tokio::test(start_paused = true)]
async fn test_run_dispatches_monitor_notices() {
    let f = fixture();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(
        Arc::clone(&f.controller).run(f.monitor.subscribe(), shutdown_rx),
    );

    f.monitor
        .report_threat(ThreatEvent::new(ThreatKind::Manual, Severity::High, "operator"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(f.controller.is_locked_down());

    let threats = f
        .log
        .read_all()
        .unwrap()
        .entries
        .into_iter()
        .filter(|e| e.log_type == LogType::Threat)
        .count();
    assert_eq!(threats, 1);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
    f.controller.shutdown();
}
