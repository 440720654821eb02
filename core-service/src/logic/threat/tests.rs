//! ThreatMonitor scenario tests

use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;

use super::*;
use crate::logic::config::MonitorConfig;
use crate::logic::test_support::StaticSignalSource;

fn monitor_with(source: Arc<StaticSignalSource>) -> ThreatMonitor {
    ThreatMonitor::new(MonitorConfig::default(), RuleTable::default(), source)
}

fn monitor() -> ThreatMonitor {
    monitor_with(StaticSignalSource::new())
}

fn manual(severity: Severity) -> ThreatEvent {
    ThreatEvent::new(ThreatKind::Manual, severity, "scenario")
}

#[test]
fn test_starts_green_and_empty() {
    let m = monitor();
    assert_eq!(m.security_level(), SecurityLevel::Green);
    assert!(m.history().is_empty());
    assert!(m.recent_threats(10).is_empty());
}

#[test]
fn test_level_sequence_medium_then_high() {
    let m = monitor();
    let mut rx = m.subscribe();

    let levels: Vec<SecurityLevel> = [Severity::Medium, Severity::Medium, Severity::Medium, Severity::High]
        .into_iter()
        .map(|s| m.report_threat(manual(s)))
        .collect();
    assert_eq!(
        levels,
        vec![SecurityLevel::Green, SecurityLevel::Green, SecurityLevel::Yellow, SecurityLevel::Red]
    );

    let mut transitions = Vec::new();
    let mut threats = 0;
    loop {
        match rx.try_recv() {
            Ok(MonitorNotice::ThreatDetected(_)) => threats += 1,
            Ok(MonitorNotice::LevelChanged { previous, current }) => transitions.push((previous, current)),
            Ok(MonitorNotice::InputObserved(_)) => {}
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("unexpected channel state: {}", e),
        }
    }
    assert_eq!(threats, 4);
    assert_eq!(
        transitions,
        vec![
            (SecurityLevel::Green, SecurityLevel::Yellow),
            (SecurityLevel::Yellow, SecurityLevel::Red),
        ]
    );
}

#[test]
fn test_no_level_notice_without_change() {
    let m = monitor();
    let mut rx = m.subscribe();
    m.report_threat(manual(Severity::Low));

    assert!(matches!(rx.try_recv(), Ok(MonitorNotice::ThreatDetected(_))));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_history_evicts_oldest_at_capacity() {
    let m = monitor();
    let first = manual(Severity::Low);
    let first_id = first.id.clone();
    m.report_threat(first);
    for _ in 0..100 {
        m.report_threat(manual(Severity::Low));
    }

    let history = m.history();
    assert_eq!(history.len(), 100);
    assert!(history.iter().all(|e| e.id != first_id));
}

#[test]
fn test_level_decays_once_high_is_evicted() {
    let m = monitor();
    m.report_threat(manual(Severity::High));
    assert_eq!(m.security_level(), SecurityLevel::Red);

    // 100 LOW events push the HIGH out; > 5 total keeps it at YELLOW
    for _ in 0..100 {
        m.report_threat(manual(Severity::Low));
    }
    assert_eq!(m.security_level(), SecurityLevel::Yellow);
}

#[test]
fn test_recent_threats_newest_first() {
    let m = monitor();
    for i in 0..5 {
        m.report_threat(ThreatEvent::new(ThreatKind::Manual, Severity::Low, format!("event {}", i)));
    }
    let recent = m.recent_threats(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].description, "event 4");
    assert_eq!(recent[1].description, "event 3");
}

#[test]
fn test_suspicious_process_reported_once_per_pid() {
    let m = monitor();
    let processes = vec![
        ProcessSample::new("bash", 10),
        ProcessSample::new("Wireshark", 42),
    ];

    let found = m.inspect_processes(&processes);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, ThreatKind::SuspiciousProcess);
    assert_eq!(found[0].severity, Severity::High);
    assert_eq!(found[0].details.get("pid").map(String::as_str), Some("42"));
    assert_eq!(m.security_level(), SecurityLevel::Red);

    // Still running: not reported again
    assert!(m.inspect_processes(&processes).is_empty());

    // Gone, then back under a new pid: reported
    m.inspect_processes(&[ProcessSample::new("bash", 10)]);
    let again = m.inspect_processes(&[ProcessSample::new("wireshark", 43)]);
    assert_eq!(again.len(), 1);
}

#[test]
fn test_own_process_is_excluded() {
    let m = monitor();
    // Contains "gdb" but carries the agent's own identifier
    let found = m.inspect_processes(&[ProcessSample::new("guardian-core-gdb-helper", 7)]);
    assert!(found.is_empty());
    assert!(m.history().is_empty());
}

#[test]
fn test_suspicious_window_is_medium_and_forwarded_as_input() {
    let m = monitor();
    let mut rx = m.subscribe();

    let found = m.inspect_windows(&[
        WindowSample { title: "Fiddler Classic".to_string() },
        WindowSample { title: "notes.txt - editor".to_string() },
    ]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, ThreatKind::SuspiciousWindow);
    assert_eq!(found[0].severity, Severity::Medium);

    let mut inputs = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        if let MonitorNotice::InputObserved(text) = notice {
            inputs.push(text);
        }
    }
    assert_eq!(inputs, vec!["Fiddler Classic".to_string(), "notes.txt - editor".to_string()]);
}

#[test]
fn test_vm_descriptor_reported_once() {
    let m = monitor();
    let event = m.inspect_descriptor("Linux | QEMU Standard PC").expect("vm indicator");
    assert_eq!(event.kind, ThreatKind::VmDetected);
    assert_eq!(event.details.get("indicator").map(String::as_str), Some("qemu"));
    assert!(m.inspect_descriptor("Linux | QEMU Standard PC").is_none());
}

#[test]
fn test_bare_metal_descriptor_is_clean() {
    let m = monitor();
    assert!(m.inspect_descriptor("Linux 6.1 | Dell Inc. | Intel Core i7").is_none());
}

#[test]
fn test_high_sensitivity_is_sticky() {
    let m = monitor();
    assert_eq!(m.sensitivity(), Sensitivity::Normal);
    m.set_sensitivity(Sensitivity::High);
    m.set_sensitivity(Sensitivity::High);
    assert_eq!(m.sensitivity(), Sensitivity::High);
}

#[tokio::test]
async fn test_scan_once_uses_signal_source() {
    let source = StaticSignalSource::new();
    source.set_processes(vec![ProcessSample::new("x64dbg.exe", 900)]);
    source.set_descriptor("VirtualBox Guest");
    let m = monitor_with(source);

    m.scan_once().await;

    let kinds: Vec<ThreatKind> = m.history().iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&ThreatKind::SuspiciousProcess));
    assert!(kinds.contains(&ThreatKind::VmDetected));
    assert_eq!(m.security_level(), SecurityLevel::Red);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let m = Arc::new(monitor());
    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&m).run(rx));

    tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("monitor stops")
        .unwrap();
}
