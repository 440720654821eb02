//! Threat Monitor
//!
//! Polls the signal source, applies the heuristics and the rule table, keeps
//! the rolling threat history and the derived security level.
//!
//! Subscribers receive [`MonitorNotice`]s over a broadcast channel in
//! emission order. History and level live behind one lock - the only place
//! they are mutated.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::constants::THREAT_HISTORY_CAPACITY;
use crate::logic::config::MonitorConfig;
use super::classifier::derive_level;
use super::heuristics::{entropy_proxy, evaluate_timing, timed_workload, EntropyTracker};
use super::rules::{MatchOutcome, RuleTable};
use super::signal::{fetch_with_timeout, ProcessSample, ResourceSample, SignalSource, WindowSample};
use super::types::{SecurityLevel, Severity, ThreatEvent, ThreatKind};

/// Buffered notices per subscriber before it starts lagging
const NOTICE_CHANNEL_CAPACITY: usize = 256;

/// Messages published to subscribers
#[derive(Debug, Clone)]
pub enum MonitorNotice {
    ThreatDetected(ThreatEvent),
    LevelChanged {
        previous: SecurityLevel,
        current: SecurityLevel,
    },
    /// Text seen in a monitored input source (window titles)
    InputObserved(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sensitivity {
    Normal,
    High,
}

struct MonitorState {
    history: VecDeque<ThreatEvent>,
    level: SecurityLevel,
}

/// Per-scan dedup and heuristic state
struct ScanState {
    reported_pids: HashSet<u32>,
    reported_titles: HashSet<String>,
    vm_descriptor_reported: bool,
    vm_process_reported: bool,
    entropy: EntropyTracker,
}

pub struct ThreatMonitor {
    config: MonitorConfig,
    rules: RuleTable,
    source: Arc<dyn SignalSource>,
    state: Mutex<MonitorState>,
    scan: Mutex<ScanState>,
    sensitivity: RwLock<Sensitivity>,
    notices: broadcast::Sender<MonitorNotice>,
}

impl ThreatMonitor {
    pub fn new(config: MonitorConfig, rules: RuleTable, source: Arc<dyn SignalSource>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let entropy = EntropyTracker::new(config.entropy_spike_delta);
        Self {
            config,
            rules,
            source,
            state: Mutex::new(MonitorState {
                history: VecDeque::with_capacity(THREAT_HISTORY_CAPACITY),
                level: SecurityLevel::Green,
            }),
            scan: Mutex::new(ScanState {
                reported_pids: HashSet::new(),
                reported_titles: HashSet::new(),
                vm_descriptor_reported: false,
                vm_process_reported: false,
                entropy,
            }),
            sensitivity: RwLock::new(Sensitivity::Normal),
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorNotice> {
        self.notices.subscribe()
    }

    // ========================================================================
    // REPORTING
    // ========================================================================

    /// Append to history (FIFO, capacity 100), notify, recompute the level.
    /// Returns the level after this event.
    pub fn report_threat(&self, event: ThreatEvent) -> SecurityLevel {
        log::warn!(
            "[Monitor] {} ({}) - {}",
            event.kind,
            event.severity,
            event.description
        );

        let mut state = self.state.lock();
        if state.history.len() >= THREAT_HISTORY_CAPACITY {
            state.history.pop_front();
        }
        state.history.push_back(event.clone());

        let previous = state.level;
        let current = derive_level(state.history.iter());
        state.level = current;

        // Sent under the lock so notice order matches history order
        let _ = self.notices.send(MonitorNotice::ThreatDetected(event));
        if previous != current {
            log::warn!("[Monitor] Security level {} -> {}", previous, current);
            let _ = self.notices.send(MonitorNotice::LevelChanged { previous, current });
        }
        current
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.state.lock().level
    }

    /// Full history window, oldest first
    pub fn history(&self) -> Vec<ThreatEvent> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Newest `count` events, newest first
    pub fn recent_threats(&self, count: usize) -> Vec<ThreatEvent> {
        self.state.lock().history.iter().rev().take(count).cloned().collect()
    }

    pub fn sensitivity(&self) -> Sensitivity {
        *self.sensitivity.read()
    }

    pub fn set_sensitivity(&self, sensitivity: Sensitivity) {
        let mut current = self.sensitivity.write();
        if *current != sensitivity {
            log::info!("[Monitor] Sensitivity {:?} -> {:?}", *current, sensitivity);
            *current = sensitivity;
        }
    }

    fn timing_threshold(&self) -> Duration {
        let base = Duration::from_micros(self.config.timing_threshold_us);
        match self.sensitivity() {
            Sensitivity::Normal => base,
            Sensitivity::High => base / 2,
        }
    }

    fn entropy_limit(&self) -> u32 {
        match self.sensitivity() {
            Sensitivity::Normal => self.config.entropy_spike_limit,
            Sensitivity::High => self.config.entropy_spike_limit.saturating_sub(1).max(1),
        }
    }

    // ========================================================================
    // CHECKS
    // ========================================================================

    /// Run the timing workload and report when it was too slow.
    pub fn check_debugger_timing(&self) -> Option<ThreatEvent> {
        let elapsed = timed_workload(self.config.timing_workload_iterations);
        let event = evaluate_timing(elapsed, self.timing_threshold())?;
        self.report_threat(event.clone());
        Some(event)
    }

    /// Process matching + VM helper processes.
    pub fn inspect_processes(&self, processes: &[ProcessSample]) -> Vec<ThreatEvent> {
        let mut found = Vec::new();
        {
            let mut scan = self.scan.lock();
            let live: HashSet<u32> = processes.iter().map(|p| p.pid).collect();
            scan.reported_pids.retain(|pid| live.contains(pid));

            for process in processes {
                match self.rules.classify(&process.name) {
                    MatchOutcome::Excluded => continue,
                    MatchOutcome::Suspicious(pattern) => {
                        if scan.reported_pids.insert(process.pid) {
                            found.push(
                                ThreatEvent::new(
                                    ThreatKind::SuspiciousProcess,
                                    Severity::High,
                                    format!("Suspicious process running: {}", process.name),
                                )
                                .with_detail("pid", process.pid)
                                .with_detail("name", &process.name)
                                .with_detail("pattern", pattern),
                            );
                        }
                    }
                    MatchOutcome::Clean => {}
                }

                if !scan.vm_process_reported {
                    if let Some(helper) = self.rules.vm_process(&process.name) {
                        scan.vm_process_reported = true;
                        found.push(
                            ThreatEvent::new(
                                ThreatKind::VmDetected,
                                Severity::Medium,
                                format!("VM helper process running: {}", process.name),
                            )
                            .with_detail("source", "process")
                            .with_detail("indicator", helper),
                        );
                    }
                }
            }
        }

        for event in &found {
            self.report_threat(event.clone());
        }
        found
    }

    /// Window title matching. Every title is also forwarded as input.
    pub fn inspect_windows(&self, windows: &[WindowSample]) -> Vec<ThreatEvent> {
        let mut found = Vec::new();
        {
            let mut scan = self.scan.lock();
            let live: HashSet<&str> = windows.iter().map(|w| w.title.as_str()).collect();
            scan.reported_titles.retain(|t| live.contains(t.as_str()));

            for window in windows {
                if let MatchOutcome::Suspicious(pattern) = self.rules.classify(&window.title) {
                    if scan.reported_titles.insert(window.title.clone()) {
                        found.push(
                            ThreatEvent::new(
                                ThreatKind::SuspiciousWindow,
                                Severity::Medium,
                                format!("Suspicious window open: {}", window.title),
                            )
                            .with_detail("title", &window.title)
                            .with_detail("pattern", pattern),
                        );
                    }
                }
            }
        }

        for window in windows.iter().filter(|w| !w.title.trim().is_empty()) {
            let _ = self.notices.send(MonitorNotice::InputObserved(window.title.clone()));
        }
        for event in &found {
            self.report_threat(event.clone());
        }
        found
    }

    /// VM indicator strings in the system descriptor.
    pub fn inspect_descriptor(&self, descriptor: &str) -> Option<ThreatEvent> {
        let event = {
            let mut scan = self.scan.lock();
            if scan.vm_descriptor_reported {
                return None;
            }
            let indicator = self.rules.vm_indicator_in(descriptor)?;
            scan.vm_descriptor_reported = true;
            ThreatEvent::new(
                ThreatKind::VmDetected,
                Severity::Medium,
                format!("Virtualization indicator in system descriptor: {}", indicator),
            )
            .with_detail("source", "descriptor")
            .with_detail("indicator", indicator)
        };
        self.report_threat(event.clone());
        Some(event)
    }

    /// Feed one resource sample to the entropy tracker.
    pub fn inspect_resources(&self, sample: &ResourceSample) -> Option<ThreatEvent> {
        let value = entropy_proxy(sample, Utc::now());
        let limit = self.entropy_limit();
        let event = self.scan.lock().entropy.observe(value, limit)?;
        self.report_threat(event.clone());
        Some(event)
    }

    /// One full polling cycle. Unavailable signals are skipped.
    pub async fn scan_once(&self) {
        let timeout = Duration::from_millis(self.config.signal_timeout_ms);

        if let Some(processes) = fetch_with_timeout(&self.source, timeout, |s| s.list_processes()).await {
            self.inspect_processes(&processes);
        }
        if let Some(windows) = fetch_with_timeout(&self.source, timeout, |s| s.list_window_titles()).await {
            self.inspect_windows(&windows);
        }
        if let Some(descriptor) = fetch_with_timeout(&self.source, timeout, |s| s.system_descriptor()).await {
            self.inspect_descriptor(&descriptor);
        }
        if let Some(sample) = fetch_with_timeout(&self.source, timeout, |s| s.resource_sample()).await {
            self.inspect_resources(&sample);
        }
    }

    /// Polling loop: full scan every poll period, timing check on its own period.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut poll = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut timing = tokio::time::interval(Duration::from_secs(
            self.config.debugger_check_interval_secs.max(1),
        ));
        timing.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!(
            "[Monitor] Started (poll {}s, timing check {}s)",
            self.config.poll_interval_secs,
            self.config.debugger_check_interval_secs
        );

        loop {
            tokio::select! {
                _ = poll.tick() => self.scan_once().await,
                _ = timing.tick() => {
                    self.check_debugger_timing();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("[Monitor] Stopped");
    }
}
