//! Shared fixtures for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::response::Terminator;
use super::threat::{ProcessSample, ResourceSample, SignalError, SignalSource, WindowSample};

/// Scriptable signal source. Everything starts empty / bare metal.
pub struct StaticSignalSource {
    processes: Mutex<Vec<ProcessSample>>,
    windows: Mutex<Vec<WindowSample>>,
    descriptor: Mutex<String>,
}

impl StaticSignalSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            processes: Mutex::new(Vec::new()),
            windows: Mutex::new(Vec::new()),
            descriptor: Mutex::new("Linux 6.1 | bare metal workstation".to_string()),
        })
    }

    pub fn set_processes(&self, processes: Vec<ProcessSample>) {
        *self.processes.lock() = processes;
    }

    pub fn set_windows(&self, titles: &[&str]) {
        *self.windows.lock() = titles
            .iter()
            .map(|t| WindowSample { title: t.to_string() })
            .collect();
    }

    pub fn set_descriptor(&self, descriptor: &str) {
        *self.descriptor.lock() = descriptor.to_string();
    }
}

impl SignalSource for StaticSignalSource {
    fn list_processes(&self) -> Result<Vec<ProcessSample>, SignalError> {
        Ok(self.processes.lock().clone())
    }

    fn list_window_titles(&self) -> Result<Vec<WindowSample>, SignalError> {
        Ok(self.windows.lock().clone())
    }

    fn system_descriptor(&self) -> Result<String, SignalError> {
        Ok(self.descriptor.lock().clone())
    }

    fn resource_sample(&self) -> Result<ResourceSample, SignalError> {
        Ok(ResourceSample::default())
    }
}

/// Terminator that only counts calls
#[derive(Default)]
pub struct RecordingTerminator {
    calls: AtomicUsize,
}

impl RecordingTerminator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, code: i32) {
        log::info!("[Test] terminate({}) suppressed", code);
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
