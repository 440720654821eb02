//! Signal Source
//!
//! Raw observations the monitor classifies. OS enumeration sits behind the
//! [`SignalSource`] trait; [`SysinfoSignalSource`] is the default backend.
//! Calls are blocking, so the monitor runs them on the blocking pool under a
//! per-call timeout via [`fetch_with_timeout`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::System;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub name: String,
    pub pid: u32,
}

impl ProcessSample {
    pub fn new(name: &str, pid: u32) -> Self {
        Self {
            name: name.to_string(),
            pid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSample {
    pub title: String,
}

/// Coarse resource counters feeding the entropy proxy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub used_memory: u64,
    pub total_memory: u64,
    pub process_count: usize,
    pub uptime_secs: u64,
    pub load_average: f64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalError {
    #[error("signal source unavailable: {0}")]
    Unavailable(String),

    #[error("signal call timed out after {0:?}")]
    Timeout(Duration),
}

/// Supplier of raw observations. Every call may fail transiently; the
/// monitor treats a failure as "no signal this cycle".
pub trait SignalSource: Send + Sync {
    fn list_processes(&self) -> Result<Vec<ProcessSample>, SignalError>;
    fn list_window_titles(&self) -> Result<Vec<WindowSample>, SignalError>;
    fn system_descriptor(&self) -> Result<String, SignalError>;
    fn resource_sample(&self) -> Result<ResourceSample, SignalError>;
}

/// Run one signal call on the blocking pool, bounded by `timeout`.
/// Errors, panics and timeouts all collapse to `None`.
pub async fn fetch_with_timeout<T, F>(
    source: &Arc<dyn SignalSource>,
    timeout: Duration,
    call: F,
) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn SignalSource) -> Result<T, SignalError> + Send + 'static,
{
    let source = Arc::clone(source);
    let task = tokio::task::spawn_blocking(move || call(source.as_ref()));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(value))) => Some(value),
        Ok(Ok(Err(e))) => {
            log::debug!("[Monitor] Signal unavailable this cycle: {}", e);
            None
        }
        Ok(Err(e)) => {
            log::warn!("[Monitor] Signal task failed: {}", e);
            None
        }
        Err(_) => {
            log::warn!("[Monitor] {}", SignalError::Timeout(timeout));
            None
        }
    }
}

// ============================================================================
// SYSINFO BACKEND
// ============================================================================

/// Default backend on top of `sysinfo`.
///
/// Window enumeration is not available through sysinfo; this backend reports
/// no windows and leaves that signal to platform-specific sources.
pub struct SysinfoSignalSource {
    system: Mutex<System>,
}

impl SysinfoSignalSource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSignalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for SysinfoSignalSource {
    fn list_processes(&self) -> Result<Vec<ProcessSample>, SignalError> {
        let mut sys = self.system.lock();
        sys.refresh_processes();
        Ok(sys
            .processes()
            .iter()
            .map(|(pid, process)| ProcessSample::new(process.name(), pid.as_u32()))
            .collect())
    }

    fn list_window_titles(&self) -> Result<Vec<WindowSample>, SignalError> {
        Ok(Vec::new())
    }

    fn system_descriptor(&self) -> Result<String, SignalError> {
        let mut sys = self.system.lock();
        sys.refresh_cpu();

        let mut parts = vec![
            System::name().unwrap_or_default(),
            System::long_os_version().unwrap_or_default(),
            System::kernel_version().unwrap_or_default(),
            System::host_name().unwrap_or_default(),
        ];
        if let Some(cpu) = sys.cpus().first() {
            parts.push(cpu.brand().to_string());
        }

        // DMI strings carry the hypervisor vendor on most Linux guests
        #[cfg(target_os = "linux")]
        {
            for dmi in ["sys_vendor", "product_name", "board_vendor"] {
                if let Ok(value) = std::fs::read_to_string(format!("/sys/class/dmi/id/{}", dmi)) {
                    parts.push(value.trim().to_string());
                }
            }
        }

        let descriptor = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");

        if descriptor.is_empty() {
            return Err(SignalError::Unavailable("empty system descriptor".to_string()));
        }
        Ok(descriptor)
    }

    fn resource_sample(&self) -> Result<ResourceSample, SignalError> {
        let mut sys = self.system.lock();
        sys.refresh_memory();
        sys.refresh_processes();

        Ok(ResourceSample {
            used_memory: sys.used_memory(),
            total_memory: sys.total_memory(),
            process_count: sys.processes().len(),
            uptime_secs: System::uptime(),
            load_average: System::load_average().one,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSource;

    impl SignalSource for SlowSource {
        fn list_processes(&self) -> Result<Vec<ProcessSample>, SignalError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![ProcessSample::new("late", 1)])
        }
        fn list_window_titles(&self) -> Result<Vec<WindowSample>, SignalError> {
            Err(SignalError::Unavailable("no display".to_string()))
        }
        fn system_descriptor(&self) -> Result<String, SignalError> {
            Ok("bare metal".to_string())
        }
        fn resource_sample(&self) -> Result<ResourceSample, SignalError> {
            Ok(ResourceSample::default())
        }
    }

    #[tokio::test]
    async fn test_timeout_yields_none() {
        let source: Arc<dyn SignalSource> = Arc::new(SlowSource);
        let result = fetch_with_timeout(&source, Duration::from_millis(20), |s| s.list_processes()).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_error_yields_none_and_success_passes_through() {
        let source: Arc<dyn SignalSource> = Arc::new(SlowSource);

        let windows = fetch_with_timeout(&source, Duration::from_secs(1), |s| s.list_window_titles()).await;
        assert!(windows.is_none());

        let descriptor = fetch_with_timeout(&source, Duration::from_secs(1), |s| s.system_descriptor()).await;
        assert_eq!(descriptor.as_deref(), Some("bare metal"));
    }
}
