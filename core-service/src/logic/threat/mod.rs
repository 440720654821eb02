//! Threat Module
//!
//! Biến raw signals thành ThreatEvent và duy trì SecurityLevel.
//!
//! ## Structure
//! - `types`: ThreatEvent, Severity, ThreatKind, SecurityLevel
//! - `rules`: rule table (suspicious / exclusion / VM strings)
//! - `classifier`: pure level derivation
//! - `heuristics`: debugger timing + entropy proxy
//! - `signal`: SignalSource trait and sysinfo backend
//! - `monitor`: ThreatMonitor (history, notices, polling loop)

pub mod types;
pub mod rules;
pub mod classifier;
pub mod heuristics;
pub mod signal;
pub mod monitor;

#[cfg(test)]
mod tests;

pub use types::{SecurityLevel, Severity, ThreatEvent, ThreatKind};
pub use rules::{MatchOutcome, RuleTable};
pub use classifier::derive_level;
pub use signal::{ProcessSample, ResourceSample, SignalError, SignalSource, SysinfoSignalSource, WindowSample};
pub use monitor::{MonitorNotice, Sensitivity, ThreatMonitor};
