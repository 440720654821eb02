//! Security Level Classifier
//!
//! CHỈ chứa logic derive level - không có state.
//! Input: threat history window
//! Output: SecurityLevel

use super::types::{SecurityLevel, Severity, ThreatEvent};

/// More than this many MEDIUM events => YELLOW
pub const MEDIUM_EVENTS_FOR_YELLOW: usize = 2;

/// More than this many events of any severity => YELLOW
pub const TOTAL_EVENTS_FOR_YELLOW: usize = 5;

/// Derive the security level from the live history window.
///
/// Pure function: any HIGH => RED; else more than 2 MEDIUM or more than 5
/// total => YELLOW; else GREEN.
pub fn derive_level<'a, I>(history: I) -> SecurityLevel
where
    I: IntoIterator<Item = &'a ThreatEvent>,
{
    let mut total = 0usize;
    let mut medium = 0usize;

    for event in history {
        match event.severity {
            Severity::High => return SecurityLevel::Red,
            Severity::Medium => medium += 1,
            Severity::Low => {}
        }
        total += 1;
    }

    if medium > MEDIUM_EVENTS_FOR_YELLOW || total > TOTAL_EVENTS_FOR_YELLOW {
        SecurityLevel::Yellow
    } else {
        SecurityLevel::Green
    }
}
