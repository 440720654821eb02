//! Event Emitter - UI push notifications
//!
//! Broadcast channel thay cho global app handle: bất kỳ component nào giữ
//! một `Notifier` đều emit được, UI bridge chỉ cần `subscribe()`.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::logic::threat::{SecurityLevel, ThreatEvent};

/// Event names
pub mod events {
    pub const THREAT_DETECTED: &str = "threat-detected";
    pub const SECURITY_LEVEL_CHANGED: &str = "security-level-changed";
    pub const SHOW_WARNING: &str = "show-warning";
}

const CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Serialize)]
pub struct UiNotification {
    pub event: &'static str,
    pub payload: Value,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<UiNotification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiNotification> {
        self.tx.subscribe()
    }

    /// Emit event to all listeners. No listener is not an error.
    pub fn emit<S: Serialize>(&self, event: &'static str, payload: S) {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                log::error!("Failed to serialize '{}' payload: {}", event, e);
                return;
            }
        };
        if self.tx.send(UiNotification { event, payload }).is_err() {
            log::debug!("No UI listener, event '{}' dropped", event);
        }
    }

    pub fn emit_threat_detected(&self, threat: &ThreatEvent) {
        self.emit(events::THREAT_DETECTED, threat);
    }

    pub fn emit_level_changed(&self, previous: SecurityLevel, current: SecurityLevel) {
        self.emit(
            events::SECURITY_LEVEL_CHANGED,
            json!({ "previous": previous, "current": current, "color": current.color() }),
        );
    }

    pub fn emit_show_warning(&self, title: &str, message: &str) {
        self.emit(events::SHOW_WARNING, json!({ "title": title, "message": message }));
    }
}
