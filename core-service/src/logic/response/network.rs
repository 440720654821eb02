//! Network Kill Switch
//!
//! Mục đích: cắt outbound network khi lockdown.
//!
//! Conceptual only: the firewall commands for the platform are logged as
//! requested, never executed. The switch state is what the rest of the agent
//! observes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct KillSwitchState {
    pub engaged: bool,
    pub engaged_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct NetworkKillSwitch {
    engaged_at: Mutex<Option<DateTime<Utc>>>,
}

/// Firewall commands that would isolate the host on this platform
pub fn isolation_commands() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["netsh advfirewall set allprofiles firewallpolicy blockinbound,blockoutbound"]
    } else if cfg!(target_os = "macos") {
        &["pfctl -E", "pfctl -f /etc/pf.guardian.conf"]
    } else {
        &["iptables -P OUTPUT DROP", "ip6tables -P OUTPUT DROP"]
    }
}

/// Firewall commands that would undo `isolation_commands`
pub fn restore_commands() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["netsh advfirewall set allprofiles firewallpolicy blockinbound,allowoutbound"]
    } else if cfg!(target_os = "macos") {
        &["pfctl -d"]
    } else {
        &["iptables -P OUTPUT ACCEPT", "ip6tables -P OUTPUT ACCEPT"]
    }
}

impl NetworkKillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when already engaged.
    pub fn engage(&self) -> bool {
        let mut engaged_at = self.engaged_at.lock();
        if engaged_at.is_some() {
            return false;
        }
        *engaged_at = Some(Utc::now());
        for command in isolation_commands() {
            log::warn!("[KillSwitch] Outbound network disable requested: {}", command);
        }
        true
    }

    /// Returns false when not engaged.
    pub fn disengage(&self) -> bool {
        let mut engaged_at = self.engaged_at.lock();
        if engaged_at.take().is_none() {
            return false;
        }
        for command in restore_commands() {
            log::info!("[KillSwitch] Network restore requested: {}", command);
        }
        true
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged_at.lock().is_some()
    }

    pub fn state(&self) -> KillSwitchState {
        let engaged_at = *self.engaged_at.lock();
        KillSwitchState {
            engaged: engaged_at.is_some(),
            engaged_at,
        }
    }
}
