//! Response Module - Countermeasures
//!
//! Mục đích: phản ứng tự động theo security level và passphrase khẩn cấp.
//!
//! # Components
//! - `controller.rs`: lockdown / panic state and notice dispatch
//! - `network.rs`: outbound network kill switch
//! - `panic.rs`: passphrase detection, simulated crash, termination

pub mod controller;
pub mod network;
pub mod panic;

#[cfg(test)]
mod tests;

pub use controller::{CountermeasureController, LockdownReport};
pub use network::{KillSwitchState, NetworkKillSwitch};
pub use panic::{detect_passphrase, PanicTrigger, ProcessTerminator, Terminator};
