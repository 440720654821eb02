//! Logic Module - Security Core
//!
//! Chứa các components: Threat Monitor, Encrypted Vault, Encrypted Log Store,
//! Countermeasure Controller.
//!
//! ## Structure
//! - `threat/` - detection heuristics, security level state machine
//! - `vault/` - sealed files, decoys, ghosts, vanishing locks, folder watches
//! - `telemetry/` - encrypted append-only security log
//! - `response/` - lockdown, panic ladder, kill switch
//! - `context` - wiring of all of the above

// Foundation
pub mod config;
pub mod crypto;
pub mod layout;
pub mod events;

// Components
pub mod threat;
pub mod telemetry;
pub mod vault;
pub mod response;

pub mod context;

#[cfg(test)]
pub mod test_support;

pub use context::{AppContext, ContextOptions, InitError};
