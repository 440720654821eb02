//! Guardian Core - Threat-Response Security Core
//!
//! Host-local protective agent: threat monitor, security level state machine,
//! countermeasure ladder and the encrypted vault / encrypted log storage layer.

pub mod api;
pub mod constants;
pub mod logic;
