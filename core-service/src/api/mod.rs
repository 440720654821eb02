//! API Module
//!
//! Structure:
//! - commands.rs: command surface over an `AppContext`
//!
//! Usage:
//! - `api::commands::get_security_status(&ctx)` - Direct access
//! - `api::get_security_status(&ctx)` - Re-export

pub mod commands;

pub use commands::*;
