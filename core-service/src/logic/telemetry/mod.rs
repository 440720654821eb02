//! Telemetry Module
//!
//! Encrypted security log: every threat, countermeasure and error the agent
//! handles ends up here, independent of the plain process log.
//!
//! ## Structure
//! - `event.rs` - LogEntry (immutable, timestamped)
//! - `recorder.rs` - EncryptedLogStore (append-only, rotated, per-line AEAD)
//! - `exporter.rs` - Query + export (JSON, CSV, text)

pub mod event;
pub mod recorder;
pub mod exporter;

pub use event::{LogEntry, LogLevel, LogType};
pub use recorder::{EncryptedLogStore, LogReadout, LogStoreError, LogStoreStats};
pub use exporter::{export_to_file, query, render, ExportFormat, LogQuery};
