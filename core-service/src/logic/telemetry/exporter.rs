//! Security Log Query & Export
//!
//! Filters decrypted entries and renders them as JSON (machine), CSV or plain
//! text (human). Exports are plaintext by nature; callers choose where they go.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{LogEntry, LogType};
use super::recorder::{EncryptedLogStore, LogStoreError};

// ============================================================================
// QUERY
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogQuery {
    pub log_type: Option<LogType>,
    /// Case-insensitive substring over the entry's JSON form
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Newest N matches
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(t) = self.log_type {
            if entry.log_type != t {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp > to {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref().filter(|s| !s.is_empty()) {
            if !entry.to_json().to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Matching entries in chronological order.
pub fn query(store: &EncryptedLogStore, q: &LogQuery) -> Result<Vec<LogEntry>, LogStoreError> {
    let mut entries: Vec<LogEntry> = store
        .read_all()?
        .entries
        .into_iter()
        .filter(|e| q.matches(e))
        .collect();

    if let Some(limit) = q.limit {
        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
    }
    Ok(entries)
}

// ============================================================================
// EXPORT FORMATS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty JSON array
    Json,
    /// CSV for spreadsheet analysis
    Csv,
    /// One line per entry, for reading
    Text,
}

/// Render entries in the requested format.
pub fn render(entries: &[LogEntry], format: ExportFormat) -> Result<String, LogStoreError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
        ExportFormat::Csv => Ok(render_csv(entries)),
        ExportFormat::Text => Ok(render_text(entries)),
    }
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn render_csv(entries: &[LogEntry]) -> String {
    let mut out = String::from("id,timestamp,type,level,payload\n");
    for entry in entries {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            entry.id,
            entry.timestamp.to_rfc3339(),
            entry.log_type.as_str(),
            entry.level.as_str(),
            csv_field(&entry.payload.to_string())
        ));
    }
    out
}

fn render_text(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "[{}] {:<11} {:<8} {}\n",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.log_type.as_str(),
            entry.level.as_str().to_uppercase(),
            entry.payload
        ));
    }
    out
}

/// Query, render and write to `destination`. Returns the entry count.
pub fn export_to_file(
    store: &EncryptedLogStore,
    q: &LogQuery,
    format: ExportFormat,
    destination: &Path,
) -> Result<usize, LogStoreError> {
    let entries = query(store, q)?;
    let rendered = render(&entries, format)?;
    let mut file = std::fs::File::create(destination)?;
    file.write_all(rendered.as_bytes())?;
    log::info!(
        "[LogStore] Exported {} entries as {:?} to {:?}",
        entries.len(),
        format,
        destination
    );
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::config::LogStoreConfig;
    use crate::logic::crypto::SecretKey;
    use serde_json::json;
    use tempfile::TempDir;

    fn populated_store(dir: &TempDir) -> EncryptedLogStore {
        let store = EncryptedLogStore::open(
            dir.path().join("logs"),
            &SecretKey::generate(),
            LogStoreConfig::default(),
        )
        .unwrap();
        store.append(&LogEntry::security("agent started", json!({}))).unwrap();
        store.append(&LogEntry::action("lockdown_activated", json!({ "folders": 1 }))).unwrap();
        store.append(&LogEntry::error("decrypt", "record tampered")).unwrap();
        store.append(&LogEntry::action("lockdown_deactivated", json!({}))).unwrap();
        store
    }

    #[test]
    fn test_filter_by_type() {
        let dir = TempDir::new().unwrap();
        let store = populated_store(&dir);

        let q = LogQuery {
            log_type: Some(LogType::Action),
            ..Default::default()
        };
        let entries = query(&store, &q).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.log_type == LogType::Action));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let store = populated_store(&dir);

        let q = LogQuery {
            search: Some("TAMPERED".to_string()),
            ..Default::default()
        };
        let entries = query(&store, &q).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].log_type, LogType::Error);
    }

    #[test]
    fn test_date_range_and_limit() {
        let dir = TempDir::new().unwrap();
        let store = populated_store(&dir);

        let future = LogQuery {
            from: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(query(&store, &future).unwrap().is_empty());

        let newest = LogQuery {
            limit: Some(1),
            ..Default::default()
        };
        let entries = query(&store, &newest).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload["action"], "lockdown_deactivated");
    }

    #[test]
    fn test_render_formats() {
        let entries = vec![LogEntry::error("vault", "bad \"quote\"")];

        let csv = render(&entries, ExportFormat::Csv).unwrap();
        assert!(csv.starts_with("id,timestamp,type,level,payload\n"));
        assert!(csv.contains(",ERROR,error,"));
        assert!(csv.contains(r#""{""context"":""vault"""#));

        let text = render(&entries, ExportFormat::Text).unwrap();
        assert!(text.contains("ERROR"));
        assert_eq!(text.lines().count(), 1);

        let json = render(&entries, ExportFormat::Json).unwrap();
        let parsed: Vec<LogEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn test_export_to_file() {
        let dir = TempDir::new().unwrap();
        let store = populated_store(&dir);
        let dest = dir.path().join("export.txt");

        let count = export_to_file(&store, &LogQuery::default(), ExportFormat::Text, &dest).unwrap();
        assert_eq!(count, 4);
        assert_eq!(std::fs::read_to_string(&dest).unwrap().lines().count(), 4);
    }
}
