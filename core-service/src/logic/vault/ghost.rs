//! Ghost markers
//!
//! A ghost file's bytes are replaced by `GHOST|<name>|<created>` with every
//! byte shifted by a constant. Obfuscation only, not encryption.

use chrono::{DateTime, Utc};

const SHIFT: u8 = 7;
const TAG: &str = "GHOST";

pub fn marker(file_name: &str, created_at: DateTime<Utc>) -> Vec<u8> {
    format!("{}|{}|{}", TAG, file_name, created_at.to_rfc3339())
        .into_bytes()
        .into_iter()
        .map(|b| b.wrapping_add(SHIFT))
        .collect()
}

/// Decode a marker back to `(file_name, created_at)`.
pub fn reveal(bytes: &[u8]) -> Option<(String, DateTime<Utc>)> {
    let plain: Vec<u8> = bytes.iter().map(|b| b.wrapping_sub(SHIFT)).collect();
    let text = String::from_utf8(plain).ok()?;
    let mut parts = text.splitn(3, '|');
    if parts.next()? != TAG {
        return None;
    }
    let name = parts.next()?.to_string();
    let created = DateTime::parse_from_rfc3339(parts.next()?).ok()?;
    Some((name, created.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_is_shifted_and_reversible() {
        let now = Utc::now();
        let bytes = marker("secrets.env", now);
        assert!(!String::from_utf8_lossy(&bytes).contains("secrets.env"));

        let (name, created) = reveal(&bytes).unwrap();
        assert_eq!(name, "secrets.env");
        assert_eq!(created, now);
    }

    #[test]
    fn test_reveal_rejects_other_content() {
        assert!(reveal(b"print('hello')").is_none());
    }
}
