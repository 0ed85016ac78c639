//! Data models exchanged with the knowledge-base backend.
//!
//! These types mirror the JSON shapes served by the backend. A [`KbFile`]
//! is identified by its raw `name`; [`KbFile::display_name`] is purely
//! cosmetic and never used for identity.

use serde::{Deserialize, Serialize};

/// Suffix stripped from file names for display.
pub const DISPLAY_SUFFIX: &str = ".txt";

/// A file in the remote knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbFile {
    /// Unique remote identifier (e.g. `"handbook.txt"`).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time as seconds since the Unix epoch, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<f64>,
    /// File suffix as reported by the backend (e.g. `".txt"`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl KbFile {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified: None,
            kind: None,
        }
    }

    /// The name shown to users: [`DISPLAY_SUFFIX`] removed when present.
    pub fn display_name(&self) -> &str {
        display_name(&self.name)
    }
}

/// Strip [`DISPLAY_SUFFIX`] from a file name, if present.
pub fn display_name(name: &str) -> &str {
    name.strip_suffix(DISPLAY_SUFFIX).unwrap_or(name)
}

/// Response of `GET /kb`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileListing {
    #[serde(default)]
    pub files: Vec<KbFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Informational note, e.g. when the backend's KB folder is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One hit from `POST /search/kb`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbSearchHit {
    pub filename: String,
    pub content_snippet: String,
}

/// Response of `POST /search/kb`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbSearchResponse {
    #[serde(default)]
    pub results: Vec<KbSearchHit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Format a byte count for humans using base-1024 units.
///
/// Values keep at most two decimals with trailing zeros removed:
/// `0` → `"0 Bytes"`, `2000` → `"1.95 KB"`, `1048576` → `"1 MB"`.
/// Anything at or above 1 TiB is still expressed in GB.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    while unit + 1 < SIZE_UNITS.len() && bytes >= 1024u64.pow(unit as u32 + 1) {
        unit += 1;
    }

    let value = bytes as f64 / 1024f64.powi(unit as i32);
    let rendered = format!("{:.2}", value);
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, SIZE_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_strips_txt() {
        assert_eq!(display_name("notes.txt"), "notes");
        assert_eq!(display_name("notes.md"), "notes.md");
        assert_eq!(display_name(".txt"), "");
        assert_eq!(KbFile::new("a.txt.txt", 1).display_name(), "a.txt");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(500), "500 Bytes");
        assert_eq!(format_file_size(1023), "1023 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(2000), "1.95 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
        assert_eq!(format_file_size(2048 * 1024 * 1024 * 1024), "2048 GB");
    }

    #[test]
    fn test_listing_accepts_extra_fields() {
        let raw = r#"{
            "files": [{"name": "a.txt", "size": 12, "last_modified": 1700000000.5, "type": ".txt"}],
            "count": 1
        }"#;
        let listing: FileListing = serde_json::from_str(raw).unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].kind.as_deref(), Some(".txt"));
        assert_eq!(listing.count, Some(1));
        assert!(listing.message.is_none());
    }

    #[test]
    fn test_listing_missing_files_is_empty() {
        let listing: FileListing =
            serde_json::from_str(r#"{"message": "Knowledge base folder 'kb' not found"}"#).unwrap();
        assert!(listing.files.is_empty());
        assert!(listing.message.is_some());
    }
}
