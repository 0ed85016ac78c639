//! JSON-file key-value store.
//!
//! [`FileKv`] keeps every key in one JSON object on disk:
//!
//! ```json
//! { "bookmarkedFiles": "[\"notes.txt\"]" }
//! ```
//!
//! Values are opaque strings; callers serialize their own data into them.
//! Writes go to a sibling temp file which is then renamed over the target,
//! so a crash mid-write leaves the previous contents intact. A missing file
//! reads as an empty store. A file that is not valid JSON fails reads, and
//! the next write moves it aside and starts a fresh store.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use kbqa_core::kv::KeyValueStore;
use kbqa_core::{KbError, Result};

pub struct FileKv {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_raw(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match self.read_raw()? {
            None => Ok(BTreeMap::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| storage_error(&self.path, e)),
        }
    }

    /// Like [`read_all`](Self::read_all), but a file that does not parse is
    /// moved aside to `*.corrupt` and treated as empty so the next write
    /// replaces it.
    fn read_for_write(&self) -> Result<BTreeMap<String, String>> {
        let Some(raw) = self.read_raw()? else {
            return Ok(BTreeMap::new());
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let aside = self.path.with_extension("json.corrupt");
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "store file is not valid JSON; starting over"
                );
                if let Err(e) = std::fs::rename(&self.path, &aside) {
                    tracing::debug!(error = %e, "could not move corrupt store aside");
                }
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
            }
        }

        let json = serde_json::to_string_pretty(entries).map_err(|e| storage_error(&self.path, e))?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp).map_err(|e| storage_error(&tmp, e))?;
            file.write_all(json.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|e| storage_error(&tmp, e))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, e))
    }

    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_for_write()?;
        if change(&mut entries) {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> KbError {
    KbError::Storage(format!("{}: {}", path.display(), e))
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbqa_core::bookmarks::{BookmarkStore, BOOKMARKS_KEY};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let kv = FileKv::new(tmp.path().join("absent.json"));
        assert_eq!(kv.get("anything").unwrap(), None);
    }

    #[test]
    fn test_set_get_remove() {
        let tmp = TempDir::new().unwrap();
        let kv = FileKv::new(tmp.path().join("nested/dir/store.json"));

        kv.set("a", "1").unwrap();
        kv.set("b", "2").unwrap();
        assert_eq!(kv.get("a").unwrap().as_deref(), Some("1"));

        kv.remove("a").unwrap();
        assert_eq!(kv.get("a").unwrap(), None);
        assert_eq!(kv.get("b").unwrap().as_deref(), Some("2"));

        // removing an absent key is a no-op
        kv.remove("a").unwrap();
        assert!(!tmp.path().join("nested/dir/store.json.tmp").exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        FileKv::new(&path).set("k", "v").unwrap();
        assert_eq!(FileKv::new(&path).get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_corrupt_file_fails_reads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let kv = FileKv::new(&path);
        assert!(matches!(kv.get("k"), Err(KbError::Storage(_))));
    }

    #[test]
    fn test_write_replaces_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let kv = FileKv::new(&path);
        kv.set("k", "v").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("store.json.corrupt")).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_toggle_survives_restart_after_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = BookmarkStore::open(FileKv::new(&path), BOOKMARKS_KEY);
        assert!(store.bookmarks().is_empty());
        store.toggle("a.txt");

        let reopened = BookmarkStore::open(FileKv::new(&path), BOOKMARKS_KEY);
        assert!(reopened.contains("a.txt"));
        assert_eq!(reopened.bookmarks().len(), 1);
    }

    #[test]
    fn test_bookmarks_persist_through_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");

        let mut store = BookmarkStore::open(FileKv::new(&path), BOOKMARKS_KEY);
        store.toggle("b.txt");
        store.toggle("a.txt");

        let reopened = BookmarkStore::open(FileKv::new(&path), BOOKMARKS_KEY);
        assert!(reopened.contains("a.txt"));
        assert!(reopened.contains("b.txt"));
        assert_eq!(reopened.bookmarks().len(), 2);
    }
}
