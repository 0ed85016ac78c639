//! Persisted bookmark set.
//!
//! Bookmarks are file names the user has starred. They are loaded once at
//! startup from a [`KeyValueStore`] and written back synchronously after
//! every toggle, so the set found after a restart always reflects the last
//! toggle.
//!
//! Storage problems never block the caller: a missing or corrupt value
//! loads as an empty set, and a failed write is logged and otherwise
//! ignored (the in-memory set still changes).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::kv::KeyValueStore;

/// Key under which the bookmark array is stored.
pub const BOOKMARKS_KEY: &str = "bookmarkedFiles";

/// A set of bookmarked file names, serialized as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkSet(BTreeSet<String>);

impl BookmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Symmetric difference with `{name}`: removes it if present, adds it otherwise.
    pub fn toggled(&self, name: &str) -> Self {
        let mut next = self.0.clone();
        if !next.remove(name) {
            next.insert(name.to_string());
        }
        Self(next)
    }
}

impl<S: Into<String>> FromIterator<S> for BookmarkSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Bookmark set bound to its persisted copy.
pub struct BookmarkStore<K> {
    kv: K,
    key: String,
    set: BookmarkSet,
}

impl<K: KeyValueStore> BookmarkStore<K> {
    /// Open the store, loading the persisted set under `key`.
    pub fn open(kv: K, key: impl Into<String>) -> Self {
        let key = key.into();
        let set = Self::load_from(&kv, &key);
        Self { kv, key, set }
    }

    /// Read the persisted set. Never fails: absence, read errors, and
    /// unparseable values all yield an empty set.
    pub fn load(&self) -> BookmarkSet {
        Self::load_from(&self.kv, &self.key)
    }

    fn load_from(kv: &K, key: &str) -> BookmarkSet {
        let raw = match kv.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BookmarkSet::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "could not read bookmarks; starting empty");
                return BookmarkSet::new();
            }
        };

        match serde_json::from_str::<BookmarkSet>(&raw) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring corrupt bookmark value");
                BookmarkSet::new()
            }
        }
    }

    /// Replace the current set and persist it immediately.
    pub fn save(&mut self, set: BookmarkSet) {
        self.set = set;
        let encoded = match serde_json::to_string(&self.set) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "could not encode bookmarks");
                return;
            }
        };
        if let Err(e) = self.kv.set(&self.key, &encoded) {
            tracing::warn!(key = %self.key, error = %e, "could not persist bookmarks");
        }
    }

    /// Flip membership of `name`, persist, and return the new set.
    pub fn toggle(&mut self, name: &str) -> &BookmarkSet {
        let next = self.set.toggled(name);
        tracing::debug!(name, bookmarked = next.contains(name), "bookmark toggled");
        self.save(next);
        &self.set
    }

    pub fn bookmarks(&self) -> &BookmarkSet {
        &self.set
    }

    pub fn contains(&self, name: &str) -> bool {
        self.set.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;
    use std::sync::Arc;

    #[test]
    fn test_toggle_twice_restores_original() {
        let original: BookmarkSet = ["a.txt", "b.txt"].into_iter().collect();
        assert_eq!(original.toggled("c.txt").toggled("c.txt"), original);
        assert_eq!(original.toggled("a.txt").toggled("a.txt"), original);
    }

    #[test]
    fn test_toggle_persists_every_call() {
        let kv = Arc::new(MemoryKv::new());
        let mut store = BookmarkStore::open(kv.clone(), BOOKMARKS_KEY);
        assert!(store.bookmarks().is_empty());

        store.toggle("b.txt");
        assert_eq!(kv.get(BOOKMARKS_KEY).unwrap().as_deref(), Some(r#"["b.txt"]"#));

        store.toggle("a.txt");
        store.toggle("b.txt");
        assert_eq!(kv.get(BOOKMARKS_KEY).unwrap().as_deref(), Some(r#"["a.txt"]"#));

        let reopened = BookmarkStore::open(kv, BOOKMARKS_KEY);
        assert!(reopened.contains("a.txt"));
        assert!(!reopened.contains("b.txt"));
    }

    #[test]
    fn test_corrupt_value_loads_empty() {
        let kv = MemoryKv::with_value(BOOKMARKS_KEY, "{not json");
        let store = BookmarkStore::open(kv, BOOKMARKS_KEY);
        assert!(store.bookmarks().is_empty());
    }

    #[test]
    fn test_wrong_shape_loads_empty() {
        let kv = MemoryKv::with_value(BOOKMARKS_KEY, r#"{"a.txt": true}"#);
        let store = BookmarkStore::open(kv, BOOKMARKS_KEY);
        assert!(store.bookmarks().is_empty());
    }

    #[test]
    fn test_failed_write_still_updates_memory() {
        let kv = Arc::new(MemoryKv::new());
        kv.fail_writes(true);
        let mut store = BookmarkStore::open(kv.clone(), BOOKMARKS_KEY);
        store.toggle("a.txt");
        assert!(store.contains("a.txt"));
        assert_eq!(kv.get(BOOKMARKS_KEY).unwrap(), None);
    }

    #[test]
    fn test_load_rereads_medium() {
        let kv = Arc::new(MemoryKv::new());
        let store = BookmarkStore::open(kv.clone(), BOOKMARKS_KEY);
        kv.set(BOOKMARKS_KEY, r#"["z.txt"]"#).unwrap();
        assert!(store.load().contains("z.txt"));
        assert!(!store.contains("z.txt"));
    }
}
