//! In-memory [`KeyValueStore`] for tests and ephemeral runs.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Writes can be made to fail
//! on demand so callers can exercise their degraded paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::error::{KbError, Result};

use super::KeyValueStore;

/// In-memory key-value store.
#[derive(Default)]
pub struct MemoryKv {
    values: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key, e.g. with a corrupt value.
    pub fn with_value(key: &str, value: &str) -> Self {
        let kv = Self::new();
        kv.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        kv
    }

    /// Make every subsequent `set`/`remove` fail with [`KbError::Storage`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KbError::Storage("memory store is read-only".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_is_none() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("nope").unwrap(), None);
    }

    #[test]
    fn test_set_then_get() {
        let kv = MemoryKv::new();
        kv.set("k", "v").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("v"));
        kv.remove("k").unwrap();
        assert_eq!(kv.get("k").unwrap(), None);
    }

    #[test]
    fn test_failing_writes_keep_old_value() {
        let kv = MemoryKv::with_value("k", "old");
        kv.fail_writes(true);
        assert!(matches!(kv.set("k", "new"), Err(KbError::Storage(_))));
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("old"));
    }
}
