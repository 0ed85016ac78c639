//! Key-value blob storage abstraction.
//!
//! The [`KeyValueStore`] trait is the only view kbqa has of local
//! persistent state: string values under string keys, read and written
//! synchronously. The bookmark store serializes its set into one value.
//!
//! Implementations must be `Send + Sync` so a store can be shared with
//! async tasks.

pub mod memory;

use crate::error::Result;

/// Abstract key-value medium (a file, browser-style local storage, memory).
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](KeyValueStore::get) | Read a value, `None` if the key was never written |
/// | [`set`](KeyValueStore::set) | Write a value, durable once this returns `Ok` |
/// | [`remove`](KeyValueStore::remove) | Delete a key, no-op if absent |
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}
