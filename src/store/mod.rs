//! Storage backing the upload mock.
//!
//! Upload records live in an asynchronous key-value store. The store is a
//! trait so tests can substitute a failing or instrumented backend; the
//! bundled implementation keeps everything in memory.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;

mod upload;

pub use upload::UploadStore;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no upload found for id {0}")]
    NotFound(String),

    #[error("record vanished for key {0}")]
    RecordMissing(String),

    #[error("write of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    WriteOutOfBounds {
        offset: u64,
        len: usize,
        capacity: usize,
    },

    #[error("backend error: {0}")]
    Backend(String),
}

/// Transform applied by [`KeyValueStore::update`]: receives the current value
/// (if any) and produces the value to store back.
pub type UpdateFn = Box<dyn FnOnce(Option<Bytes>) -> Result<Bytes, StoreError> + Send>;

/// Asynchronous key-value store.
///
/// `update` is the read-modify-write primitive the upload store builds its
/// append on: load the current value, apply the transform, write the result
/// back. Implementations should make it atomic per key where the backing
/// store allows; without that, interleaved writers to the same key can lose
/// updates.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    async fn update(&self, key: &str, f: UpdateFn) -> Result<(), StoreError>;
}

/// In-memory key-value store.
///
/// `update` runs the transform under the map's per-entry lock, so a
/// read-modify-write on one key cannot interleave with another writer to the
/// same key.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Bytes>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn update(&self, key: &str, f: UpdateFn) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let next = f(Some(occupied.get().clone()))?;
                occupied.insert(next);
            }
            Entry::Vacant(vacant) => {
                // The transform decides whether an absent value is an error.
                let next = f(None)?;
                vacant.insert(next);
            }
        }
        Ok(())
    }
}
