//! Upload record store.
//!
//! One record per upload session, held as two entries in the backing
//! key-value store: `{prefix}-data-{id}` carries the fixed-size payload
//! buffer and `{prefix}-offset-{id}` carries the count of contiguous bytes
//! received so far, encoded as a big-endian u64. Deriving both keys from the
//! id keeps the store free of any secondary index.

use super::{KeyValueStore, StoreError};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::debug;

pub struct UploadStore<S> {
    kv: Arc<S>,
    prefix: String,
}

impl<S: KeyValueStore> UploadStore<S> {
    pub fn new(kv: Arc<S>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    fn data_key(&self, id: &str) -> String {
        format!("{}-data-{}", self.prefix, id)
    }

    fn offset_key(&self, id: &str) -> String {
        format!("{}-offset-{}", self.prefix, id)
    }

    /// Allocate a zero-filled buffer of `declared_length` bytes and reset the
    /// received offset to 0.
    ///
    /// Silently replaces any prior record for `id`; callers are expected to
    /// use fresh ids. The offset entry is written last so `exists` never
    /// observes a half-created record. Lengths no buffer can hold are
    /// refused as a backend error rather than attempted.
    pub async fn create(&self, id: &str, declared_length: u64) -> Result<(), StoreError> {
        let capacity = usize::try_from(declared_length)
            .ok()
            .filter(|capacity| *capacity <= isize::MAX as usize)
            .ok_or_else(|| {
                StoreError::Backend(format!("cannot allocate a {} byte buffer", declared_length))
            })?;
        let buffer = Bytes::from(vec![0u8; capacity]);
        self.kv.put(&self.data_key(id), buffer).await?;
        self.kv.put(&self.offset_key(id), encode_offset(0)).await?;
        debug!(id, declared_length, "created upload record");
        Ok(())
    }

    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.kv.get(&self.offset_key(id)).await?.is_some())
    }

    /// Declared total length, i.e. the size of the payload buffer.
    pub async fn upload_length(&self, id: &str) -> Result<u64, StoreError> {
        let data = self
            .kv
            .get(&self.data_key(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(data.len() as u64)
    }

    /// Number of contiguous bytes received from the start of the upload.
    pub async fn upload_offset(&self, id: &str) -> Result<u64, StoreError> {
        let raw = self
            .kv
            .get(&self.offset_key(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        decode_offset(&raw)
    }

    /// Write `bytes` into the record's buffer starting at `offset`, then
    /// advance the stored offset to `offset + bytes.len()`.
    ///
    /// The buffer mutation is a single read-modify-write against the data
    /// key; the offset advance is a separate put. A failure between the two
    /// leaves the buffer ahead of the offset. The mock targets sequential
    /// test traffic, so no attempt is made to close that window.
    pub async fn append(&self, id: &str, offset: u64, bytes: Bytes) -> Result<(), StoreError> {
        let data_key = self.data_key(id);
        let len = bytes.len();
        let missing_key = data_key.clone();

        self.kv
            .update(
                &data_key,
                Box::new(move |current| {
                    let current = current.ok_or(StoreError::RecordMissing(missing_key))?;
                    let capacity = current.len();
                    let start = usize::try_from(offset).map_err(|_| {
                        StoreError::WriteOutOfBounds { offset, len, capacity }
                    })?;
                    let end = start
                        .checked_add(len)
                        .filter(|end| *end <= capacity)
                        .ok_or(StoreError::WriteOutOfBounds { offset, len, capacity })?;

                    let mut buffer = BytesMut::from(&current[..]);
                    buffer[start..end].copy_from_slice(&bytes);
                    Ok(buffer.freeze())
                }),
            )
            .await?;

        let new_offset = offset + len as u64;
        self.kv.put(&self.offset_key(id), encode_offset(new_offset)).await?;
        debug!(id, offset, len, new_offset, "applied append");
        Ok(())
    }

    /// Current buffer contents, or empty bytes if the record does not exist.
    ///
    /// Fallback used by the append recovery response, not a normal-path read.
    pub async fn body(&self, id: &str) -> Result<Bytes, StoreError> {
        Ok(self
            .kv
            .get(&self.data_key(id))
            .await?
            .unwrap_or_else(Bytes::new))
    }
}

fn encode_offset(offset: u64) -> Bytes {
    Bytes::copy_from_slice(&offset.to_be_bytes())
}

fn decode_offset(raw: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = raw
        .try_into()
        .map_err(|_| StoreError::Backend(format!("offset entry has {} bytes, expected 8", raw.len())))?;
    Ok(u64::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::super::MemoryKvStore;
    use super::*;

    fn store() -> UploadStore<MemoryKvStore> {
        UploadStore::new(Arc::new(MemoryKvStore::new()), "tus-mock")
    }

    #[tokio::test]
    async fn test_create_initializes_length_and_offset() {
        let store = store();
        store.create("a", 10).await.unwrap();

        assert!(store.exists("a").await.unwrap());
        assert_eq!(store.upload_length("a").await.unwrap(), 10);
        assert_eq!(store.upload_offset("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_zero_length() {
        let store = store();
        store.create("empty", 0).await.unwrap();

        assert_eq!(store.upload_length("empty").await.unwrap(), 0);
        assert_eq!(store.upload_offset("empty").await.unwrap(), 0);
        assert!(store.body("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_unallocatable_length() {
        let store = store();
        let result = store.create("huge", u64::MAX).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert!(!store.exists("huge").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_id_errors() {
        let store = store();
        assert!(!store.exists("ghost").await.unwrap());
        assert!(matches!(
            store.upload_length("ghost").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.upload_offset("ghost").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_chained_appends_pad_with_zeros() {
        let store = store();
        store.create("a", 10).await.unwrap();

        store.append("a", 0, Bytes::from_static(b"abc")).await.unwrap();
        store.append("a", 3, Bytes::from_static(b"de")).await.unwrap();

        assert_eq!(store.upload_offset("a").await.unwrap(), 5);
        assert_eq!(
            store.body("a").await.unwrap(),
            Bytes::from_static(b"abcde\0\0\0\0\0")
        );
    }

    #[tokio::test]
    async fn test_append_to_missing_record() {
        let store = store();
        let result = store.append("ghost", 0, Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(StoreError::RecordMissing(_))));
    }

    #[tokio::test]
    async fn test_append_past_buffer_end() {
        let store = store();
        store.create("a", 4).await.unwrap();

        let result = store.append("a", 0, Bytes::from_static(b"too long")).await;
        assert!(matches!(result, Err(StoreError::WriteOutOfBounds { .. })));

        // Nothing observable changed.
        assert_eq!(store.upload_offset("a").await.unwrap(), 0);
        assert_eq!(store.body("a").await.unwrap(), Bytes::from_static(b"\0\0\0\0"));
    }

    #[tokio::test]
    async fn test_body_falls_back_to_empty() {
        let store = store();
        assert!(store.body("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_are_isolated_by_id() {
        let store = store();
        store.create("a", 4).await.unwrap();
        store.create("b", 8).await.unwrap();
        store.append("a", 0, Bytes::from_static(b"hiya")).await.unwrap();

        assert_eq!(store.upload_offset("a").await.unwrap(), 4);
        assert_eq!(store.upload_offset("b").await.unwrap(), 0);
        assert_eq!(store.upload_length("b").await.unwrap(), 8);
    }
}
