//! Generic key-value store contract and its `sled`-backed implementation.
//!
//! Grounded on the `KvStore` wrapper in
//! `maidsafe-temp_safe_network/sn/src/dbs/kv_store`, adapted from a typed,
//! subdirectory-per-value-type store to the opaque-bytes contract spec.md
//! §4.1 describes.

use async_trait::async_trait;

use super::{Error, Result};

/// Durable mapping of opaque keys to opaque byte values, atomic per-put.
/// Each store opens a single backing file (or directory, for the fan-out
/// chunk store variant) exclusively.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn lookup(&self, key: &[u8]) -> Result<Vec<u8>>;
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    /// Removes `key`. Succeeds even if the key was not present.
    async fn delete(&self, key: &[u8]) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Embedded transactional key-value file, backed by a single `sled::Db`
/// tree. `put`/`delete` are atomically durable with respect to concurrent
/// readers because `sled` serializes single-key writes internally.
pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    /// Opens (or creates) the store backed by the file at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(SledKvStore { db })
    }
}

#[async_trait]
impl KvStore for SledKvStore {
    async fn lookup(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.db.get(key)? {
            Some(v) => Ok(v.to_vec()),
            None => Err(Error::NotFound),
        }
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.remove(key)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path().join("kv.db")).unwrap();
        store.put(b"key", b"value").await.unwrap();
        assert_eq!(store.lookup(b"key").await.unwrap(), b"value");
    }

    #[tokio::test]
    async fn lookup_of_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path().join("kv.db")).unwrap();
        assert!(matches!(store.lookup(b"missing").await, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn delete_of_missing_key_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path().join("kv.db")).unwrap();
        store.delete(b"missing").await.unwrap();
    }
}
