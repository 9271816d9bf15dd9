//! Unique path string → [`EntryId`] mapping, grounded on the original
//! `nuggdb.Pathstore`.

use crate::model::EntryId;

use super::{Error, KvStore, Result};

/// Maps filesystem paths to the [`EntryId`] currently occupying them.
pub struct PathStore<K: KvStore> {
    kv: K,
}

impl<K: KvStore> PathStore<K> {
    pub fn new(kv: K) -> Self {
        PathStore { kv }
    }

    /// Finds the entry id mapped to `path`. Returns [`Error::NotFound`] if
    /// no such mapping exists.
    pub async fn lookup(&self, path: &str) -> Result<EntryId> {
        let bytes = self.kv.lookup(path.as_bytes()).await?;
        if bytes.len() != 12 {
            return Err(Error::Io("path store value is not a 12-byte entry id".into()));
        }
        let mut id = [0u8; 12];
        id.copy_from_slice(&bytes);
        Ok(EntryId(id))
    }

    /// Sets the entry id for `path`.
    pub async fn put(&self, path: &str, entry_id: EntryId) -> Result<()> {
        self.kv.put(path.as_bytes(), entry_id.as_bytes()).await
    }

    /// Removes the mapping for `path`. Succeeds even if it was absent.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.kv.delete(path.as_bytes()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.kv.close().await
    }
}
