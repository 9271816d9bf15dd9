//! Entry id → [`Metadata`] mapping, grounded on the original
//! `nuggdb.Metastore`.

use crate::model::{EntryId, Metadata, MetadataError};

use super::{Error, KvStore, Result};

/// Maps [`EntryId`]s to their serialised [`Metadata`] record.
pub struct MetaStore<K: KvStore> {
    kv: K,
}

impl<K: KvStore> MetaStore<K> {
    pub fn new(kv: K) -> Self {
        MetaStore { kv }
    }

    /// Finds the metadata mapped to `entry_id`. Returns [`Error::NotFound`]
    /// if no such mapping exists.
    pub async fn lookup(&self, entry_id: EntryId) -> Result<Metadata> {
        let bytes = self.kv.lookup(entry_id.as_bytes()).await?;
        Metadata::deserialize(&bytes).map_err(|e: MetadataError| Error::Io(e.to_string()))
    }

    /// Sets the metadata for `meta.entry_id`.
    pub async fn put(&self, meta: &Metadata) -> Result<()> {
        self.kv.put(meta.entry_id.as_bytes(), &meta.serialize()).await
    }

    /// Removes the metadata entry for `entry_id`. Succeeds even if absent.
    pub async fn delete(&self, entry_id: EntryId) -> Result<()> {
        self.kv.delete(entry_id.as_bytes()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.kv.close().await
    }
}
