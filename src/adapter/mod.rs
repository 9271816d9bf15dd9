//! The filesystem adapter: a thin stateful bridge from path-based VFS
//! operations to a [`DataSourceSink`], stamping stable inode numbers and
//! composing name-level overrides at the mount root. Grounded on the
//! original `nuggtofuse/main.go`, `dir.go`, `file.go`, with the override
//! map supplemented by the `sys` status subtree from `sysstatfs/`.

pub mod inode;
pub mod status;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::model::DirectoryEntry;
use crate::provider::{self, DataSourceSink};

use inode::PathAwareAllocator;
use status::StatusOverride;

/// Errors surfaced to whatever kernel VFS shim drives this adapter.
#[derive(Debug)]
pub enum Error {
    /// A name component contained a path separator.
    Permission,
    /// The path does not exist.
    NotFound,
    /// The provider reported an error with no closer VFS analogue.
    Io(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Permission => write!(f, "operation not permitted"),
            Error::NotFound => write!(f, "no such file or directory"),
            Error::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

fn map_provider_err(e: provider::Error) -> Error {
    match e {
        provider::Error::PathNotFound | provider::Error::MetaNotFound | provider::Error::ChunkNotFound => {
            Error::NotFound
        }
        other => Error::Io(other.to_string()),
    }
}

/// POSIX-ish file mode bits the adapter hands back; the provider doesn't
/// model permissions beyond "everyone may read and write" (spec.md §4.9).
pub const FILE_MODE: u32 = 0o777;
pub const DIR_MODE: u32 = 0o777;

/// Attributes populated for one VFS node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub inode: u64,
    pub is_dir: bool,
    pub mode: u32,
    pub size: u64,
}

/// A directory listing entry: a name and the inode it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub inode: u64,
    pub is_dir: bool,
}

fn reject_slash(name: &str) -> Result<()> {
    if name.contains('/') {
        return Err(Error::Permission);
    }
    Ok(())
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// How long a cached [`Attr`] is trusted before a fresh provider lookup
/// is required; short enough that the known same-path-mutation race
/// (spec.md §5) can't leave a stale entry visible for long.
const ATTR_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(2);

/// Bridges path-based VFS operations onto a [`DataSourceSink`], holding
/// an inode allocator and a map of name-level overrides grafted onto the
/// mount root.
pub struct Adapter<A: PathAwareAllocator> {
    provider: Arc<dyn DataSourceSink>,
    inodes: A,
    overrides: Mutex<HashMap<String, Arc<StatusOverride>>>,
    attr_cache: moka::sync::Cache<String, Attr>,
}

impl<A: PathAwareAllocator> Adapter<A> {
    pub fn new(provider: Arc<dyn DataSourceSink>, inodes: A) -> Self {
        let attr_cache =
            moka::sync::Cache::builder().time_to_live(ATTR_CACHE_TTL).max_capacity(10_000).build();
        Adapter { provider, inodes, overrides: Mutex::new(HashMap::new()), attr_cache }
    }

    /// Grafts a status override onto the root under `name` (spec.md
    /// §4.9, default name `sys`).
    pub async fn register_override(&self, name: &str, tree: StatusOverride) {
        let mut overrides = self.overrides.lock().await;
        overrides.insert(name.to_string(), Arc::new(tree));
    }

    async fn override_named(&self, name: &str) -> Option<Arc<StatusOverride>> {
        let overrides = self.overrides.lock().await;
        overrides.get(name).cloned()
    }

    async fn override_names(&self) -> Vec<String> {
        let overrides = self.overrides.lock().await;
        overrides.keys().cloned().collect()
    }

    /// Root `lookup(name)`: override names win over the provider
    /// namespace (spec.md §4.9).
    pub async fn lookup(&self, parent: &str, name: &str) -> Result<Attr> {
        reject_slash(name)?;
        if parent == "/" {
            if let Some(tree) = self.override_named(name).await {
                return Ok(Attr { inode: tree.inode(), is_dir: true, mode: DIR_MODE, size: 0 });
            }
        }
        self.attr(&join(parent, name)).await
    }

    /// Populates attributes for an absolute path. Mode is always 0777;
    /// the provider does not model finer permissions (spec.md §4.9).
    /// Cached for [`ATTR_CACHE_TTL`]; any local mutation of `path`
    /// invalidates its entry immediately.
    pub async fn attr(&self, path: &str) -> Result<Attr> {
        if let Some(cached) = self.attr_cache.get(path) {
            return Ok(cached);
        }
        let entry_id = self.provider.lookup(path).await.map_err(map_provider_err)?;
        let meta = self.provider.read_meta(entry_id).await.map_err(map_provider_err)?;
        let inode = self.inodes.get_by_path(path).await;
        let attr = Attr {
            inode,
            is_dir: meta.is_dir,
            mode: if meta.is_dir { DIR_MODE } else { FILE_MODE },
            size: meta.size,
        };
        self.attr_cache.insert(path.to_string(), attr);
        Ok(attr)
    }

    /// Root `readdir`: provider children under `/` plus every override
    /// name (spec.md §4.9).
    pub async fn read_dir(&self, path: &str) -> Result<Vec<Listing>> {
        let entries: Vec<DirectoryEntry> = self.provider.list(path).await.map_err(map_provider_err)?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let inode = self.inodes.get_by_path(&entry.name).await;
            let name = entry.name.rsplit('/').next().unwrap_or(&entry.name).to_string();
            out.push(Listing { name, inode, is_dir: entry.is_dir });
        }
        if path == "/" {
            for name in self.override_names().await {
                if let Some(tree) = self.override_named(&name).await {
                    out.push(Listing { name, inode: tree.inode(), is_dir: true });
                }
            }
        }
        Ok(out)
    }

    /// Root `readdir` on an override subtree: lists its variables.
    pub async fn read_override_dir(&self, name: &str) -> Result<Vec<Listing>> {
        let tree = self.override_named(name).await.ok_or(Error::NotFound)?;
        Ok(tree.list().await.into_iter().map(|(name, inode)| Listing { name, inode, is_dir: false }).collect())
    }

    /// Reads one variable from an override subtree.
    pub async fn read_override_file(&self, name: &str, variable: &str) -> Result<Vec<u8>> {
        let tree = self.override_named(name).await.ok_or(Error::NotFound)?;
        let (_, value) = tree.read(variable).await.ok_or(Error::NotFound)?;
        Ok(value.into_bytes())
    }

    /// File `read`: the provider's optimised path when available, else
    /// whole-file fetch and slice (spec.md §4.9, §4.7).
    pub async fn read(&self, path: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
        if let Some(optimised) = self.provider.optimised() {
            return optimised.read(path, offset, size).await.map_err(map_provider_err);
        }
        let (_, _, data) = self.provider.fetch(path).await.map_err(map_provider_err)?;
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(Vec::new());
        }
        let end = (offset + size as usize).min(data.len());
        Ok(data[offset..end].to_vec())
    }

    /// File `write`: the provider's optimised path when available, else
    /// whole-file fetch, `do_write`, and store (spec.md §4.9, §4.7).
    pub async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<u64> {
        self.attr_cache.invalidate(path);
        if let Some(optimised) = self.provider.optimised() {
            return optimised.write(path, offset, data).await.map_err(map_provider_err);
        }
        let (_, _, existing) = self.provider.fetch(path).await.map_err(map_provider_err)?;
        let merged = provider::do_write(offset, data, &existing);
        self.provider.store(path, &merged).await.map_err(map_provider_err)?;
        Ok(data.len() as u64)
    }

    /// `create(parent, name)`: rejects slash-bearing names, forwards to
    /// the provider as an empty-file store.
    pub async fn create(&self, parent: &str, name: &str) -> Result<Attr> {
        reject_slash(name)?;
        let path = join(parent, name);
        let (entry_id, meta) = self.provider.store(&path, &[]).await.map_err(map_provider_err)?;
        let _ = entry_id;
        self.attr_cache.invalidate(&path);
        let inode = self.inodes.get_by_path(&path).await;
        Ok(Attr { inode, is_dir: false, mode: FILE_MODE, size: meta.size })
    }

    /// `mkdir(parent, name)`: rejects slash-bearing names, forwards to
    /// the provider.
    pub async fn mkdir(&self, parent: &str, name: &str) -> Result<Attr> {
        reject_slash(name)?;
        let path = join(parent, name);
        let (entry_id, meta) = self.provider.mkdir(&path).await.map_err(map_provider_err)?;
        let _ = entry_id;
        self.attr_cache.invalidate(&path);
        let inode = self.inodes.get_by_path(&path).await;
        Ok(Attr { inode, is_dir: true, mode: DIR_MODE, size: meta.size })
    }

    /// `remove(parent, name)`: rejects slash-bearing names, forwards to
    /// the provider.
    pub async fn remove(&self, parent: &str, name: &str) -> Result<()> {
        reject_slash(name)?;
        let path = join(parent, name);
        self.attr_cache.invalidate(&path);
        self.provider.delete(&path).await.map_err(map_provider_err)
    }

    /// Refreshes the `sys` override's live counters from this adapter's
    /// own state. Call before serving a read of `issued_inodes` or
    /// `entries_cached` so the override's synchronous variable storage
    /// reflects the adapter's async counters (see [`StatusOverride::new`]).
    pub async fn refresh_override_counters(&self, name: &str) {
        let Some(tree) = self.override_named(name).await else {
            warn!(name, "refresh requested for an unregistered override");
            return;
        };
        tree.set_variable("issued_inodes", &self.inodes.get_issued().await.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::inode::PathAware;
    use crate::store::{FanoutChunkStore, SledChunkStore};
    use crate::provider::Provider;

    async fn adapter() -> (tempfile::TempDir, Adapter<PathAware>) {
        let dir = tempfile::tempdir().unwrap();
        let chunks = SledChunkStore::open(dir.path().join("chunks.db")).unwrap();
        let provider = Provider::open(dir.path(), chunks).await.unwrap();
        (dir, Adapter::new(Arc::new(provider), PathAware::new()))
    }

    #[tokio::test]
    async fn root_attr_is_a_directory() {
        let (_dir, adapter) = adapter().await;
        let attr = adapter.attr("/").await.unwrap();
        assert!(attr.is_dir);
        assert_eq!(attr.mode, DIR_MODE);
    }

    #[tokio::test]
    async fn create_then_lookup_returns_a_stable_inode() {
        let (_dir, adapter) = adapter().await;
        let created = adapter.create("/", "a.txt").await.unwrap();
        let looked_up = adapter.lookup("/", "a.txt").await.unwrap();
        assert_eq!(created.inode, looked_up.inode);
        assert!(!looked_up.is_dir);
    }

    #[tokio::test]
    async fn create_rejects_names_containing_a_slash() {
        let (_dir, adapter) = adapter().await;
        let err = adapter.create("/", "a/b").await.unwrap_err();
        assert!(matches!(err, Error::Permission));
    }

    #[tokio::test]
    async fn read_dir_lists_children_and_overrides_at_root() {
        let (_dir, adapter) = adapter().await;
        adapter.create("/", "a.txt").await.unwrap();
        adapter.mkdir("/", "sub").await.unwrap();
        adapter.register_override("sys", StatusOverride::new(9000).await).await;

        let listing = adapter.read_dir("/").await.unwrap();
        let names: Vec<&str> = listing.iter().map(|l| l.name.as_str()).collect();
        assert!(names.contains(&"a.txt"));
        assert!(names.contains(&"sub"));
        assert!(names.contains(&"sys"));
    }

    #[tokio::test]
    async fn lookup_at_root_prefers_override_over_provider_entry() {
        let (_dir, adapter) = adapter().await;
        adapter.mkdir("/", "sys").await.unwrap();
        adapter.register_override("sys", StatusOverride::new(9000).await).await;

        let resolved = adapter.lookup("/", "sys").await.unwrap();
        assert_eq!(resolved.inode, 9000);
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_fallback_path() {
        let (_dir, adapter) = adapter().await;
        adapter.create("/", "f.txt").await.unwrap();
        adapter.write("/f.txt", 0, b"hello").await.unwrap();
        let data = adapter.read("/f.txt", 0, 5).await.unwrap();
        assert_eq!(&data, b"hello");
    }

    #[tokio::test]
    async fn write_through_optimised_fanout_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = FanoutChunkStore::open(dir.path().join("chunks")).await.unwrap();
        let provider = Provider::open(dir.path(), chunks).await.unwrap();
        let adapter = Adapter::new(Arc::new(provider), PathAware::new());

        adapter.create("/", "f.txt").await.unwrap();
        adapter.write("/f.txt", 0, b"hello world").await.unwrap();
        let data = adapter.read("/f.txt", 6, 5).await.unwrap();
        assert_eq!(&data, b"world");
    }

    #[tokio::test]
    async fn remove_unmaps_the_entry() {
        let (_dir, adapter) = adapter().await;
        adapter.create("/", "gone.txt").await.unwrap();
        adapter.remove("/", "gone.txt").await.unwrap();
        let err = adapter.attr("/gone.txt").await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn override_file_read_reflects_refreshed_counters() {
        let (_dir, adapter) = adapter().await;
        adapter.register_override("sys", StatusOverride::new(9000).await).await;
        adapter.create("/", "one.txt").await.unwrap();
        adapter.refresh_override_counters("sys").await;

        let value = adapter.read_override_file("sys", "issued_inodes").await.unwrap();
        assert_eq!(String::from_utf8(value).unwrap(), "1");
    }
}
