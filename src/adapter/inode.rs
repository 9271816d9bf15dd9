//! Inode number issuance, grounded on the original `inodeFactory/basicFactory.go`
//! and `pathAwareFactory.go`. Adapted from a bare mutex-guarded map to a
//! `whirlwind::ShardMap` for the path table, matching the teacher's
//! concurrent-collection choice.

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Issues unique inode numbers. Neither implementation persists across
/// restarts (spec.md §9): remounting reassigns numbers from scratch.
#[async_trait]
pub trait InodeAllocator: Send + Sync {
    /// Returns a fresh inode number, unique to this allocator.
    async fn get_inode(&self) -> u64;

    /// The number of inodes issued by this allocator so far.
    async fn get_issued(&self) -> u64;
}

/// An [`InodeAllocator`] that also remembers which inode it already
/// assigned to a given path.
#[async_trait]
pub trait PathAwareAllocator: InodeAllocator {
    /// Returns the same inode for the same path across calls, assigning a
    /// fresh one the first time a path is seen.
    async fn get_by_path(&self, path: &str) -> u64;
}

/// Issues successive inodes starting from 1, with no path memory.
pub struct Monotonic {
    last: Mutex<u64>,
}

impl Monotonic {
    pub fn new() -> Self {
        Monotonic { last: Mutex::new(0) }
    }
}

impl Default for Monotonic {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InodeAllocator for Monotonic {
    async fn get_inode(&self) -> u64 {
        let mut last = self.last.lock().await;
        *last += 1;
        *last
    }

    async fn get_issued(&self) -> u64 {
        *self.last.lock().await
    }
}

/// Issues the same inode for a path across the lifetime of the process,
/// and a fresh inode for every path seen for the first time.
pub struct PathAware {
    last: Mutex<u64>,
    paths: whirlwind::ShardMap<String, u64>,
}

impl PathAware {
    pub fn new() -> Self {
        PathAware { last: Mutex::new(0), paths: whirlwind::ShardMap::new() }
    }
}

impl Default for PathAware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InodeAllocator for PathAware {
    async fn get_inode(&self) -> u64 {
        let mut last = self.last.lock().await;
        *last += 1;
        *last
    }

    async fn get_issued(&self) -> u64 {
        *self.last.lock().await
    }
}

#[async_trait]
impl PathAwareAllocator for PathAware {
    async fn get_by_path(&self, path: &str) -> u64 {
        if let Some(existing) = self.paths.get(&path.to_string()).await {
            return *existing;
        }

        let mut last = self.last.lock().await;
        if let Some(existing) = self.paths.get(&path.to_string()).await {
            return *existing;
        }
        *last += 1;
        let issued = *last;
        self.paths.insert(path.to_string(), issued).await;
        issued
    }
}
