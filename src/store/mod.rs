//! The three coordinated key-value stores described in spec.md §4.1: a
//! path store, a metadata store, and a chunk store. All three share the
//! same `lookup`/`put`/`delete`/`close` contract; higher-level atomicity is
//! assembled by [`crate::provider::Provider`] through compensating deletes,
//! not by the stores themselves.

mod chunk_store;
mod kv;
mod meta_store;
mod path_store;

pub use chunk_store::{ChunkStore, FanoutChunkStore, RandomAccessChunkStore, SledChunkStore};
pub use kv::{KvStore, SledKvStore};
pub use meta_store::MetaStore;
pub use path_store::PathStore;

/// Errors shared by all three stores.
#[derive(Debug)]
pub enum Error {
    /// The requested key was not present. Each store wraps this with its
    /// own not-found variant so callers don't confuse a missing path with
    /// a missing chunk.
    NotFound,
    /// The underlying storage engine failed.
    Io(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "key not found"),
            Error::Io(msg) => write!(f, "store io error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
