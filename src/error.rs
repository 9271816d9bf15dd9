//! Crate-wide error type, matching the teacher's manual
//! enum-with-doc-comments style (see `vfs::Error`). Bridges the
//! per-layer error types named in spec.md §7's propagation rules:
//! a store error becomes a provider error becomes (on the wire) an
//! [`crate::wire::ErrorCode`], and on the client a [`crate::client::Error`];
//! this type exists for callers that sit above all three layers at once,
//! such as the adapter's kernel VFS shim.

use crate::{adapter, client, provider, store, tls, wire};

/// A failure from any layer of the crate, normalised to one set of
/// variants a caller outside the crate can match on without knowing
/// which subsystem produced it.
#[derive(Debug)]
pub enum VaultError {
    /// The targeted path or entry does not exist.
    NotFound,
    /// The caller asked for something not permitted (e.g. a name
    /// containing a path separator).
    Permission,
    /// An on-disk record failed to decode: wrong version or truncated.
    Corrupt(String),
    /// A local store or filesystem I/O operation failed.
    Io(String),
    /// A remote call timed out waiting for a response.
    Timeout,
    /// The wire connection is desynchronised or has closed.
    Protocol(String),
    /// TLS configuration or handshake failed.
    Tls(String),
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultError::NotFound => write!(f, "no such file or directory"),
            VaultError::Permission => write!(f, "operation not permitted"),
            VaultError::Corrupt(e) => write!(f, "corrupt record: {e}"),
            VaultError::Io(e) => write!(f, "i/o error: {e}"),
            VaultError::Timeout => write!(f, "operation timed out"),
            VaultError::Protocol(e) => write!(f, "protocol error: {e}"),
            VaultError::Tls(e) => write!(f, "tls error: {e}"),
        }
    }
}

impl std::error::Error for VaultError {}

impl From<store::Error> for VaultError {
    fn from(e: store::Error) -> Self {
        match e {
            store::Error::NotFound => VaultError::NotFound,
            store::Error::Io(msg) => VaultError::Io(msg),
        }
    }
}

impl From<provider::Error> for VaultError {
    fn from(e: provider::Error) -> Self {
        match e {
            provider::Error::PathNotFound | provider::Error::MetaNotFound | provider::Error::ChunkNotFound => {
                VaultError::NotFound
            }
            provider::Error::CodecVersion | provider::Error::CodecMalformed => {
                VaultError::Corrupt(e.to_string())
            }
            provider::Error::Io(msg) => VaultError::Io(msg),
            provider::Error::InvalidArgument(msg) => VaultError::Corrupt(msg),
        }
    }
}

impl From<wire::Error> for VaultError {
    fn from(e: wire::Error) -> Self {
        VaultError::Protocol(e.to_string())
    }
}

impl From<client::Error> for VaultError {
    fn from(e: client::Error) -> Self {
        match e {
            client::Error::NoEntity => VaultError::NotFound,
            client::Error::Timeout => VaultError::Timeout,
            client::Error::Io(msg) => VaultError::Io(msg),
            client::Error::Protocol => VaultError::Protocol("response mailbox desync".to_string()),
            client::Error::Unspec => VaultError::Io("remote reported an unspecified error".to_string()),
        }
    }
}

impl From<adapter::Error> for VaultError {
    fn from(e: adapter::Error) -> Self {
        match e {
            adapter::Error::Permission => VaultError::Permission,
            adapter::Error::NotFound => VaultError::NotFound,
            adapter::Error::Io(msg) => VaultError::Io(msg),
        }
    }
}

impl From<tls::Error> for VaultError {
    fn from(e: tls::Error) -> Self {
        VaultError::Tls(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_not_found_variants_all_normalise_to_not_found() {
        assert!(matches!(VaultError::from(provider::Error::PathNotFound), VaultError::NotFound));
        assert!(matches!(VaultError::from(provider::Error::MetaNotFound), VaultError::NotFound));
        assert!(matches!(VaultError::from(provider::Error::ChunkNotFound), VaultError::NotFound));
    }

    #[test]
    fn client_no_entity_normalises_to_not_found() {
        assert!(matches!(VaultError::from(client::Error::NoEntity), VaultError::NotFound));
    }

    #[test]
    fn client_timeout_normalises_to_timeout() {
        assert!(matches!(VaultError::from(client::Error::Timeout), VaultError::Timeout));
    }

    #[test]
    fn adapter_permission_normalises_to_permission() {
        assert!(matches!(VaultError::from(adapter::Error::Permission), VaultError::Permission));
    }
}
