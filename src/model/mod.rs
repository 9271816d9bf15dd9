//! Core data model: content/entry identifiers, metadata records, and the
//! directory chunk codec.

mod dircodec;
mod metadata;

pub use dircodec::{decode_directory, encode_directory, DirCodecError, DirectoryEntry};
pub use metadata::{Metadata, MetadataError, MAX_LOCAL_NAME_LEN, METADATA_WIRE_LEN};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// 16-byte opaque random identifier of a data chunk.
///
/// Collision-resistant by width alone; there is no cryptographic binding
/// between a [`ChunkId`] and the bytes it names.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub [u8; 16]);

impl ChunkId {
    /// Draws a fresh identifier from a cryptographic source.
    pub fn random() -> Self {
        let mut buf = [0u8; 16];
        OsRng.fill_bytes(&mut buf);
        ChunkId(buf)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Renders the identifier as lowercase hex, used by the directory
    /// fan-out chunk store to build on-disk paths.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(32);
        for b in self.0 {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

/// 12-byte opaque random identifier of a filesystem entry (file or
/// directory). Unique within a store; reissued on overwrite.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub [u8; 12]);

impl EntryId {
    /// Draws a fresh identifier from a cryptographic source.
    pub fn random() -> Self {
        let mut buf = [0u8; 12];
        OsRng.fill_bytes(&mut buf);
        EntryId(buf)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// Draws a cryptographically random 64-bit RPC call id. The 64-bit space
/// gives negligible collision probability for any realistic number of
/// pending calls on one connection.
pub fn random_call_id() -> u64 {
    OsRng.next_u64()
}
