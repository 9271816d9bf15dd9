//! Fixed-length metadata record describing one filesystem entry.
//!
//! Wire layout (little-endian, 138 bytes total), grounded on the original
//! `nuggdb.EntryMetadata.Serialize`/`MakeMetadata` pair:
//!
//! ```text
//! [0..12)    entry_id      (12 bytes)
//! [12..112)  local_name    (100 bytes, zero-padded)
//! [112..120) size          (u64)
//! [120..122) flags         (bit 0 = is_dir)
//! [122..138) locality      (16-byte ChunkID)
//! ```

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{ChunkId, EntryId};

/// Maximum length, in bytes, of the leaf name stored in a [`Metadata`] record.
pub const MAX_LOCAL_NAME_LEN: usize = 100;

/// Total on-disk size of a serialized [`Metadata`] record.
pub const METADATA_WIRE_LEN: usize = 12 + MAX_LOCAL_NAME_LEN + 8 + 2 + 16;

const NAME_OFFSET: usize = 12;
const SIZE_OFFSET: usize = NAME_OFFSET + MAX_LOCAL_NAME_LEN;
const FLAGS_OFFSET: usize = SIZE_OFFSET + 8;
const LOCALITY_OFFSET: usize = FLAGS_OFFSET + 2;

/// Errors raised while deserializing a [`Metadata`] record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The byte slice handed to [`Metadata::deserialize`] was not exactly
    /// [`METADATA_WIRE_LEN`] bytes long.
    WrongLength { got: usize },
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::WrongLength { got } => {
                write!(f, "metadata record is {got} bytes, expected {METADATA_WIRE_LEN}")
            }
        }
    }
}

impl std::error::Error for MetadataError {}

/// Metadata describing one entry (file or directory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub is_dir: bool,
    /// Leaf name only, no path information. Truncated to
    /// [`MAX_LOCAL_NAME_LEN`] bytes on construction.
    pub local_name: String,
    pub entry_id: EntryId,
    pub size: u64,
    /// The single chunk storing this entry's bytes.
    pub locality: ChunkId,
}

impl Metadata {
    /// Builds a new record, truncating `local_name` to
    /// [`MAX_LOCAL_NAME_LEN`] bytes if necessary (a design decision, not an
    /// error — see spec boundary behaviour).
    pub fn new(entry_id: EntryId, local_name: &str, size: u64, is_dir: bool, locality: ChunkId) -> Self {
        let truncated = truncate_to_byte_len(local_name, MAX_LOCAL_NAME_LEN);
        Metadata { is_dir, local_name: truncated, entry_id, size, locality }
    }

    /// A zero-valued placeholder, carried on the wire by responses that
    /// failed before producing a real record.
    pub fn empty() -> Self {
        Metadata {
            is_dir: false,
            local_name: String::new(),
            entry_id: EntryId([0; 12]),
            size: 0,
            locality: ChunkId([0; 16]),
        }
    }

    /// Serializes the record to its fixed 138-byte wire representation.
    pub fn serialize(&self) -> [u8; METADATA_WIRE_LEN] {
        let mut buf = [0u8; METADATA_WIRE_LEN];
        buf[..12].copy_from_slice(self.entry_id.as_bytes());

        let name_bytes = self.local_name.as_bytes();
        let name_len = name_bytes.len().min(MAX_LOCAL_NAME_LEN);
        buf[NAME_OFFSET..NAME_OFFSET + name_len].copy_from_slice(&name_bytes[..name_len]);

        LittleEndian::write_u64(&mut buf[SIZE_OFFSET..SIZE_OFFSET + 8], self.size);

        if self.is_dir {
            buf[FLAGS_OFFSET] |= 1;
        }

        buf[LOCALITY_OFFSET..].copy_from_slice(self.locality.as_bytes());
        buf
    }

    /// Parses a record from its fixed-width wire representation.
    pub fn deserialize(data: &[u8]) -> Result<Self, MetadataError> {
        if data.len() != METADATA_WIRE_LEN {
            return Err(MetadataError::WrongLength { got: data.len() });
        }

        let mut entry_id = [0u8; 12];
        entry_id.copy_from_slice(&data[..12]);

        let name_end = data[NAME_OFFSET..SIZE_OFFSET]
            .iter()
            .position(|&b| b == 0)
            .map(|p| NAME_OFFSET + p)
            .unwrap_or(SIZE_OFFSET);
        let local_name = String::from_utf8_lossy(&data[NAME_OFFSET..name_end]).into_owned();

        let size = LittleEndian::read_u64(&data[SIZE_OFFSET..SIZE_OFFSET + 8]);
        let is_dir = (data[FLAGS_OFFSET] & 1) == 1;

        let mut locality = [0u8; 16];
        locality.copy_from_slice(&data[LOCALITY_OFFSET..]);

        Ok(Metadata {
            is_dir,
            local_name,
            entry_id: EntryId(entry_id),
            size,
            locality: ChunkId(locality),
        })
    }
}

fn truncate_to_byte_len(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
