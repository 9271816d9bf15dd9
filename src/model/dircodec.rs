//! Serialisation of directory chunks: an ordered list of [`DirectoryEntry`]
//! records, grounded on the original `nuggdb.dirEntry`/`dirEntries` pair.
//!
//! Wire layout of one entry: `version: u16 | flags: u8 | name_len: u16 |
//! name: [u8; name_len] | reserved: u8`. A directory chunk is a `u16`
//! little-endian count followed by that many entries back to back.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// The only [`DirectoryEntry`] wire version this codec understands.
const CURRENT_VERSION: u16 = 1;

/// One child reference stored inside a directory chunk.
///
/// `name` carries the *absolute* path of the child, duplicating the
/// `local_name` kept in the child's own [`super::Metadata`] — see
/// spec.md §9's open question on this redundancy, resolved in DESIGN.md.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub version: u16,
    pub is_dir: bool,
    pub name: String,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        DirectoryEntry { version: CURRENT_VERSION, is_dir, name: name.into() }
    }

    fn wire_len(&self) -> usize {
        2 + 1 + 2 + self.name.len() + 1
    }

    fn write(&self, buf: &mut Vec<u8>) {
        let mut header = [0u8; 5];
        LittleEndian::write_u16(&mut header[0..2], self.version);
        if self.is_dir {
            header[2] |= 1;
        }
        LittleEndian::write_u16(&mut header[3..5], self.name.len() as u16);
        buf.extend_from_slice(&header);
        buf.extend_from_slice(self.name.as_bytes());
        buf.push(0); // reserved
    }
}

/// Errors raised while decoding a directory chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DirCodecError {
    /// The chunk ended before the declared entry count was satisfied.
    Truncated,
    /// An entry declared a `version` other than [`CURRENT_VERSION`].
    CodecVersion { found: u16 },
}

impl std::fmt::Display for DirCodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirCodecError::Truncated => write!(f, "directory chunk truncated"),
            DirCodecError::CodecVersion { found } => {
                write!(f, "unsupported directory entry version {found}")
            }
        }
    }
}

impl std::error::Error for DirCodecError {}

/// Serializes an ordered list of directory entries to chunk bytes.
pub fn encode_directory(entries: &[DirectoryEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + entries.iter().map(DirectoryEntry::wire_len).sum::<usize>());
    let mut count_buf = [0u8; 2];
    LittleEndian::write_u16(&mut count_buf, entries.len() as u16);
    buf.extend_from_slice(&count_buf);
    for entry in entries {
        entry.write(&mut buf);
    }
    buf
}

/// Deserializes a directory chunk back into its entries. Rejects any entry
/// whose version is not [`CURRENT_VERSION`] with [`DirCodecError::CodecVersion`].
pub fn decode_directory(data: &[u8]) -> Result<Vec<DirectoryEntry>, DirCodecError> {
    if data.len() < 2 {
        return Err(DirCodecError::Truncated);
    }
    let count = LittleEndian::read_u16(&data[0..2]) as usize;
    let mut entries = Vec::with_capacity(count);
    let mut cursor = 2;

    for _ in 0..count {
        if data.len() < cursor + 5 {
            return Err(DirCodecError::Truncated);
        }
        let version = LittleEndian::read_u16(&data[cursor..cursor + 2]);
        if version != CURRENT_VERSION {
            return Err(DirCodecError::CodecVersion { found: version });
        }
        let is_dir = (data[cursor + 2] & 1) == 1;
        let name_len = LittleEndian::read_u16(&data[cursor + 3..cursor + 5]) as usize;
        let name_start = cursor + 5;
        let name_end = name_start + name_len;
        if data.len() < name_end + 1 {
            return Err(DirCodecError::Truncated);
        }
        let name = String::from_utf8_lossy(&data[name_start..name_end]).into_owned();
        entries.push(DirectoryEntry { version, is_dir, name });
        cursor = name_end + 1;
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_empty_directory() {
        let decoded = decode_directory(&encode_directory(&[])).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn round_trips_several_entries_in_insertion_order() {
        let entries = vec![
            DirectoryEntry::new("/d/a", false),
            DirectoryEntry::new("/d/sub", true),
            DirectoryEntry::new("/d/z", false),
        ];
        let decoded = decode_directory(&encode_directory(&entries)).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn rejects_unknown_versions() {
        let mut bytes = encode_directory(&[DirectoryEntry::new("/a", false)]);
        // Corrupt the version field of the lone entry.
        bytes[2] = 7;
        let err = decode_directory(&bytes).unwrap_err();
        assert_eq!(err, DirCodecError::CodecVersion { found: 7 });
    }

    #[test]
    fn rejects_truncated_buffers() {
        let bytes = encode_directory(&[DirectoryEntry::new("/a", false)]);
        let err = decode_directory(&bytes[..bytes.len() - 2]).unwrap_err();
        assert_eq!(err, DirCodecError::Truncated);
    }
}
