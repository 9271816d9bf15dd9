//! The packet tag enumerant and the envelope framing around each
//! `bincode`-encoded payload.
//!
//! A tag byte identifies the message type, matching the original's
//! `PktType`. `bincode` payloads carry their own internal length prefixes
//! for variable-length fields but are not self-delimiting at the *stream*
//! level the way a single `gob.Encode` call is, so each packet is framed
//! as `tag: u8 | len: u32 (little-endian) | payload: [u8; len]` — an
//! explicit substitute for gob's implicit per-message framing.

use num_derive::FromPrimitive;

/// Discriminant identifying which message struct follows a packet's
/// length-prefixed payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum PktTag {
    Ping = 0,
    Pong = 1,
    LookupReq = 2,
    LookupResp = 3,
    ReadMetaReq = 4,
    ReadMetaResp = 5,
    ListReq = 6,
    ListResp = 7,
    FetchReq = 8,
    FetchResp = 9,
    ReadDataReq = 10,
    ReadDataResp = 11,
    StoreReq = 12,
    StoreResp = 13,
    MkdirReq = 14,
    MkdirResp = 15,
    DeleteReq = 16,
    DeleteResp = 17,
    WriteReq = 18,
    WriteResp = 19,
    ReadReq = 20,
    ReadResp = 21,
}

impl PktTag {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(b: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(b)
    }
}

/// The largest payload a connection will accept before a decode is
/// treated as protocol corruption rather than a legitimately large
/// message (guards against a desynchronised decoder reading a bogus
/// length and trying to allocate gigabytes).
pub const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

/// Errors from framing or payload codec. Any of these is connection-fatal
/// per spec.md §4.4: the decoder state cannot be trusted afterwards.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Codec(bincode::Error),
    /// A tag byte outside the known [`PktTag`] range.
    UnknownTag(u8),
    /// A declared payload length exceeded [`MAX_PAYLOAD_LEN`].
    PayloadTooLarge(u32),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "transport io error: {e}"),
            Error::Codec(e) => write!(f, "payload codec error: {e}"),
            Error::UnknownTag(b) => write!(f, "unknown packet tag {b}"),
            Error::PayloadTooLarge(n) => write!(f, "payload length {n} exceeds maximum"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
