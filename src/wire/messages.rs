//! Wire message schema: one request/response pair per RPC, matching
//! spec.md §6's registered type list. Every struct derives
//! `Serialize`/`Deserialize` so `bincode` gives each one its own typed
//! layout, the way the original's `encoding/gob` usage registers one Go
//! struct per message.

use serde::{Deserialize, Serialize};

use crate::model::{ChunkId, DirectoryEntry, EntryId, Metadata};

/// Outcome of a dispatched RPC, carried in every non-ping response.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NoError,
    NoEntity,
    IoErr,
    Timeout,
    Unspec,
}

/// A keep-alive packet, sent as `Ping` and echoed back as `Pong` carrying
/// the same timestamp so the sender can measure round-trip latency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPong {
    /// Milliseconds since the Unix epoch at the moment of sending.
    pub sent_millis: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupReq {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResp {
    pub id: u64,
    pub entry_id: EntryId,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadMetaReq {
    pub id: u64,
    pub entry_id: EntryId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadMetaResp {
    pub id: u64,
    pub metadata: Metadata,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListReq {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResp {
    pub id: u64,
    pub entries: Vec<DirectoryEntry>,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchReq {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResp {
    pub id: u64,
    pub entry_id: EntryId,
    pub metadata: Metadata,
    pub bytes: Vec<u8>,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadDataReq {
    pub id: u64,
    pub chunk_id: ChunkId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadDataResp {
    pub id: u64,
    pub bytes: Vec<u8>,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReq {
    pub id: u64,
    pub path: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreResp {
    pub id: u64,
    pub entry_id: EntryId,
    pub metadata: Metadata,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MkdirReq {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MkdirResp {
    pub id: u64,
    pub entry_id: EntryId,
    pub metadata: Metadata,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteReq {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResp {
    pub id: u64,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteReq {
    pub id: u64,
    pub path: String,
    pub offset: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResp {
    pub id: u64,
    pub written: u64,
    pub entry_id: EntryId,
    pub metadata: Metadata,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReq {
    pub id: u64,
    pub path: String,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResp {
    pub id: u64,
    pub bytes: Vec<u8>,
    pub error_code: ErrorCode,
}
