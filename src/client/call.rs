//! The in-flight call record and the response envelope it resolves to.
//! Grounded on the original `nugg/client/call.go`, adapted from an
//! untyped `chan interface{}` mailbox to a typed [`Response`] enum and a
//! `oneshot::Sender` per call.

use crate::wire::{
    DeleteResp, FetchResp, ListResp, LookupResp, MkdirResp, ReadDataResp, ReadMetaResp, ReadResp,
    StoreResp, WriteResp,
};

/// The decoded response to one in-flight RPC, however it was tagged on
/// the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Lookup(LookupResp),
    ReadMeta(ReadMetaResp),
    List(ListResp),
    Fetch(FetchResp),
    ReadData(ReadDataResp),
    Store(StoreResp),
    Mkdir(MkdirResp),
    Delete(DeleteResp),
    Write(WriteResp),
    Read(ReadResp),
}

/// Errors a [`super::RemoteSource`] call can return to its caller.
#[derive(Debug)]
pub enum Error {
    /// The connection failed while sending the request or is no longer
    /// running.
    Io(String),
    /// No response arrived within the call's timeout; the pending entry
    /// has already been unregistered.
    Timeout,
    /// The wire peer reported a specific failure.
    NoEntity,
    Unspec,
    /// The response mailbox closed without a value, or delivered a
    /// response of the wrong type — a connection-fatal desync.
    Protocol,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "connection error: {e}"),
            Error::Timeout => write!(f, "rpc timed out"),
            Error::NoEntity => write!(f, "remote reported not found"),
            Error::Unspec => write!(f, "remote reported an unspecified error"),
            Error::Protocol => write!(f, "protocol desync on response mailbox"),
        }
    }
}

impl std::error::Error for Error {}

pub(super) fn error_from_code(code: crate::wire::ErrorCode) -> Option<Error> {
    use crate::wire::ErrorCode;
    match code {
        ErrorCode::NoError => None,
        ErrorCode::NoEntity => Some(Error::NoEntity),
        ErrorCode::IoErr | ErrorCode::Timeout | ErrorCode::Unspec => Some(Error::Unspec),
    }
}
