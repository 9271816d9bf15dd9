//! The client side of the RPC transport: a TLS connection, a transceiver,
//! and the pending-call bookkeeping needed to multiplex concurrent RPCs
//! over one connection. Grounded on the original `nugg/client` package.

mod call;
mod remote;

pub use call::{Error, Response};
pub use remote::RemoteSource;
