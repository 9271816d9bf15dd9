//! Framing, message schema, and the duplex transceiver for the RPC
//! transport. Grounded on the original `packet` package, adapted from
//! gob's implicit per-`Encode` self-framing to an explicit tag-plus-length
//! envelope, since `bincode` payloads are not self-delimiting over a raw
//! stream the way gob's are (see DESIGN.md).

mod codec;
mod messages;
mod transceiver;

pub use codec::{Error, PktTag, Result};
pub use messages::*;
pub use transceiver::Transceiver;
