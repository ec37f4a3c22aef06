//! Wire protocol for Parley.
//!
//! This crate defines what travels inside one frame:
//!
//! - **Header** ([`Header`], [`OperationType`]): the fixed 23-byte,
//!   big-endian metadata block.
//! - **Message** ([`Message`]): header plus payload, with CRC-32
//!   integrity checking on decode.
//! - **Envelope** ([`Envelope`], [`IdGenerator`]): builds outgoing
//!   messages and owns message-ID generation.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the turn
//! coordinator. It knows nothing about sockets or turns.
//!
//! ```text
//! Transport (frames) → Protocol (Message) → Turn (who may speak)
//! ```

mod envelope;
mod error;
mod header;
mod id;
mod message;

pub use envelope::Envelope;
pub use error::{ProtocolError, Result};
pub use header::{DEFAULT_PROTOCOL_ID, Header, OperationType, PROTOCOL_VERSION};
pub use id::{IdGenerator, MessageId};
pub use message::{BINARY_SENTINEL, Message};
