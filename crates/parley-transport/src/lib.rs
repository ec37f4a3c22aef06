//! Transport layer for Parley.
//!
//! Turns a TCP byte stream into discrete frames:
//!
//! ```text
//! [4 bytes: big-endian u32 length N][N bytes: one PDU]
//! ```
//!
//! A length prefix (rather than a delimiter) means payloads can contain
//! any bytes without escaping. Each [`FramedConnection`] has a single
//! exclusive send region, so two tasks sending at once can never
//! interleave halves of their frames on the wire.
//!
//! Connection setup is strictly one-to-one: an [`Acceptor`] hands out a
//! single connection and then releases its listening socket.

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{Acceptor, FramedConnection};

use std::fmt;
use std::future::Future;

/// Size of the big-endian length prefix in front of every frame.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest frame accepted in either direction: a 23-byte header plus the
/// biggest payload its 16-bit length field can describe.
pub const MAX_FRAME_LEN: usize = 23 + u16::MAX as usize;

/// Opaque identifier for a connection, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single connection that carries whole frames in both directions.
///
/// [`FramedConnection`] is the production implementation. The turn layer
/// is generic over this trait, so a connection can be wrapped (for
/// instance to observe or refuse outgoing frames) without touching the
/// coordinator.
///
/// Returned futures are `Send` so implementations can be driven from
/// spawned tasks.
pub trait Connection: Send + Sync + 'static {
    /// Sends one frame to the remote peer.
    fn send(&self, frame: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame.
    ///
    /// Returns `Ok(None)` when the connection is closed, by either side.
    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection. Idempotent.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
