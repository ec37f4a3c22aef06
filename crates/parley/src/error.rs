//! Unified error type for Parley.

use parley_protocol::ProtocolError;
use parley_transport::TransportError;
use parley_turn::TurnError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `parley` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A transport-level error (connect, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed header, integrity, payload size).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A turn-level error (send failed mid-turn, connection closed).
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// The event stream was already handed out by
    /// [`Peer::events`](crate::Peer::events) or
    /// [`Peer::listen`](crate::Peer::listen).
    #[error("event stream already taken")]
    EventsTaken,
}
