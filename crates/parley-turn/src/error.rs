//! Error types for the turn layer.

use parley_protocol::ProtocolError;
use parley_transport::TransportError;

/// Errors returned to callers of a [`TurnHandle`](crate::TurnHandle).
///
/// Turn violations are *not* errors: submitting out of turn yields
/// [`Submitted::Rejected`](crate::Submitted::Rejected), and a REQUEST
/// arriving out of turn becomes a [`Notice`](crate::Notice).
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The outgoing message couldn't be built (payload too large).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The frame couldn't be written. The turn state is left as it was,
    /// so the caller can retry or close.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The coordinator has stopped: the connection is closed.
    #[error("connection is closed")]
    Closed,
}
