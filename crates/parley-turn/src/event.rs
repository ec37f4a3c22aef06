//! What the coordinator tells the outside world.
//!
//! [`Submitted`] is the synchronous answer to `submit()`. Everything that
//! happens because of the peer arrives asynchronously as a [`PeerEvent`].

use std::fmt;

use parley_protocol::{Message, MessageId, ProtocolError};
use parley_transport::TransportError;

/// The outcome of a local `submit()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// A new REQUEST went out with this ID.
    Request(MessageId),
    /// The RESPONSE to this REQUEST went out.
    Response(MessageId),
    /// Nothing was sent: we're still waiting for an answer to `awaiting`.
    Rejected {
        /// Our unanswered REQUEST.
        awaiting: MessageId,
    },
}

impl Submitted {
    /// The ID carried by the frame that was sent, if one was.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::Request(id) | Self::Response(id) => Some(*id),
            Self::Rejected { .. } => None,
        }
    }

    /// Returns `true` if nothing was sent.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Something the peer did.
#[derive(Debug)]
pub enum PeerEvent {
    /// The peer asked something. We ACKed it and now owe a response.
    Request(Message),
    /// The peer confirmed delivery of our REQUEST.
    Ack(MessageId),
    /// The peer confirmed it read our REQUEST.
    ReadReceipt(MessageId),
    /// The peer answered our REQUEST. We're Idle again.
    Response(Message),
    /// A RESPONSE that doesn't match what we're waiting for.
    UnexpectedResponse {
        /// The message as received.
        message: Message,
        /// What we were waiting for, if anything.
        awaiting: Option<MessageId>,
    },
    /// Something worth telling the user that doesn't change the turn.
    Notice(Notice),
    /// The connection is gone. Always the last event.
    Disconnected(DisconnectReason),
}

/// Non-fatal conditions surfaced to the user.
#[derive(Debug)]
pub enum Notice {
    /// An inbound REQUEST arrived out of turn and was dropped. The peer
    /// is not told.
    RequestDropped {
        /// The dropped REQUEST.
        message: Message,
        /// Why it was dropped.
        reason: DropReason,
    },
    /// A frame failed to decode or failed its integrity check.
    Undecodable(ProtocolError),
    /// The peer sent an ERROR message.
    ErrorReceived(Message),
}

/// Why an inbound REQUEST was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// We still owe a response to this earlier REQUEST.
    AlreadyOwing(MessageId),
    /// We're waiting for the answer to our own REQUEST.
    AwaitingResponse(MessageId),
}

/// Why a connection ended.
#[derive(Debug)]
pub enum DisconnectReason {
    /// The peer closed the connection.
    PeerClosed,
    /// We closed it.
    Local,
    /// The transport failed.
    Transport(TransportError),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestDropped { message, reason } => match reason {
                DropReason::AlreadyOwing(pending) => write!(
                    f,
                    "ignored request {}: still owe a response to {pending}",
                    message.id()
                ),
                DropReason::AwaitingResponse(awaiting) => write!(
                    f,
                    "ignored request {}: waiting for a response to {awaiting}",
                    message.id()
                ),
            },
            Self::Undecodable(e) => write!(f, "discarded a frame: {e}"),
            Self::ErrorReceived(message) => {
                write!(f, "peer reported an error for {}: {}", message.id(), message.text())
            }
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed the connection"),
            Self::Local => write!(f, "connection closed"),
            Self::Transport(e) => write!(f, "connection lost: {e}"),
        }
    }
}
