//! The `PeerListener` trait: callbacks for everything the other side does.
//!
//! Implement only the methods you care about; every one defaults to a
//! no-op. [`Peer::listen`](crate::Peer::listen) spawns a task that drains
//! the event stream and calls these in arrival order, one at a time.

use parley_protocol::{Message, MessageId};
use parley_turn::{DisconnectReason, Notice, PeerEvent};

/// Receives a peer's traffic as callbacks.
///
/// Callbacks run on the dispatch task and must not block. To reply from
/// inside one, keep a [`TurnHandle`](parley_turn::TurnHandle) (from
/// [`Peer::handle`](crate::Peer::handle)) and spawn the call.
pub trait PeerListener: Send + 'static {
    /// A REQUEST was accepted and ACKed. We now owe the answer.
    fn on_delivered_request(&mut self, _message: &Message) {}

    /// The peer confirmed delivery of our REQUEST.
    fn on_ack(&mut self, _id: MessageId) {}

    /// The peer read our REQUEST.
    fn on_read_receipt(&mut self, _id: MessageId) {}

    /// The peer answered our REQUEST. Our turn again.
    fn on_response(&mut self, _message: &Message) {}

    /// A RESPONSE arrived that we weren't waiting for.
    fn on_unexpected_response(&mut self, _message: &Message, _awaiting: Option<MessageId>) {}

    /// Something non-fatal happened (dropped REQUEST, bad frame, ERROR).
    fn on_notice(&mut self, _notice: &Notice) {}

    /// The connection is gone. Called exactly once, last.
    fn on_disconnect(&mut self, _reason: &DisconnectReason) {}
}

/// Routes one event to the matching callback.
pub(crate) fn dispatch<L: PeerListener>(listener: &mut L, event: &PeerEvent) {
    match event {
        PeerEvent::Request(message) => listener.on_delivered_request(message),
        PeerEvent::Ack(id) => listener.on_ack(*id),
        PeerEvent::ReadReceipt(id) => listener.on_read_receipt(*id),
        PeerEvent::Response(message) => listener.on_response(message),
        PeerEvent::UnexpectedResponse { message, awaiting } => {
            listener.on_unexpected_response(message, *awaiting)
        }
        PeerEvent::Notice(notice) => listener.on_notice(notice),
        PeerEvent::Disconnected(reason) => listener.on_disconnect(reason),
    }
}
