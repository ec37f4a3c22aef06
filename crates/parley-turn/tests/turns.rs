//! Integration tests for the turn coordinator.
//!
//! A real coordinator runs on one end of a loopback connection. The other
//! end is a bare `FramedConnection` driven by hand, so each test controls
//! exactly which frames the coordinator sees and checks exactly which
//! frames it writes back.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parley_protocol::{Envelope, IdGenerator, Message, MessageId, OperationType, ProtocolError};
use parley_transport::{Acceptor, Connection, ConnectionId, FramedConnection, TransportError};
use parley_turn::{
    DisconnectReason, DropReason, EventReceiver, MessageStatus, Notice, PeerConfig, PeerEvent,
    Submitted, TurnError, TurnHandle, TurnPhase, spawn_coordinator,
};

const SEVEN: MessageId = MessageId(7);

struct Harness {
    handle: TurnHandle,
    events: EventReceiver,
    /// The hand-driven far end.
    remote: FramedConnection,
    /// Builds the far end's messages. Its IDs start at 7.
    script: Envelope,
    /// The coordinator's own ID source.
    ids: Arc<IdGenerator>,
}

/// Connects a coordinator (drawing IDs from `first_id`) to a scripted peer.
async fn harness(first_id: u32) -> Harness {
    harness_with(first_id, |conn| conn).await
}

/// Like [`harness`], but the coordinator talks through `wrap(local)`.
async fn harness_with<C: Connection>(
    first_id: u32,
    wrap: impl FnOnce(FramedConnection) -> C,
) -> Harness {
    let acceptor = Acceptor::bind("127.0.0.1:0").await.expect("should bind");
    let addr = acceptor.local_addr().expect("should have addr").to_string();

    let accepted = tokio::spawn(async move { acceptor.accept().await.expect("should accept") });
    let remote = FramedConnection::connect(&addr).await.expect("should connect");
    let local = accepted.await.expect("task should complete");

    let ids = Arc::new(IdGenerator::starting_at(first_id));
    let config = PeerConfig {
        name: "under-test".into(),
        ..PeerConfig::default()
    };
    let (handle, events) = spawn_coordinator(wrap(local), &config, Arc::clone(&ids));

    Harness {
        handle,
        events,
        remote,
        script: Envelope::with_ids(config.protocol_id, Arc::new(IdGenerator::starting_at(7))),
        ids,
    }
}

impl Harness {
    async fn next_event(&mut self) -> PeerEvent {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("event should arrive in time")
            .expect("event channel should be open")
    }

    async fn remote_send(&self, message: &Message) {
        self.remote.send(&message.encode()).await.expect("remote send");
    }

    async fn remote_recv(&self) -> Message {
        let frame = tokio::time::timeout(Duration::from_secs(2), self.remote.recv())
            .await
            .expect("frame should arrive in time")
            .expect("recv should not fail")
            .expect("connection should be open");
        Message::decode(&frame).expect("coordinator should write valid PDUs")
    }

    /// Asserts that the coordinator writes nothing for a short while.
    async fn assert_remote_silent(&self) {
        let result = tokio::time::timeout(Duration::from_millis(100), self.remote.recv()).await;
        assert!(result.is_err(), "expected no frame, got {result:?}");
    }

    /// Sends REQUEST("hola", #7) from the far end and consumes the ACK.
    async fn remote_asks_hola(&mut self) {
        let request = self
            .script
            .create("hola", OperationType::Request, 0)
            .expect("small payload");
        assert_eq!(request.id(), SEVEN);
        self.remote_send(&request).await;

        let ack = self.remote_recv().await;
        assert_eq!(ack.operation(), OperationType::Ack);
        assert_eq!(ack.id(), SEVEN);
        assert!(ack.payload().is_empty());

        match self.next_event().await {
            PeerEvent::Request(message) => assert_eq!(message.text(), "hola"),
            other => panic!("expected a request, got {other:?}"),
        }
    }
}

/// A connection whose sends fail with a broken pipe while `fail_sends` is
/// set. Receiving and closing go straight through.
struct FlakyConnection {
    inner: FramedConnection,
    fail_sends: Arc<AtomicBool>,
}

impl Connection for FlakyConnection {
    fn send(&self, frame: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send {
        let fail = self.fail_sends.load(Ordering::SeqCst);
        async move {
            if fail {
                return Err(TransportError::SendFailed(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "send refused",
                )));
            }
            self.inner.send(frame).await
        }
    }

    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send {
        self.inner.recv()
    }

    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.inner.close()
    }

    fn id(&self) -> ConnectionId {
        self.inner.id()
    }
}

/// A harness whose coordinator sends through a [`FlakyConnection`], plus
/// the switch that breaks it.
async fn flaky_harness(first_id: u32) -> (Harness, Arc<AtomicBool>) {
    let fail_sends = Arc::new(AtomicBool::new(false));
    let switch = Arc::clone(&fail_sends);
    let h = harness_with(first_id, move |inner| FlakyConnection { inner, fail_sends }).await;
    (h, switch)
}

// ---------------------------------------------------------------------------
// The four basic turns
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_inbound_request_is_acked_and_owed() {
    let mut h = harness(1).await;

    h.remote_asks_hola().await;

    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Owing(SEVEN));
}

#[tokio::test]
async fn test_submit_while_owing_sends_correlated_response() {
    let mut h = harness(1).await;
    h.remote_asks_hola().await;

    let submitted = h.handle.submit("adios").await.expect("submit");
    assert_eq!(submitted, Submitted::Response(SEVEN));

    let response = h.remote_recv().await;
    assert_eq!(response.operation(), OperationType::Response);
    assert_eq!(response.id(), SEVEN);
    assert_eq!(response.text(), "adios");

    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Idle);
    // Answering doesn't draw a fresh ID.
    assert_eq!(h.ids.peek(), MessageId(1));
}

#[tokio::test]
async fn test_matching_response_returns_to_idle() {
    let mut h = harness(7).await;

    assert_eq!(h.handle.submit("hola").await.unwrap(), Submitted::Request(SEVEN));
    let request = h.remote_recv().await;
    assert_eq!(request.operation(), OperationType::Request);
    assert_eq!(request.text(), "hola");
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Waiting(SEVEN));

    let response = h
        .script
        .correlated("adios", OperationType::Response, SEVEN, 0)
        .unwrap();
    h.remote_send(&response).await;

    match h.next_event().await {
        PeerEvent::Response(message) => {
            assert_eq!(message.id(), SEVEN);
            assert_eq!(message.text(), "adios");
        }
        other => panic!("expected a response, got {other:?}"),
    }
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_submit_while_waiting_is_rejected_without_a_frame() {
    let h = harness(7).await;

    h.handle.submit("hola").await.unwrap();
    h.remote_recv().await;

    let submitted = h.handle.submit("otra vez").await.unwrap();
    assert_eq!(submitted, Submitted::Rejected { awaiting: SEVEN });
    h.assert_remote_silent().await;
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Waiting(SEVEN));
}

// ---------------------------------------------------------------------------
// Out-of-turn traffic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_second_request_while_owing_is_dropped_without_ack() {
    let mut h = harness(1).await;
    h.remote_asks_hola().await;

    let second = h.script.create("hola?", OperationType::Request, 0).unwrap();
    h.remote_send(&second).await;

    match h.next_event().await {
        PeerEvent::Notice(Notice::RequestDropped { message, reason }) => {
            assert_eq!(message.id(), MessageId(8));
            assert_eq!(reason, DropReason::AlreadyOwing(SEVEN));
        }
        other => panic!("expected a dropped-request notice, got {other:?}"),
    }
    h.assert_remote_silent().await;
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Owing(SEVEN));
}

#[tokio::test]
async fn test_request_while_waiting_is_dropped() {
    let mut h = harness(1).await;

    h.handle.submit("first").await.unwrap();
    h.remote_recv().await;

    let crossing = h.script.create("crossing", OperationType::Request, 0).unwrap();
    h.remote_send(&crossing).await;

    match h.next_event().await {
        PeerEvent::Notice(Notice::RequestDropped { reason, .. }) => {
            assert_eq!(reason, DropReason::AwaitingResponse(MessageId(1)));
        }
        other => panic!("expected a dropped-request notice, got {other:?}"),
    }
    h.assert_remote_silent().await;
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Waiting(MessageId(1)));
}

#[tokio::test]
async fn test_response_while_idle_is_unexpected() {
    let mut h = harness(1).await;

    let stray = h
        .script
        .correlated("late", OperationType::Response, MessageId(99), 0)
        .unwrap();
    h.remote_send(&stray).await;

    match h.next_event().await {
        PeerEvent::UnexpectedResponse { message, awaiting } => {
            assert_eq!(message.id(), MessageId(99));
            assert_eq!(awaiting, None);
        }
        other => panic!("expected an unexpected response, got {other:?}"),
    }
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_response_for_other_id_keeps_waiting() {
    let mut h = harness(7).await;
    h.handle.submit("hola").await.unwrap();
    h.remote_recv().await;

    let wrong = h
        .script
        .correlated("?", OperationType::Response, MessageId(6), 0)
        .unwrap();
    h.remote_send(&wrong).await;

    match h.next_event().await {
        PeerEvent::UnexpectedResponse { awaiting, .. } => assert_eq!(awaiting, Some(SEVEN)),
        other => panic!("expected an unexpected response, got {other:?}"),
    }
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Waiting(SEVEN));
}

// ---------------------------------------------------------------------------
// Delivery status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ack_and_read_receipt_advance_status() {
    let mut h = harness(7).await;
    h.handle.submit("hola").await.unwrap();
    h.remote_recv().await;
    assert_eq!(h.handle.status(SEVEN).await.unwrap(), Some(MessageStatus::Sent));

    h.remote_send(&h.script.control(OperationType::Ack, SEVEN)).await;
    assert!(matches!(h.next_event().await, PeerEvent::Ack(id) if id == SEVEN));
    assert_eq!(
        h.handle.status(SEVEN).await.unwrap(),
        Some(MessageStatus::Delivered)
    );

    h.remote_send(&h.script.control(OperationType::ReadReceipt, SEVEN))
        .await;
    assert!(matches!(h.next_event().await, PeerEvent::ReadReceipt(id) if id == SEVEN));
    assert_eq!(h.handle.status(SEVEN).await.unwrap(), Some(MessageStatus::Read));

    // A duplicate ACK after the receipt doesn't move the status back.
    h.remote_send(&h.script.control(OperationType::Ack, SEVEN)).await;
    h.next_event().await;
    assert_eq!(h.handle.status(SEVEN).await.unwrap(), Some(MessageStatus::Read));

    // Acks don't change the turn.
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Waiting(SEVEN));
}

#[tokio::test]
async fn test_status_of_unknown_id_is_none() {
    let h = harness(1).await;
    assert_eq!(h.handle.status(MessageId(42)).await.unwrap(), None);
}

#[tokio::test]
async fn test_send_read_receipt_writes_empty_control_frame() {
    let mut h = harness(1).await;
    h.remote_asks_hola().await;

    h.handle.send_read_receipt(SEVEN).await.expect("receipt");

    let receipt = h.remote_recv().await;
    assert_eq!(receipt.operation(), OperationType::ReadReceipt);
    assert_eq!(receipt.id(), SEVEN);
    assert!(receipt.payload().is_empty());
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Owing(SEVEN));
}

// ---------------------------------------------------------------------------
// Bad input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_garbage_frame_is_reported_and_loop_continues() {
    let mut h = harness(1).await;

    h.remote.send(b"not a pdu").await.unwrap();
    match h.next_event().await {
        PeerEvent::Notice(Notice::Undecodable(ProtocolError::MalformedHeader(_))) => {}
        other => panic!("expected an undecodable notice, got {other:?}"),
    }

    h.remote_asks_hola().await;
}

#[tokio::test]
async fn test_corrupted_payload_fails_integrity_check() {
    let mut h = harness(1).await;

    let request = h.script.create("hola", OperationType::Request, 0).unwrap();
    let mut frame = request.encode();
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    h.remote.send(&frame).await.unwrap();

    match h.next_event().await {
        PeerEvent::Notice(Notice::Undecodable(ProtocolError::Integrity { .. })) => {}
        other => panic!("expected an integrity notice, got {other:?}"),
    }
    h.assert_remote_silent().await;
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_error_message_is_a_notice() {
    let mut h = harness(1).await;

    let error = h
        .script
        .correlated("boom", OperationType::Error, MessageId(3), 0)
        .unwrap();
    h.remote_send(&error).await;

    match h.next_event().await {
        PeerEvent::Notice(Notice::ErrorReceived(message)) => assert_eq!(message.text(), "boom"),
        other => panic!("expected an error notice, got {other:?}"),
    }
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_oversized_submit_fails_without_consuming_an_id() {
    let h = harness(1).await;

    let huge = "x".repeat(usize::from(u16::MAX) + 1);
    let err = h.handle.submit(huge).await.unwrap_err();
    assert!(matches!(
        err,
        TurnError::Protocol(ProtocolError::PayloadTooLarge(_))
    ));

    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Idle);
    assert_eq!(h.ids.peek(), MessageId(1));
    h.assert_remote_silent().await;
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_peer_close_disconnects_and_later_commands_fail() {
    let mut h = harness(1).await;

    h.remote.close().await.unwrap();
    assert!(matches!(
        h.next_event().await,
        PeerEvent::Disconnected(DisconnectReason::PeerClosed)
    ));

    let err = h.handle.submit("anyone?").await.unwrap_err();
    assert!(matches!(err, TurnError::Closed));
    h.handle.close().await.expect("close after disconnect is a no-op");
}

#[tokio::test]
async fn test_local_close_ends_remote_stream() {
    let mut h = harness(1).await;

    h.handle.close().await.expect("close");
    assert!(matches!(
        h.next_event().await,
        PeerEvent::Disconnected(DisconnectReason::Local)
    ));

    let end = h.remote.recv().await.expect("recv should not error");
    assert!(end.is_none());

    h.handle.close().await.expect("second close");
    assert!(h.events.recv().await.is_none(), "disconnect is the last event");
}

#[tokio::test]
async fn test_dropping_every_handle_stops_the_coordinator() {
    let Harness {
        handle,
        mut events,
        remote,
        ..
    } = harness(1).await;

    drop(handle);

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event in time");
    assert!(matches!(
        event,
        Some(PeerEvent::Disconnected(DisconnectReason::Local))
    ));
    assert!(remote.recv().await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Send failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_response_send_keeps_response_owed() {
    let (mut h, fail_sends) = flaky_harness(1).await;
    h.remote_asks_hola().await;

    fail_sends.store(true, Ordering::SeqCst);
    let err = h.handle.submit("adios").await.unwrap_err();
    assert!(matches!(err, TurnError::Transport(TransportError::SendFailed(_))));
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Owing(SEVEN));
    h.assert_remote_silent().await;

    // Once the link recovers, the same response can still be sent.
    fail_sends.store(false, Ordering::SeqCst);
    assert_eq!(
        h.handle.submit("adios").await.unwrap(),
        Submitted::Response(SEVEN)
    );
    let response = h.remote_recv().await;
    assert_eq!(response.operation(), OperationType::Response);
    assert_eq!(response.id(), SEVEN);
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_failed_request_send_stays_idle() {
    let (h, fail_sends) = flaky_harness(1).await;

    fail_sends.store(true, Ordering::SeqCst);
    let err = h.handle.submit("hola").await.unwrap_err();
    assert!(matches!(err, TurnError::Transport(TransportError::SendFailed(_))));

    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Idle);
    // The message was built before the send failed, so its ID is spent
    // but never tracked.
    assert_eq!(h.ids.peek(), MessageId(2));
    assert_eq!(h.handle.status(MessageId(1)).await.unwrap(), None);
    h.assert_remote_silent().await;

    fail_sends.store(false, Ordering::SeqCst);
    assert_eq!(
        h.handle.submit("hola").await.unwrap(),
        Submitted::Request(MessageId(2))
    );
    assert_eq!(h.handle.turn().await.unwrap(), TurnPhase::Waiting(MessageId(2)));
    let request = h.remote_recv().await;
    assert_eq!(request.operation(), OperationType::Request);
    assert_eq!(request.id(), MessageId(2));
}
