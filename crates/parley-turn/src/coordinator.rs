//! Coordinator actor: an isolated Tokio task that owns a conversation.
//!
//! Each connection gets two tasks:
//!
//! - the **reader**, which blocks on `recv()` and forwards every frame
//!   (or the end of the stream) into the actor's inbound channel;
//! - the **actor**, which owns the [`TurnState`] exclusively and handles
//!   one thing at a time: a command from a [`TurnHandle`] or a frame
//!   from the reader.
//!
//! Because only the actor touches the turn state, local `submit()` calls
//! and inbound messages are serialized without any lock around it. The
//! only lock left is the transport's send region.

use std::collections::HashMap;
use std::sync::Arc;

use parley_protocol::{Envelope, IdGenerator, Message, MessageId, OperationType};
use parley_transport::{Connection, ConnectionId, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    DisconnectReason, DropReason, MessageStatus, Notice, PeerConfig, PeerEvent, RequestVerdict,
    ResponseVerdict, SubmitPlan, Submitted, TurnError, TurnPhase, TurnState,
};

/// Channel the actor publishes [`PeerEvent`]s on.
pub type EventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

/// How many frames the reader may queue ahead of the actor.
const INBOUND_BUFFER: usize = 32;

/// Commands sent to the actor through its channel.
///
/// The `oneshot::Sender` in each variant is the reply channel: the handle
/// sends a command and waits for the answer on it.
enum TurnCommand {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<Submitted, TurnError>>,
    },
    SendReadReceipt {
        id: MessageId,
        reply: oneshot::Sender<Result<(), TurnError>>,
    },
    Status {
        id: MessageId,
        reply: oneshot::Sender<Option<MessageStatus>>,
    },
    Turn {
        reply: oneshot::Sender<TurnPhase>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<(), TurnError>>,
    },
}

/// What the reader task hands to the actor.
enum Inbound {
    Frame(Vec<u8>),
    /// The stream ended: `None` for a clean close, `Some` for a failure.
    Ended(Option<TransportError>),
}

// ---------------------------------------------------------------------------
// TurnHandle
// ---------------------------------------------------------------------------

/// Handle to a running coordinator. Used to send commands to it.
///
/// Cheap to clone. Once the coordinator has stopped, every call fails
/// with [`TurnError::Closed`] except [`close`](Self::close), which is
/// idempotent.
#[derive(Clone)]
pub struct TurnHandle {
    conn_id: ConnectionId,
    sender: mpsc::Sender<TurnCommand>,
}

impl TurnHandle {
    /// The connection this coordinator drives.
    pub fn connection_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Returns `true` once the coordinator has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends `text` as whatever the turn allows.
    ///
    /// - Owing → a RESPONSE to the pending REQUEST.
    /// - Idle → a new REQUEST; we start Waiting for its answer.
    /// - Waiting → nothing; returns [`Submitted::Rejected`].
    ///
    /// # Errors
    /// [`TurnError::Transport`] or [`TurnError::Protocol`] if the message
    /// couldn't be sent (turn state unchanged), [`TurnError::Closed`] if
    /// the coordinator has stopped.
    pub async fn submit(&self, text: impl Into<String>) -> Result<Submitted, TurnError> {
        let text = text.into();
        self.request(|reply| TurnCommand::Submit { text, reply })
            .await?
    }

    /// Sends a READ_RECEIPT for a REQUEST we received. No turn change.
    pub async fn send_read_receipt(&self, id: MessageId) -> Result<(), TurnError> {
        self.request(|reply| TurnCommand::SendReadReceipt { id, reply })
            .await?
    }

    /// Delivery status of a REQUEST we sent, if we sent one with this ID.
    pub async fn status(&self, id: MessageId) -> Result<Option<MessageStatus>, TurnError> {
        self.request(|reply| TurnCommand::Status { id, reply }).await
    }

    /// Current turn phase.
    pub async fn turn(&self) -> Result<TurnPhase, TurnError> {
        self.request(|reply| TurnCommand::Turn { reply }).await
    }

    /// Closes the connection and stops the coordinator.
    ///
    /// A [`PeerEvent::Disconnected`] with [`DisconnectReason::Local`] is
    /// published as the final event. Calling this again is a no-op.
    pub async fn close(&self) -> Result<(), TurnError> {
        match self.request(|reply| TurnCommand::Shutdown { reply }).await {
            Ok(result) => result,
            Err(TurnError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> TurnCommand,
    ) -> Result<T, TurnError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| TurnError::Closed)?;
        reply_rx.await.map_err(|_| TurnError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The internal actor state. Runs inside a Tokio task.
struct TurnActor<C> {
    name: String,
    conn: Arc<C>,
    envelope: Envelope,
    priority: u8,
    state: TurnState,
    /// Delivery status of every REQUEST we've sent on this connection.
    statuses: HashMap<MessageId, MessageStatus>,
    events: mpsc::UnboundedSender<PeerEvent>,
    commands: mpsc::Receiver<TurnCommand>,
    inbound: mpsc::Receiver<Inbound>,
    reader: JoinHandle<()>,
}

impl<C: Connection> TurnActor<C> {
    /// Runs the actor loop until the connection ends.
    async fn run(mut self) {
        let conn_id = self.conn.id();
        tracing::info!(%conn_id, name = %self.name, "turn coordinator started");

        let reason = loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(TurnCommand::Shutdown { reply }) => {
                        let result = self.conn.close().await.map_err(TurnError::from);
                        let _ = reply.send(result);
                        break DisconnectReason::Local;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    // Every handle was dropped; nobody can talk to us.
                    None => break DisconnectReason::Local,
                },
                item = self.inbound.recv() => match item {
                    Some(Inbound::Frame(frame)) => self.handle_frame(&frame).await,
                    Some(Inbound::Ended(None)) | None => break DisconnectReason::PeerClosed,
                    Some(Inbound::Ended(Some(e))) => break DisconnectReason::Transport(e),
                },
            }
        };

        self.reader.abort();
        if let Err(e) = self.conn.close().await {
            tracing::debug!(%conn_id, error = %e, "close after disconnect failed");
        }

        tracing::info!(%conn_id, name = %self.name, %reason, "turn coordinator stopped");
        self.emit(PeerEvent::Disconnected(reason));
    }

    async fn handle_command(&mut self, cmd: TurnCommand) {
        match cmd {
            TurnCommand::Submit { text, reply } => {
                let result = self.handle_submit(text).await;
                let _ = reply.send(result);
            }
            TurnCommand::SendReadReceipt { id, reply } => {
                let receipt = self.envelope.control(OperationType::ReadReceipt, id);
                let result = self
                    .conn
                    .send(&receipt.encode())
                    .await
                    .map_err(TurnError::from);
                if result.is_ok() {
                    tracing::debug!(conn_id = %self.conn.id(), message_id = %id, "read receipt sent");
                }
                let _ = reply.send(result);
            }
            TurnCommand::Status { id, reply } => {
                let _ = reply.send(self.statuses.get(&id).copied());
            }
            TurnCommand::Turn { reply } => {
                let _ = reply.send(self.state.phase());
            }
            // Handled in the run loop.
            TurnCommand::Shutdown { .. } => {}
        }
    }

    async fn handle_submit(&mut self, text: String) -> Result<Submitted, TurnError> {
        let conn_id = self.conn.id();

        match self.state.plan_submit() {
            SubmitPlan::Reject { awaiting } => {
                tracing::debug!(%conn_id, %awaiting, "submit rejected: waiting for a response");
                Ok(Submitted::Rejected { awaiting })
            }
            SubmitPlan::Respond(id) => {
                let response =
                    self.envelope
                        .correlated(text, OperationType::Response, id, self.priority)?;
                self.conn.send(&response.encode()).await?;
                self.state.response_sent();
                tracing::debug!(%conn_id, message_id = %id, "response sent");
                Ok(Submitted::Response(id))
            }
            SubmitPlan::Request => {
                let request = self
                    .envelope
                    .create(text, OperationType::Request, self.priority)?;
                let id = request.id();
                self.conn.send(&request.encode()).await?;
                self.state.request_sent(id);
                self.statuses.insert(id, MessageStatus::Sent);
                tracing::debug!(%conn_id, message_id = %id, "request sent, waiting for response");
                Ok(Submitted::Request(id))
            }
        }
    }

    async fn handle_frame(&mut self, frame: &[u8]) {
        let conn_id = self.conn.id();

        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "discarding undecodable frame");
                self.emit(PeerEvent::Notice(Notice::Undecodable(e)));
                return;
            }
        };

        let id = message.id();
        tracing::trace!(%conn_id, message_id = %id, op = %message.operation(), "message received");

        match message.operation() {
            OperationType::Request => self.handle_request(message).await,
            OperationType::Ack => {
                self.advance_status(id, MessageStatus::Delivered);
                self.emit(PeerEvent::Ack(id));
            }
            OperationType::ReadReceipt => {
                self.advance_status(id, MessageStatus::Read);
                self.emit(PeerEvent::ReadReceipt(id));
            }
            OperationType::Response => match self.state.accept_response(id) {
                ResponseVerdict::Expected => {
                    tracing::debug!(%conn_id, message_id = %id, "response received");
                    self.emit(PeerEvent::Response(message));
                }
                ResponseVerdict::Unexpected { awaiting } => {
                    tracing::warn!(%conn_id, message_id = %id, ?awaiting, "unexpected response");
                    self.emit(PeerEvent::UnexpectedResponse { message, awaiting });
                }
            },
            OperationType::Error => {
                tracing::debug!(%conn_id, message_id = %id, "peer sent an error message");
                self.emit(PeerEvent::Notice(Notice::ErrorReceived(message)));
            }
        }
    }

    /// Handles an inbound REQUEST.
    ///
    /// The ACK is sent only once the request has been taken as the owed
    /// turn. A REQUEST that arrives while we already owe a response, or
    /// while we're waiting for one, is dropped without an ACK: the sender
    /// broke turn order, so nothing confirms delivery.
    async fn handle_request(&mut self, message: Message) {
        let conn_id = self.conn.id();
        let id = message.id();

        let reason = match self.state.accept_request(id) {
            RequestVerdict::Accepted => {
                let ack = self.envelope.control(OperationType::Ack, id);
                if let Err(e) = self.conn.send(&ack.encode()).await {
                    tracing::warn!(%conn_id, message_id = %id, error = %e, "failed to send ack");
                }
                tracing::debug!(%conn_id, message_id = %id, "request accepted, response owed");
                self.emit(PeerEvent::Request(message));
                return;
            }
            RequestVerdict::DroppedOwing { pending } => DropReason::AlreadyOwing(pending),
            RequestVerdict::DroppedWaiting { awaiting } => DropReason::AwaitingResponse(awaiting),
        };

        tracing::debug!(%conn_id, message_id = %id, ?reason, "request dropped");
        self.emit(PeerEvent::Notice(Notice::RequestDropped { message, reason }));
    }

    fn advance_status(&mut self, id: MessageId, next: MessageStatus) {
        if let Some(status) = self.statuses.get_mut(&id) {
            *status = status.advance(next);
        }
    }

    /// Publishes an event. Silently drops it if nobody is listening.
    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }
}

/// Reads frames until the stream ends, forwarding each to the actor.
async fn read_frames<C: Connection>(conn: Arc<C>, inbound: mpsc::Sender<Inbound>) {
    loop {
        let (item, done) = match conn.recv().await {
            Ok(Some(frame)) => (Inbound::Frame(frame), false),
            Ok(None) => (Inbound::Ended(None), true),
            Err(e) => (Inbound::Ended(Some(e)), true),
        };
        if inbound.send(item).await.is_err() || done {
            break;
        }
    }
}

/// Spawns a coordinator for `conn` and returns a handle plus the event
/// stream.
///
/// Fresh REQUEST IDs are drawn from `ids`. Must be called from within a
/// Tokio runtime.
pub fn spawn_coordinator<C: Connection>(
    conn: C,
    config: &PeerConfig,
    ids: Arc<IdGenerator>,
) -> (TurnHandle, EventReceiver) {
    let conn_id = conn.id();
    let conn = Arc::new(conn);

    let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let reader = tokio::spawn(read_frames(Arc::clone(&conn), inbound_tx));

    let actor = TurnActor {
        name: config.name.clone(),
        conn,
        envelope: Envelope::with_ids(config.protocol_id, ids),
        priority: config.priority,
        state: TurnState::new(),
        statuses: HashMap::new(),
        events: event_tx,
        commands: command_rx,
        inbound: inbound_rx,
        reader,
    };

    tokio::spawn(actor.run());

    (
        TurnHandle {
            conn_id,
            sender: command_tx,
        },
        event_rx,
    )
}
