//! `Peer` and its builder: the entry point for one side of a conversation.
//!
//! A `Peer` ties the layers together: transport → protocol → turn. It
//! either waits for exactly one inbound connection (server role) or dials
//! out (client role). After that both roles behave identically.

use std::net::SocketAddr;
use std::sync::Arc;

use parley_protocol::{IdGenerator, MessageId};
use parley_transport::{Acceptor, FramedConnection};
use parley_turn::{
    EventReceiver, MessageStatus, PeerConfig, Submitted, TurnHandle, TurnPhase, spawn_coordinator,
};
use tokio::task::JoinHandle;

use crate::listener::{PeerListener, dispatch};
use crate::ParleyError;

/// Builder for configuring and connecting a [`Peer`].
///
/// # Example
///
/// ```rust,ignore
/// use parley::prelude::*;
///
/// let peer = Peer::builder()
///     .name("ana")
///     .priority(2)
///     .connect("127.0.0.1:9000")
///     .await?;
/// ```
pub struct PeerBuilder {
    config: PeerConfig,
    ids: Option<Arc<IdGenerator>>,
}

impl PeerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: PeerConfig::default(),
            ids: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: PeerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the display name used in log fields.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the protocol tag stamped into outgoing headers.
    pub fn protocol_id(mut self, protocol_id: u16) -> Self {
        self.config.protocol_id = protocol_id;
        self
    }

    /// Sets the priority byte stamped into outgoing messages.
    pub fn priority(mut self, priority: u8) -> Self {
        self.config.priority = priority;
        self
    }

    /// Draws REQUEST IDs from `ids` instead of the process-wide generator.
    pub fn ids(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Waits for one peer on an already-bound acceptor.
    pub async fn accept(self, acceptor: Acceptor) -> Result<Peer, ParleyError> {
        let conn = acceptor.accept().await?;
        Ok(self.attach(conn))
    }

    /// Binds `addr`, waits for one peer, then stops listening.
    pub async fn serve(self, addr: &str) -> Result<Peer, ParleyError> {
        let conn = FramedConnection::listen_and_accept(addr).await?;
        Ok(self.attach(conn))
    }

    /// Dials `addr`.
    pub async fn connect(self, addr: &str) -> Result<Peer, ParleyError> {
        let conn = FramedConnection::connect(addr).await?;
        Ok(self.attach(conn))
    }

    /// Dials `host` on `port`. `host` may be a name, an IPv4 address, or
    /// an IPv6 address with or without brackets.
    pub async fn connect_host(self, host: &str, port: u16) -> Result<Peer, ParleyError> {
        self.connect(&join_host_port(host, port)).await
    }

    fn attach(self, conn: FramedConnection) -> Peer {
        let peer_addr = conn.peer_addr();
        let ids = self.ids.unwrap_or_else(IdGenerator::global);
        let (handle, events) = spawn_coordinator(conn, &self.config, ids);

        tracing::info!(
            conn_id = %handle.connection_id(),
            name = %self.config.name,
            %peer_addr,
            "peer connected"
        );

        Peer {
            handle,
            events: Some(events),
            peer_addr,
        }
    }
}

impl Default for PeerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One side of a two-party conversation.
///
/// Dropping the `Peer` (and every [`TurnHandle`] cloned from it) closes
/// the connection.
pub struct Peer {
    handle: TurnHandle,
    events: Option<EventReceiver>,
    peer_addr: SocketAddr,
}

impl Peer {
    /// Creates a new builder.
    pub fn builder() -> PeerBuilder {
        PeerBuilder::new()
    }

    /// Listens on `0.0.0.0:port` and waits for one peer, with default
    /// settings.
    pub async fn connect_as_server(port: u16) -> Result<Peer, ParleyError> {
        PeerBuilder::new().serve(&format!("0.0.0.0:{port}")).await
    }

    /// Connects to `host:port`, with default settings.
    pub async fn connect_as_client(host: &str, port: u16) -> Result<Peer, ParleyError> {
        PeerBuilder::new().connect_host(host, port).await
    }

    /// The other side's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// A cloneable handle to the coordinator, for use from other tasks.
    pub fn handle(&self) -> TurnHandle {
        self.handle.clone()
    }

    /// Sends `text` as a new REQUEST or as the owed RESPONSE, or returns
    /// [`Submitted::Rejected`] if we're waiting for an answer.
    pub async fn submit(&self, text: impl Into<String>) -> Result<Submitted, ParleyError> {
        Ok(self.handle.submit(text).await?)
    }

    /// Tells the peer we've read its REQUEST `id`.
    pub async fn send_read_receipt(&self, id: MessageId) -> Result<(), ParleyError> {
        Ok(self.handle.send_read_receipt(id).await?)
    }

    /// Delivery status of a REQUEST we sent.
    pub async fn status(&self, id: MessageId) -> Result<Option<MessageStatus>, ParleyError> {
        Ok(self.handle.status(id).await?)
    }

    /// Whose turn it is.
    pub async fn turn(&self) -> Result<TurnPhase, ParleyError> {
        Ok(self.handle.turn().await?)
    }

    /// Closes the connection. Idempotent.
    pub async fn close(&self) -> Result<(), ParleyError> {
        Ok(self.handle.close().await?)
    }

    /// Takes the raw event stream. Can only be taken once, and not
    /// together with [`listen`](Self::listen).
    pub fn events(&mut self) -> Result<EventReceiver, ParleyError> {
        self.events.take().ok_or(ParleyError::EventsTaken)
    }

    /// Spawns a task that feeds every event to `listener` until the
    /// connection ends. The task yields the listener back when done.
    pub fn listen<L: PeerListener>(
        &mut self,
        mut listener: L,
    ) -> Result<JoinHandle<L>, ParleyError> {
        let mut events = self.events()?;
        let conn_id = self.handle.connection_id();

        Ok(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                dispatch(&mut listener, &event);
            }
            tracing::debug!(%conn_id, "listener finished");
            listener
        }))
    }
}

/// Formats `host:port`, bracketing bare IPv6 literals.
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
