//! TCP implementation of the framed transport.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Mutex, watch};

use crate::{Connection, ConnectionId, LENGTH_PREFIX_LEN, MAX_FRAME_LEN, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Listen backlog. Only one peer is ever accepted.
const BACKLOG: u32 = 1;

// ---------------------------------------------------------------------------
// Acceptor
// ---------------------------------------------------------------------------

/// A bound listening socket waiting for its one peer.
///
/// Split from [`Acceptor::accept`] so callers can learn the bound port
/// (e.g. after binding to port 0) before anyone connects.
pub struct Acceptor {
    listener: TcpListener,
}

impl Acceptor {
    /// Binds to `addr` with address reuse enabled and starts listening.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket_addr = tokio::net::lookup_host(addr)
            .await
            .map_err(TransportError::AcceptFailed)?
            .next()
            .ok_or_else(|| {
                TransportError::AcceptFailed(std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("{addr} did not resolve to any address"),
                ))
            })?;

        let socket = if socket_addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(TransportError::AcceptFailed)?;

        socket
            .set_reuseaddr(true)
            .map_err(TransportError::AcceptFailed)?;
        socket
            .bind(socket_addr)
            .map_err(TransportError::AcceptFailed)?;
        let listener = socket
            .listen(BACKLOG)
            .map_err(TransportError::AcceptFailed)?;

        tracing::info!(addr = %socket_addr, "waiting for a peer");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for one peer to connect.
    ///
    /// Consumes the acceptor: the listening socket is closed as soon as
    /// the peer is accepted, so nobody else can connect afterwards.
    pub async fn accept(self) -> Result<FramedConnection, TransportError> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        drop(self.listener);

        let conn = FramedConnection::from_stream(stream, peer_addr)
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(conn_id = %conn.id, %peer_addr, "peer connected");
        Ok(conn)
    }
}

// ---------------------------------------------------------------------------
// FramedConnection
// ---------------------------------------------------------------------------

/// One TCP connection carrying length-prefixed frames.
///
/// The read and write halves each sit behind their own async mutex:
/// the write mutex is the exclusive send region, and the read mutex keeps
/// a frame's prefix and body from being split between two readers.
/// Sending and receiving never block each other.
///
/// `closed` flips to `true` exactly once. Every `recv` watches it, so a
/// local [`close`](Self::close) releases readers that are still waiting
/// on a silent peer.
pub struct FramedConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    closed: watch::Sender<bool>,
}

impl FramedConnection {
    /// Binds to `addr`, waits for one peer, and returns its connection.
    pub async fn listen_and_accept(addr: &str) -> Result<Self, TransportError> {
        Acceptor::bind(addr).await?.accept().await
    }

    /// Connects to a peer listening on `addr`.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        let peer_addr = stream.peer_addr().map_err(TransportError::ConnectFailed)?;

        let conn =
            Self::from_stream(stream, peer_addr).map_err(TransportError::ConnectFailed)?;
        tracing::info!(conn_id = %conn.id, %peer_addr, "connected to peer");
        Ok(conn)
    }

    fn from_stream(stream: TcpStream, peer_addr: SocketAddr) -> std::io::Result<Self> {
        // Frames are small and interactive; don't let Nagle hold them back.
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            peer_addr,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: watch::channel(false).0,
        })
    }

    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Sends one frame: a 4-byte big-endian length, then `payload`.
    ///
    /// Prefix and payload are written as a single buffer while holding the
    /// send lock, so concurrent callers queue up instead of interleaving.
    ///
    /// # Errors
    /// - [`TransportError::Closed`] after a local [`close`](Self::close).
    /// - [`TransportError::FrameTooLarge`] if `payload` exceeds [`MAX_FRAME_LEN`].
    /// - [`TransportError::SendFailed`] if the socket write fails.
    pub async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if payload.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(payload.len()));
        }

        let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(TransportError::SendFailed)?;

        tracing::trace!(conn_id = %self.id, len = payload.len(), "frame sent");
        Ok(())
    }

    /// Receives the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection, whether that
    /// happened between frames or part-way through one. Also returns
    /// `Ok(None)` once this side calls [`close`](Self::close), including
    /// for a `recv` that was already waiting.
    ///
    /// # Errors
    /// - [`TransportError::FrameTooLarge`] if the length prefix is larger
    ///   than any valid frame. The stream can't be resynchronised after this.
    /// - [`TransportError::ReceiveFailed`] on any other I/O failure.
    pub async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut closed = self.closed.subscribe();

        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => {
                tracing::debug!(conn_id = %self.id, "receive stopped by local close");
                Ok(None)
            }
            result = self.read_frame() => result,
        }
    }

    async fn read_frame(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut reader = self.reader.lock().await;

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        if !read_exact_or_eof(&mut *reader, &mut prefix).await? {
            return Ok(None);
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(len));
        }

        let mut frame = vec![0u8; len];
        if !read_exact_or_eof(&mut *reader, &mut frame).await? {
            tracing::debug!(conn_id = %self.id, len, "peer closed mid-frame");
            return Ok(None);
        }

        tracing::trace!(conn_id = %self.id, len, "frame received");
        Ok(Some(frame))
    }

    /// Closes the connection.
    ///
    /// Shuts down the sending side, so the peer sees end-of-stream on its
    /// next read, and wakes every local `recv` with `Ok(None)`. Idempotent,
    /// and safe to call after the peer has already gone away.
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.closed.send_replace(true) {
            return Ok(());
        }

        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotConnected => {
                tracing::debug!(conn_id = %self.id, "peer already gone at close");
            }
            Err(e) => return Err(TransportError::SendFailed(e)),
        }

        tracing::info!(conn_id = %self.id, "connection closed");
        Ok(())
    }
}

impl Connection for FramedConnection {
    fn send(&self, frame: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send {
        FramedConnection::send(self, frame)
    }

    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send {
        FramedConnection::recv(self)
    }

    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        FramedConnection::close(self)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Fills `buf` completely. Returns `Ok(false)` if the stream ended first.
async fn read_exact_or_eof<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, TransportError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(TransportError::ReceiveFailed(e)),
    }
}
