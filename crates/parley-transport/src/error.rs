/// Errors that can occur in the transport layer.
///
/// A peer closing the connection cleanly is *not* one of these: it shows
/// up as `Ok(None)` from [`FramedConnection::recv`](crate::FramedConnection::recv).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening a connection to a listening peer failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Binding, listening, or accepting failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A frame is longer than any PDU can be. On receive this means the
    /// stream is out of sync and can't be recovered.
    #[error("frame of {0} bytes exceeds the {max} byte limit", max = crate::MAX_FRAME_LEN)]
    FrameTooLarge(usize),

    /// The connection was closed locally.
    #[error("connection closed")]
    Closed,
}
