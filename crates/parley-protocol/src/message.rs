//! A complete PDU: header plus payload.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::header::PROTOCOL_VERSION;
use crate::{Header, MessageId, OperationType, ProtocolError, Result};

/// Placeholder returned by [`Message::text`] when the payload isn't UTF-8.
pub const BINARY_SENTINEL: &str = "<binary>";

/// One protocol message.
///
/// A `Message` is immutable: the header's `payload_len` and `checksum`
/// are computed once from the payload and can't drift from it afterwards.
/// Build fresh ones through an [`Envelope`](crate::Envelope); rebuild
/// received ones with [`Message::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    header: Header,
    payload: Vec<u8>,
}

impl Message {
    /// Assembles a message, computing length, checksum, and timestamp.
    ///
    /// The caller is responsible for having checked the payload length.
    pub(crate) fn assemble(
        protocol_id: u16,
        operation: OperationType,
        priority: u8,
        message_id: MessageId,
        payload: Vec<u8>,
    ) -> Self {
        debug_assert!(payload.len() <= usize::from(u16::MAX));
        let header = Header {
            version: PROTOCOL_VERSION,
            protocol_id,
            operation,
            priority,
            timestamp: unix_now(),
            message_id,
            payload_len: payload.len() as u16,
            checksum: crc32fast::hash(&payload),
        };
        Self { header, payload }
    }

    /// The message's header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the message, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Shorthand for `header().message_id`.
    pub fn id(&self) -> MessageId {
        self.header.message_id
    }

    /// Shorthand for `header().operation`.
    pub fn operation(&self) -> OperationType {
        self.header.operation
    }

    /// Serializes to `header || payload`: the content of one frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Header::SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Rebuilds a message from one frame's content.
    ///
    /// Every field, including the message ID, comes from the wire.
    ///
    /// # Errors
    /// - [`ProtocolError::MalformedHeader`] if the frame is shorter than a
    ///   header, the header itself is invalid, or the frame doesn't carry
    ///   exactly `payload_len` bytes after the header.
    /// - [`ProtocolError::Integrity`] if the payload CRC-32 doesn't match.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Header::SIZE {
            return Err(ProtocolError::MalformedHeader(format!(
                "frame of {} bytes is shorter than the {}-byte header",
                data.len(),
                Header::SIZE
            )));
        }

        let (head, payload) = data.split_at(Header::SIZE);
        let header = Header::decode(head)?;

        let declared = usize::from(header.payload_len);
        if payload.len() != declared {
            return Err(ProtocolError::MalformedHeader(format!(
                "header declares {declared} payload bytes, frame carries {}",
                payload.len()
            )));
        }

        let actual = crc32fast::hash(payload);
        if actual != header.checksum {
            return Err(ProtocolError::Integrity {
                expected: header.checksum,
                actual,
            });
        }

        Ok(Self {
            header,
            payload: payload.to_vec(),
        })
    }

    /// The payload as text.
    ///
    /// Control messages carry no payload and some peers may send binary
    /// data, so invalid UTF-8 yields [`BINARY_SENTINEL`] instead of an error.
    pub fn text(&self) -> Cow<'_, str> {
        match std::str::from_utf8(&self.payload) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => Cow::Borrowed(BINARY_SENTINEL),
        }
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
