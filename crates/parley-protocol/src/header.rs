//! The fixed 23-byte PDU header.
//!
//! ```text
//!  0       1       3       4       5               13      17      19      23
//!  +-------+-------+-------+-------+---------------+-------+-------+-------+
//!  |version| proto |  op   | prio  |   timestamp   |  id   |  len  |  crc  |
//!  |  u8   |  u16  |  u8   |  u8   |      f64      |  u32  |  u16  |  u32  |
//!  +-------+-------+-------+-------+---------------+-------+-------+-------+
//! ```
//!
//! Every multi-byte field is big-endian ("network order"). There are no
//! variable-width fields, so encoding never fails and never allocates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{MessageId, ProtocolError, Result};

/// The protocol version written into every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Protocol tag used when the application doesn't choose one.
pub const DEFAULT_PROTOCOL_ID: u16 = 0x215A;

// ---------------------------------------------------------------------------
// OperationType
// ---------------------------------------------------------------------------

/// What a PDU is for. Closed set; the byte values are part of the wire
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// A new question awaiting an answer.
    Request,
    /// Delivery acknowledgment. Empty payload.
    Ack,
    /// Read acknowledgment. Empty payload.
    ReadReceipt,
    /// Reserved.
    Error,
    /// The answer to a REQUEST, correlated by message ID.
    Response,
}

impl OperationType {
    /// The byte written into the header.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Request => 1,
            Self::Ack => 2,
            Self::ReadReceipt => 3,
            Self::Error => 4,
            Self::Response => 5,
        }
    }

    /// Maps a header byte back to an operation, if it is one we know.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Request),
            2 => Some(Self::Ack),
            3 => Some(Self::ReadReceipt),
            4 => Some(Self::Error),
            5 => Some(Self::Response),
            _ => None,
        }
    }
}

impl TryFrom<u8> for OperationType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_u8(value).ok_or_else(|| {
            ProtocolError::MalformedHeader(format!("unknown operation type {value}"))
        })
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "REQUEST",
            Self::Ack => "ACK",
            Self::ReadReceipt => "READ_RECEIPT",
            Self::Error => "ERROR",
            Self::Response => "RESPONSE",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Protocol metadata that precedes every payload.
///
/// The codec is purely structural: it does not check that `checksum`
/// matches anything. That's [`Message::decode`](crate::Message::decode)'s
/// job, since only it sees the payload.
///
/// `PartialEq` but not `Eq`, because `timestamp` is a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    /// Protocol version, currently always [`PROTOCOL_VERSION`].
    pub version: u8,
    /// Application-chosen protocol tag.
    pub protocol_id: u16,
    /// What this PDU is.
    pub operation: OperationType,
    /// Carried through untouched; the core never looks at it.
    pub priority: u8,
    /// Seconds since the Unix epoch when the message was built.
    pub timestamp: f64,
    /// Correlation ID.
    pub message_id: MessageId,
    /// Number of payload bytes following the header.
    pub payload_len: u16,
    /// CRC-32 of the payload.
    pub checksum: u32,
}

impl Header {
    /// Encoded size in bytes.
    pub const SIZE: usize = 23;

    /// Encoded size in bytes. Callers use this to know where the payload
    /// starts inside a frame.
    pub const fn size() -> usize {
        Self::SIZE
    }

    /// Serializes the header in wire order.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.version;
        buf[1..3].copy_from_slice(&self.protocol_id.to_be_bytes());
        buf[3] = self.operation.as_u8();
        buf[4] = self.priority;
        buf[5..13].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[13..17].copy_from_slice(&self.message_id.0.to_be_bytes());
        buf[17..19].copy_from_slice(&self.payload_len.to_be_bytes());
        buf[19..23].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }

    /// Parses a header from exactly [`Header::SIZE`] bytes.
    ///
    /// # Errors
    /// [`ProtocolError::MalformedHeader`] if `data` has the wrong length or
    /// the operation-type byte is unknown.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != Self::SIZE {
            return Err(ProtocolError::MalformedHeader(format!(
                "expected {} header bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }

        let operation = OperationType::try_from(data[3])?;

        Ok(Self {
            version: data[0],
            protocol_id: u16::from_be_bytes([data[1], data[2]]),
            operation,
            priority: data[4],
            timestamp: f64::from_be_bytes([
                data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
            ]),
            message_id: MessageId(u32::from_be_bytes([
                data[13], data[14], data[15], data[16],
            ])),
            payload_len: u16::from_be_bytes([data[17], data[18]]),
            checksum: u32::from_be_bytes([data[19], data[20], data[21], data[22]]),
        })
    }
}
