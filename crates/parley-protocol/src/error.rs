//! Error types for the protocol layer.
//!
//! Each crate in Parley defines its own error enum. When you see a
//! `ProtocolError`, the problem is in the bytes of a single PDU (header
//! layout, payload length, checksum), not in the connection carrying it.

/// Errors that can occur while building or decoding a PDU.
///
/// None of these are fatal to a connection: a peer that receives a bad
/// frame reports it and moves on to the next one.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The header is structurally invalid.
    ///
    /// Wrong byte count, an operation-type byte outside the known set, or
    /// a frame whose length disagrees with the header's `payload_len`.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The payload CRC-32 does not match the one declared in the header.
    ///
    /// Printed as hex so it lines up with packet captures.
    #[error("integrity check failed: header declares {expected:#010x}, payload hashes to {actual:#010x}")]
    Integrity {
        /// Checksum carried in the header.
        expected: u32,
        /// Checksum computed over the received payload.
        actual: u32,
    },

    /// The payload does not fit in the 16-bit `payload_len` field.
    #[error("payload of {0} bytes exceeds the 65535-byte limit")]
    PayloadTooLarge(usize),
}

/// Shorthand used throughout this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;
