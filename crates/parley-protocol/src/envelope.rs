//! The factory for outgoing messages.
//!
//! An [`Envelope`] knows the connection's protocol tag and which
//! [`IdGenerator`] to draw fresh IDs from. It is the only place that
//! consumes IDs, so "a RESPONSE reuses the REQUEST's ID" is enforced by
//! which method you call rather than by convention.

use std::sync::Arc;

use crate::{IdGenerator, Message, MessageId, OperationType, ProtocolError, Result};

/// Builds messages for one protocol tag.
///
/// Cheap to clone: the generator is behind an `Arc`, so clones share the
/// same ID sequence.
#[derive(Debug, Clone)]
pub struct Envelope {
    protocol_id: u16,
    ids: Arc<IdGenerator>,
}

impl Envelope {
    /// Creates an envelope drawing IDs from the process-wide generator.
    pub fn new(protocol_id: u16) -> Self {
        Self::with_ids(protocol_id, IdGenerator::global())
    }

    /// Creates an envelope drawing IDs from `ids`.
    pub fn with_ids(protocol_id: u16, ids: Arc<IdGenerator>) -> Self {
        Self { protocol_id, ids }
    }

    /// The protocol tag stamped into every header.
    pub fn protocol_id(&self) -> u16 {
        self.protocol_id
    }

    /// The generator fresh IDs come from.
    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    /// Builds a message with a freshly drawn ID.
    ///
    /// # Errors
    /// [`ProtocolError::PayloadTooLarge`] if the payload doesn't fit the
    /// 16-bit length field. No ID is consumed in that case.
    pub fn create(
        &self,
        payload: impl Into<Vec<u8>>,
        operation: OperationType,
        priority: u8,
    ) -> Result<Message> {
        let payload = checked(payload.into())?;
        let id = self.ids.next_id();
        Ok(Message::assemble(
            self.protocol_id,
            operation,
            priority,
            id,
            payload,
        ))
    }

    /// Builds a message that reuses `message_id`. The generator is untouched.
    ///
    /// # Errors
    /// [`ProtocolError::PayloadTooLarge`], as for [`create`](Self::create).
    pub fn correlated(
        &self,
        payload: impl Into<Vec<u8>>,
        operation: OperationType,
        message_id: MessageId,
        priority: u8,
    ) -> Result<Message> {
        let payload = checked(payload.into())?;
        Ok(Message::assemble(
            self.protocol_id,
            operation,
            priority,
            message_id,
            payload,
        ))
    }

    /// Builds an empty-payload control message (ACK, READ_RECEIPT)
    /// correlated to `message_id`.
    pub fn control(&self, operation: OperationType, message_id: MessageId) -> Message {
        Message::assemble(self.protocol_id, operation, 0, message_id, Vec::new())
    }
}

fn checked(payload: Vec<u8>) -> Result<Vec<u8>> {
    if payload.len() > usize::from(u16::MAX) {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }
    Ok(payload)
}
