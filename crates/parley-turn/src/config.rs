//! Per-peer configuration.

use parley_protocol::DEFAULT_PROTOCOL_ID;
use serde::{Deserialize, Serialize};

/// Configuration for one side of a conversation.
///
/// Every field has a default, so a config file only needs the fields it
/// wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Display name, used in log fields.
    pub name: String,

    /// Protocol tag stamped into every outgoing header.
    pub protocol_id: u16,

    /// Priority byte stamped into outgoing REQUESTs and RESPONSEs.
    pub priority: u8,

    /// Capacity of the coordinator's command channel. Callers wait when
    /// it's full.
    pub command_buffer: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: "peer".to_string(),
            protocol_id: DEFAULT_PROTOCOL_ID,
            priority: 0,
            command_buffer: 64,
        }
    }
}
