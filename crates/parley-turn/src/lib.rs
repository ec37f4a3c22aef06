//! Turn-taking coordination for two-party Parley conversations.
//!
//! Two peers alternate strictly: one asks (REQUEST), the other
//! acknowledges (ACK) and eventually answers (RESPONSE). At any moment a
//! side is either Idle, Waiting for the answer to its own REQUEST, or
//! Owing an answer to the peer's REQUEST.
//!
//! The crate is split in two:
//!
//! 1. **State** ([`TurnState`]): the pure turn machine, no I/O.
//! 2. **Coordinator** ([`spawn_coordinator`]): an actor task that owns the
//!    state and the connection, applies inbound messages and local
//!    submits one at a time, and publishes [`PeerEvent`]s.
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (above)  ← Peer, PeerListener callbacks
//!     ↕
//! Turn Layer (this crate)  ← who may speak next, ACKs, delivery status
//!     ↕
//! Protocol + Transport (below)  ← PDUs with CRC-32, length-prefixed TCP
//! ```

mod config;
mod coordinator;
mod error;
mod event;
mod state;

pub use config::PeerConfig;
pub use coordinator::{EventReceiver, TurnHandle, spawn_coordinator};
pub use error::TurnError;
pub use event::{DisconnectReason, DropReason, Notice, PeerEvent, Submitted};
pub use state::{
    MessageStatus, RequestVerdict, ResponseVerdict, SubmitPlan, TurnPhase, TurnState,
};
