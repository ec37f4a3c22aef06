//! # Parley
//!
//! Two-party, turn-taking messaging over TCP.
//!
//! One side waits for a connection, the other dials in. From then on the
//! two alternate: whoever is idle may ask (REQUEST), the other side
//! acknowledges it (ACK) and owes an answer (RESPONSE). Every message
//! travels as a length-prefixed frame holding a 23-byte header and a
//! CRC-32-checked payload.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn run() -> Result<(), ParleyError> {
//! let mut peer = Peer::connect_as_client("127.0.0.1", 9000).await?;
//! let mut events = peer.events()?;
//!
//! peer.submit("hola").await?;
//! while let Some(event) = events.recv().await {
//!     if let PeerEvent::Response(message) = event {
//!         println!("peer says: {}", message.text());
//!         break;
//!     }
//! }
//! peer.close().await
//! # }
//! ```

mod error;
mod listener;
mod peer;

pub use error::ParleyError;
pub use listener::PeerListener;
pub use peer::{Peer, PeerBuilder};

/// Everything needed to hold a conversation.
pub mod prelude {
    pub use crate::{ParleyError, Peer, PeerBuilder, PeerListener};
    pub use parley_protocol::{IdGenerator, Message, MessageId, OperationType};
    pub use parley_turn::{
        DisconnectReason, MessageStatus, Notice, PeerConfig, PeerEvent, Submitted, TurnHandle,
        TurnPhase,
    };
}

/// Re-exports of the layer crates, for lower-level access.
pub use parley_protocol as protocol;
pub use parley_transport as transport;
pub use parley_turn as turn;
