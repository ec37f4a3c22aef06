//! Message identifiers and the generator that hands them out.
//!
//! Every REQUEST gets a fresh ID. Control messages (ACK, READ_RECEIPT)
//! and RESPONSEs reuse the ID of the REQUEST they answer, which is how
//! the two peers correlate a turn.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// A 32-bit message identifier, as carried in the header.
///
/// Newtype wrapper so a message ID can't be confused with a length or a
/// checksum, which are also plain integers on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out strictly increasing message IDs, starting at 1.
///
/// The counter is a single atomic, so `next_id` is the whole
/// read-increment-write sequence in one step: two concurrent callers can
/// never observe the same value.
///
/// Generators are owned explicitly and shared through `Arc`. Tests build
/// their own with [`IdGenerator::starting_at`] to get deterministic IDs;
/// everything else can share [`IdGenerator::global`].
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU32,
}

impl IdGenerator {
    /// Creates a generator whose first ID is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a generator whose first ID is `first`.
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Draws the next ID.
    pub fn next_id(&self) -> MessageId {
        MessageId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the ID the next call to [`next_id`](Self::next_id) would
    /// yield, without consuming it.
    pub fn peek(&self) -> MessageId {
        MessageId(self.next.load(Ordering::Relaxed))
    }

    /// The process-wide generator, created on first use.
    pub fn global() -> Arc<IdGenerator> {
        static GLOBAL: OnceLock<Arc<IdGenerator>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(IdGenerator::new())))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
