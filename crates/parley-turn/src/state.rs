//! The turn-taking state machine.
//!
//! Two optional correlation IDs capture the whole conversation state:
//!
//! ```text
//!                 submit() sends REQUEST(id)
//!        ┌──────────────────────────────────────┐
//!        │                                      ▼
//!      Idle ◄── RESPONSE(id) received ──── Waiting(id)
//!        │  ▲
//!        │  └── submit() sends RESPONSE(id) ─┐
//!        │                                   │
//!        └── REQUEST(id) received ─────► Owing(id)
//! ```
//!
//! Waiting and Owing are mutually exclusive: a REQUEST that arrives while
//! Waiting is dropped, and `submit()` while Owing always answers instead
//! of opening a new turn.
//!
//! [`TurnState`] is plain data with no I/O, so the coordinator can ask
//! what to do ([`plan_submit`](TurnState::plan_submit)), do it, and only
//! then commit ([`request_sent`](TurnState::request_sent),
//! [`response_sent`](TurnState::response_sent)). A failed send leaves the
//! state untouched.

use std::fmt;

use parley_protocol::MessageId;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Where a conversation stands, from this side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Nothing outstanding. Either side may ask.
    Idle,
    /// We asked and are waiting for the answer to this REQUEST.
    Waiting(MessageId),
    /// We were asked and owe an answer to this REQUEST.
    Owing(MessageId),
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Waiting(id) => write!(f, "waiting for a response to {id}"),
            Self::Owing(id) => write!(f, "owing a response to {id}"),
        }
    }
}

/// What a local `submit()` should send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPlan {
    /// Open a new turn with a fresh REQUEST.
    Request,
    /// Answer the pending REQUEST with this ID.
    Respond(MessageId),
    /// Send nothing: our own REQUEST is still unanswered.
    Reject {
        /// The REQUEST we're waiting on.
        awaiting: MessageId,
    },
}

/// What to do with an inbound REQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestVerdict {
    /// Accepted: we now owe a response to it.
    Accepted,
    /// Dropped: we already owe a response to `pending`.
    DroppedOwing {
        /// The REQUEST still waiting for our answer.
        pending: MessageId,
    },
    /// Dropped: we're waiting on our own REQUEST `awaiting`.
    DroppedWaiting {
        /// Our unanswered REQUEST.
        awaiting: MessageId,
    },
}

/// What to do with an inbound RESPONSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseVerdict {
    /// It answers our outstanding REQUEST; we're Idle again.
    Expected,
    /// It doesn't match anything we're waiting for.
    Unexpected {
        /// What we *were* waiting for, if anything.
        awaiting: Option<MessageId>,
    },
}

// ---------------------------------------------------------------------------
// TurnState
// ---------------------------------------------------------------------------

/// The two correlation fields that make up a turn.
///
/// Invariant: `awaiting_response_to` and `must_respond_to` are never both
/// `Some`. Every mutating method preserves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnState {
    awaiting_response_to: Option<MessageId>,
    must_respond_to: Option<MessageId>,
}

impl TurnState {
    /// A fresh, Idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The REQUEST we sent and haven't had answered.
    pub fn awaiting_response_to(&self) -> Option<MessageId> {
        self.awaiting_response_to
    }

    /// The REQUEST we received and haven't answered.
    pub fn must_respond_to(&self) -> Option<MessageId> {
        self.must_respond_to
    }

    /// Collapses the two fields into a phase.
    pub fn phase(&self) -> TurnPhase {
        match (self.awaiting_response_to, self.must_respond_to) {
            (_, Some(id)) => TurnPhase::Owing(id),
            (Some(id), None) => TurnPhase::Waiting(id),
            (None, None) => TurnPhase::Idle,
        }
    }

    /// Decides what a local `submit()` should send. Doesn't change state.
    ///
    /// An owed answer always takes precedence over opening a new turn.
    pub fn plan_submit(&self) -> SubmitPlan {
        if let Some(id) = self.must_respond_to {
            return SubmitPlan::Respond(id);
        }
        match self.awaiting_response_to {
            Some(awaiting) => SubmitPlan::Reject { awaiting },
            None => SubmitPlan::Request,
        }
    }

    /// Records that REQUEST `id` went out. Call only after
    /// [`plan_submit`](Self::plan_submit) returned [`SubmitPlan::Request`]
    /// and the send succeeded.
    pub fn request_sent(&mut self, id: MessageId) {
        debug_assert_eq!(self.plan_submit(), SubmitPlan::Request);
        self.awaiting_response_to = Some(id);
    }

    /// Records that the owed RESPONSE went out.
    pub fn response_sent(&mut self) {
        self.must_respond_to = None;
    }

    /// Handles an inbound REQUEST, entering Owing if we were Idle.
    pub fn accept_request(&mut self, id: MessageId) -> RequestVerdict {
        if let Some(pending) = self.must_respond_to {
            return RequestVerdict::DroppedOwing { pending };
        }
        if let Some(awaiting) = self.awaiting_response_to {
            return RequestVerdict::DroppedWaiting { awaiting };
        }
        self.must_respond_to = Some(id);
        RequestVerdict::Accepted
    }

    /// Handles an inbound RESPONSE, returning to Idle if it's the one we
    /// were waiting for.
    pub fn accept_response(&mut self, id: MessageId) -> ResponseVerdict {
        match self.awaiting_response_to {
            Some(awaiting) if awaiting == id => {
                self.awaiting_response_to = None;
                ResponseVerdict::Expected
            }
            awaiting => ResponseVerdict::Unexpected { awaiting },
        }
    }
}

// ---------------------------------------------------------------------------
// MessageStatus
// ---------------------------------------------------------------------------

/// Delivery progress of a REQUEST we sent.
///
/// Ordered: a status only ever moves forward, so a late ACK arriving
/// after the READ_RECEIPT doesn't undo it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageStatus {
    /// Written to the socket.
    Sent,
    /// The peer acknowledged receipt.
    Delivered,
    /// The peer reported it as read.
    Read,
}

impl MessageStatus {
    /// Moves to `next` unless we're already past it.
    pub fn advance(self, next: MessageStatus) -> MessageStatus {
        self.max(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const SEVEN: MessageId = MessageId(7);

    #[test]
    fn test_new_is_idle() {
        let state = TurnState::new();
        assert_eq!(state.phase(), TurnPhase::Idle);
        assert_eq!(state.plan_submit(), SubmitPlan::Request);
    }

    #[test]
    fn test_request_sent_enters_waiting() {
        let mut state = TurnState::new();
        state.request_sent(SEVEN);
        assert_eq!(state.phase(), TurnPhase::Waiting(SEVEN));
        assert_eq!(state.awaiting_response_to(), Some(SEVEN));
    }

    #[test]
    fn test_plan_submit_while_waiting_rejects() {
        let mut state = TurnState::new();
        state.request_sent(SEVEN);
        assert_eq!(state.plan_submit(), SubmitPlan::Reject { awaiting: SEVEN });
    }

    #[test]
    fn test_accept_request_while_idle_enters_owing() {
        let mut state = TurnState::new();
        assert_eq!(state.accept_request(SEVEN), RequestVerdict::Accepted);
        assert_eq!(state.phase(), TurnPhase::Owing(SEVEN));
        assert_eq!(state.plan_submit(), SubmitPlan::Respond(SEVEN));
    }

    #[test]
    fn test_response_sent_returns_to_idle() {
        let mut state = TurnState::new();
        state.accept_request(SEVEN);
        state.response_sent();
        assert_eq!(state.phase(), TurnPhase::Idle);
    }

    #[test]
    fn test_accept_request_while_owing_is_dropped() {
        let mut state = TurnState::new();
        state.accept_request(SEVEN);
        assert_eq!(
            state.accept_request(MessageId(8)),
            RequestVerdict::DroppedOwing { pending: SEVEN }
        );
        assert_eq!(state.phase(), TurnPhase::Owing(SEVEN));
    }

    #[test]
    fn test_accept_request_while_waiting_is_dropped() {
        let mut state = TurnState::new();
        state.request_sent(SEVEN);
        assert_eq!(
            state.accept_request(MessageId(3)),
            RequestVerdict::DroppedWaiting { awaiting: SEVEN }
        );
        assert_eq!(state.must_respond_to(), None);
    }

    #[test]
    fn test_accept_matching_response_returns_to_idle() {
        let mut state = TurnState::new();
        state.request_sent(SEVEN);
        assert_eq!(state.accept_response(SEVEN), ResponseVerdict::Expected);
        assert_eq!(state.phase(), TurnPhase::Idle);
    }

    #[test]
    fn test_accept_other_response_is_unexpected_and_keeps_state() {
        let mut state = TurnState::new();
        state.request_sent(SEVEN);
        assert_eq!(
            state.accept_response(MessageId(6)),
            ResponseVerdict::Unexpected {
                awaiting: Some(SEVEN)
            }
        );
        assert_eq!(state.phase(), TurnPhase::Waiting(SEVEN));
    }

    #[test]
    fn test_accept_response_while_idle_is_unexpected() {
        let mut state = TurnState::new();
        assert_eq!(
            state.accept_response(SEVEN),
            ResponseVerdict::Unexpected { awaiting: None }
        );
    }

    #[test]
    fn test_turn_phase_display() {
        assert_eq!(TurnPhase::Owing(SEVEN).to_string(), "owing a response to #7");
    }

    #[test]
    fn test_message_status_never_moves_backwards() {
        assert_eq!(
            MessageStatus::Sent.advance(MessageStatus::Delivered),
            MessageStatus::Delivered
        );
        assert_eq!(
            MessageStatus::Read.advance(MessageStatus::Delivered),
            MessageStatus::Read
        );
    }

    /// Drives the state with random local submits and inbound messages
    /// and checks the mutual-exclusion invariant after every step.
    #[test]
    fn test_random_event_sequences_never_set_both_fields() {
        let mut rng = rand::rng();

        for _ in 0..200 {
            let mut state = TurnState::new();
            let mut next_local = 1u32;

            for _ in 0..100 {
                match rng.random_range(0..3) {
                    0 => match state.plan_submit() {
                        SubmitPlan::Request => {
                            state.request_sent(MessageId(next_local));
                            next_local += 1;
                        }
                        SubmitPlan::Respond(_) => state.response_sent(),
                        SubmitPlan::Reject { .. } => {}
                    },
                    1 => {
                        state.accept_request(MessageId(rng.random_range(1000..1010)));
                    }
                    _ => {
                        // Half the time answer what we're waiting for.
                        let id = match state.awaiting_response_to() {
                            Some(id) if rng.random_bool(0.5) => id,
                            _ => MessageId(rng.random_range(0..next_local + 1)),
                        };
                        state.accept_response(id);
                    }
                }

                assert!(
                    state.awaiting_response_to().is_none() || state.must_respond_to().is_none(),
                    "both correlation fields set: {state:?}"
                );
            }
        }
    }
}
