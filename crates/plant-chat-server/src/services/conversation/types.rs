use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::models::chat::Usage;

/// Stages of a single chat turn.
///
/// ```text
/// Received -> Embedding -> Retrieving -> Assembling -> Completing -> Persisting -> Responded
///     \            \                                       /
///      +------------+-------------> Errored <-------------+
/// ```
///
/// A retrieval failure is not a transition to `Errored`: the turn moves on to
/// `Assembling` with no chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Received,
    Embedding,
    Retrieving,
    Assembling,
    Completing,
    Persisting,
    Responded,
    Errored,
}

impl TurnStage {
    pub fn can_transition_to(self, next: TurnStage) -> bool {
        use TurnStage::*;
        matches!(
            (self, next),
            (Received, Embedding)
                | (Embedding, Retrieving)
                | (Retrieving, Assembling)
                | (Assembling, Completing)
                | (Completing, Persisting)
                | (Persisting, Responded)
                | (Received, Errored)
                | (Embedding, Errored)
                | (Completing, Errored)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TurnStage::Responded | TurnStage::Errored)
    }

    /// Caller-facing text for a failure raised while in this stage.
    pub fn failure_message(self) -> &'static str {
        match self {
            TurnStage::Received => "Invalid chat request",
            TurnStage::Embedding => "Failed to process your message",
            TurnStage::Completing => "Failed to generate a response",
            _ => "Chat request failed",
        }
    }
}

/// Tracks the current stage of one turn and logs every transition.
#[derive(Debug)]
pub struct TurnTracker {
    request_id: String,
    stage: TurnStage,
    started: Instant,
}

impl TurnTracker {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            stage: TurnStage::Received,
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> TurnStage {
        self.stage
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn advance(&mut self, next: TurnStage) {
        if !self.stage.can_transition_to(next) {
            warn!(
                request_id = %self.request_id,
                "Unexpected turn transition {:?} -> {:?}", self.stage, next
            );
        }
        debug!(request_id = %self.request_id, from = ?self.stage, to = ?next, "turn stage");
        self.stage = next;

        if next.is_terminal() {
            info!(
                request_id = %self.request_id,
                outcome = ?next,
                "Chat turn finished in {}ms",
                self.started.elapsed().as_millis()
            );
        }
    }
}

/// Result of a chat completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            TurnStage::Received,
            TurnStage::Embedding,
            TurnStage::Retrieving,
            TurnStage::Assembling,
            TurnStage::Completing,
            TurnStage::Persisting,
            TurnStage::Responded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_only_fatal_stages_error() {
        assert!(TurnStage::Received.can_transition_to(TurnStage::Errored));
        assert!(TurnStage::Embedding.can_transition_to(TurnStage::Errored));
        assert!(TurnStage::Completing.can_transition_to(TurnStage::Errored));
        assert!(!TurnStage::Retrieving.can_transition_to(TurnStage::Errored));
        assert!(!TurnStage::Persisting.can_transition_to(TurnStage::Errored));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TurnStage::Responded.is_terminal());
        assert!(TurnStage::Errored.is_terminal());
        assert!(!TurnStage::Persisting.is_terminal());
        assert!(!TurnStage::Responded.can_transition_to(TurnStage::Embedding));
    }

    #[test]
    fn test_tracker_follows_advances() {
        let mut tracker = TurnTracker::new("req-1");
        assert_eq!(tracker.stage(), TurnStage::Received);
        tracker.advance(TurnStage::Embedding);
        tracker.advance(TurnStage::Errored);
        assert_eq!(tracker.stage(), TurnStage::Errored);
        assert_eq!(tracker.request_id(), "req-1");
    }
}
