use serde::Serialize;
use uuid::Uuid;

use crate::intent::model::IntentStatus;

/// Response of Intent Intake / the "Submit purchase intent" interface (§4.1, §6).
///
/// This and the other response types below are the wire-facing shapes an
/// external HTTP layer serializes straight to JSON (§1: that layer is an
/// external collaborator, but the shape of what it hands callers is this
/// core's contract); hence the `Serialize` derive even though no HTTP
/// framework lives in this crate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntentHandle {
    pub intent_id: Uuid,
    pub queue_position: i64,
    pub estimated_wait_seconds: i64,
    pub status: IntentStatus,
}

/// Response of the "Intent status" interface (§4.6 Position, §6).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionResult {
    /// Intent is WAITING or PROCESSING; `position` is 1-indexed.
    Active {
        status: IntentStatus,
        queue_position: i64,
        estimated_wait_seconds: i64,
    },
    /// Intent reached a terminal state; the outcome is reported instead
    /// of a position.
    Terminal(CompletionResult),
}

/// Response of the "Intent completion" interface (§4.6 Completion, §6).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionResult {
    NotReady,
    Completed {
        purchase_id: Uuid,
        ticket_ids: Vec<Uuid>,
    },
    Failed {
        reason: String,
    },
    Expired {
        reason: String,
    },
}

/// Response of the "Event queue stats" interface (§4.6 Stats, §6).
#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub struct EventStats {
    pub waiting: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub expired: i64,
}

impl EventStats {
    pub fn total_active(&self) -> i64 {
        self.waiting + self.processing
    }
}
