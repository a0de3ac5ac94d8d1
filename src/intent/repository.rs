use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::intent::model::{IntentStatus, PurchaseIntent};
use crate::intent::types::EventStats;

/// Narrow persistence interface for purchase intents (§9): the core only
/// ever needs insert, claim, a generic conditional status transition, and
/// a handful of read projections. Everything else is a convenience built
/// on top of these.
#[async_trait]
pub trait IntentRepository: Send + Sync {
    /// Inserts a new WAITING intent with the given arrival ordinal.
    async fn insert(
        &self,
        event_id: Uuid,
        session_id: &str,
        quantity: i64,
        arrival: i64,
    ) -> Result<PurchaseIntent>;

    /// The one non-terminal intent for `(session_id, event_id)`, if any
    /// (§3 invariant; used by Intake's idempotent admission, §4.1).
    async fn find_existing_active(
        &self,
        session_id: &str,
        event_id: Uuid,
    ) -> Result<Option<PurchaseIntent>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PurchaseIntent>>;

    /// Atomic conditional transition WAITING -> PROCESSING, keyed on
    /// `(id, status = WAITING)` (§4.3 step 1, §4.4). Returns whether this
    /// call won the claim.
    async fn claim(&self, id: Uuid) -> Result<bool>;

    /// Generic conditional status transition. When `from` is `Some`, the
    /// row is only updated if its current status matches; when `from` is
    /// `None`, the update applies unconditionally as long as the intent
    /// is not already terminal (used for best-effort recovery from an
    /// unexpected internal error, §4.3 step 5). Returns whether the
    /// transition applied.
    async fn set_status(
        &self,
        id: Uuid,
        from: Option<IntentStatus>,
        to: IntentStatus,
        reason: Option<&str>,
    ) -> Result<bool>;

    /// Up to `limit` WAITING intents for `event_id`, in strict
    /// `arrival ASC, id ASC` order (§4.3 step 2).
    async fn next_waiting_for_event(&self, event_id: Uuid, limit: i64) -> Result<Vec<PurchaseIntent>>;

    /// Distinct event ids with at least one WAITING intent (§4.3 step 1).
    /// Must be a superset of events with pending work; need not be exact.
    async fn events_with_waiting(&self) -> Result<Vec<Uuid>>;

    /// Bulk WAITING -> EXPIRED for every intent whose `arrival` predates
    /// `cutoff` (§4.3 Expiry sweeper). `cutoff` is in the same
    /// microsecond-resolution domain as `arrival`, not wall-clock
    /// milliseconds. Returns the number expired.
    async fn expire_older_than(&self, cutoff: i64) -> Result<u64>;

    /// Startup crash recovery (§4.3 Failure semantics): PROCESSING ->
    /// FAILED for every intent whose `updated_at` predates `cutoff_ms`.
    /// Returns the number reconciled.
    async fn reconcile_stale_processing(&self, cutoff_ms: i64) -> Result<u64>;

    /// Count of WAITING/PROCESSING intents for the same event that
    /// arrived strictly before `arrival` (§4.6 Position).
    async fn count_ahead(&self, event_id: Uuid, arrival: i64) -> Result<i64>;

    async fn stats_by_event(&self, event_id: Uuid) -> Result<EventStats>;
}
