use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::AllocationOutcome;
use crate::inventory::repository::InventoryRepository;

/// Invokes the Allocator (§4.2) under the hard per-attempt time budget
/// `per_intent_timeout` named in §4.3 step 3. The repository performs the
/// actual row lock / decrement / insert transaction; this function's only
/// job is turning "the transaction didn't finish in time" into the typed
/// `Timeout` outcome instead of leaving a dangling future.
///
/// A timed-out attempt does not cancel the underlying transaction handle
/// synchronously; the database itself will observe the client disconnect
/// and roll the transaction back, same as any other dropped connection.
pub async fn allocate_with_timeout(
    repo: &Arc<dyn InventoryRepository>,
    event_id: Uuid,
    purchase_id: Uuid,
    quantity: i64,
    now: DateTime<Utc>,
    timeout: Duration,
) -> AllocationOutcome {
    match tokio::time::timeout(timeout, repo.allocate(event_id, purchase_id, quantity, now)).await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(error = ?e, %event_id, %purchase_id, "allocator attempt raised an error");
            AllocationOutcome::Internal(e.to_string())
        }
        Err(_elapsed) => {
            warn!(%event_id, %purchase_id, timeout_ms = %timeout.as_millis(), "allocator attempt exceeded per-intent timeout");
            AllocationOutcome::Timeout
        }
    }
}
