use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AllocationOutcome;
use crate::inventory::model::Event;

/// Persistence boundary for events and the Allocator (§4.2, §4.7, §9).
///
/// `allocate` is the Inventory Allocator's entire transactional algorithm:
/// row lock, re-read, the two abort checks, the version-guarded
/// conditional decrement, and the bulk ticket insert, all in one
/// transaction. It is intentionally not decomposed into the narrower
/// `get_for_update` / `conditional_decrement` / `insert_bulk` primitives
/// named in §9 at the trait boundary, since those three calls must share
/// one open transaction and `async_trait` objects cannot hand out a
/// borrowed transaction across calls; the sqlx implementation still
/// performs each step exactly as specified, in order, inside a single
/// `BEGIN .. COMMIT`.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Creates a new event (§4.7): `available_tickets = total_tickets`,
    /// `version = 1`.
    async fn create_event(
        &self,
        name: &str,
        starts_at: DateTime<Utc>,
        total_tickets: i64,
    ) -> Result<Event>;

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>>;

    /// Runs the Allocator algorithm (§4.2) for `quantity` tickets against
    /// `event_id`, tagging every issued ticket with `purchase_id`.
    async fn allocate(
        &self,
        event_id: Uuid,
        purchase_id: Uuid,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<AllocationOutcome>;

    /// Ticket count issued under a given purchase id (§4.6 Completion).
    async fn tickets_for_purchase(&self, purchase_id: Uuid) -> Result<Vec<Uuid>>;
}
