use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::IntakeError;
use crate::intent::model::IntentStatus;
use crate::intent::repository::IntentRepository;
use crate::intent::types::IntentHandle;
use crate::inventory::repository::InventoryRepository;
use crate::logger::annotate_span;
use crate::time::ArrivalClock;

const MIN_QUANTITY: i64 = 1;
const MAX_QUANTITY: i64 = 10;
const MAX_SESSION_ID_LEN: usize = 255;

/// Intent Intake (§4.1): admits a new purchase request, rejecting
/// obviously invalid ones, deduplicating per `(session_id, event_id)`,
/// and stamping a monotonic arrival ordinal on acceptance.
pub struct IntentIntake {
    intents: Arc<dyn IntentRepository>,
    inventory: Arc<dyn InventoryRepository>,
    clock: Arc<ArrivalClock>,
    wait_estimate_per_intent: Duration,
}

impl IntentIntake {
    pub fn new(
        intents: Arc<dyn IntentRepository>,
        inventory: Arc<dyn InventoryRepository>,
        clock: Arc<ArrivalClock>,
        wait_estimate_per_intent: Duration,
    ) -> Self {
        Self {
            intents,
            inventory,
            clock,
            wait_estimate_per_intent,
        }
    }

    #[instrument(skip(self), target = "intake", fields(event_id = %event_id, quantity))]
    pub async fn submit(
        &self,
        event_id: Uuid,
        session_id: String,
        quantity: i64,
    ) -> Result<IntentHandle, IntakeError> {
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
            return Err(IntakeError::InvalidRequest(format!(
                "quantity must be in [{MIN_QUANTITY}, {MAX_QUANTITY}], got {quantity}"
            )));
        }
        if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
            return Err(IntakeError::InvalidRequest(
                "session_id must be 1-255 characters".into(),
            ));
        }

        let event = self
            .inventory
            .get_event(event_id)
            .await
            .map_err(IntakeError::Internal)?
            .ok_or_else(|| IntakeError::NotFound(format!("event not found: {event_id}")))?;

        let now = Utc::now();
        if event.is_past(now) {
            return Err(IntakeError::Unavailable("event has already started".into()));
        }
        if event.available_tickets == 0 {
            return Err(IntakeError::Unavailable("no tickets available".into()));
        }

        // Idempotent admission: an active intent for this (session, event)
        // already exists, return its handle rather than creating a new one.
        if let Some(existing) = self
            .intents
            .find_existing_active(&session_id, event_id)
            .await
            .map_err(IntakeError::Internal)?
        {
            annotate_span(&event_id, Some(&existing.id));
            let position = self.queue_position(&existing).await?;
            return Ok(IntentHandle {
                intent_id: existing.id,
                queue_position: position,
                estimated_wait_seconds: self.estimated_wait_seconds(position),
                status: existing.status,
            });
        }

        let arrival = self.clock.next();
        let intent = self
            .intents
            .insert(event_id, &session_id, quantity, arrival)
            .await
            .map_err(IntakeError::Internal)?;

        annotate_span(&event_id, Some(&intent.id));

        let position = self.queue_position(&intent).await?;

        info!(intent_id = %intent.id, position, "intent admitted");

        Ok(IntentHandle {
            intent_id: intent.id,
            queue_position: position,
            estimated_wait_seconds: self.estimated_wait_seconds(position),
            status: IntentStatus::Waiting,
        })
    }

    /// Queue position computed identically to the Query Surface (§4.1, §4.6).
    async fn queue_position(
        &self,
        intent: &crate::intent::model::PurchaseIntent,
    ) -> Result<i64, IntakeError> {
        let ahead = self
            .intents
            .count_ahead(intent.event_id, intent.arrival)
            .await
            .map_err(IntakeError::Internal)?;
        Ok(ahead + 1)
    }

    fn estimated_wait_seconds(&self, position: i64) -> i64 {
        (position - 1).max(0) * self.wait_estimate_per_intent.as_secs() as i64
    }
}
