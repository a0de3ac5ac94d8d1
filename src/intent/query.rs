use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::instrument;
use uuid::Uuid;

use crate::intent::model::IntentStatus;
use crate::intent::repository::IntentRepository;
use crate::intent::types::{CompletionResult, EventStats, PositionResult};
use crate::inventory::repository::InventoryRepository;
use crate::logger::annotate_intent_span;

const WAIT_ESTIMATE_SECS_DEFAULT: i64 = 30;

/// Query Surface (§4.6): read-only projections over the Intent Store,
/// with one peek into the Inventory Store for completed ticket lists.
pub struct QuerySurface {
    intents: Arc<dyn IntentRepository>,
    inventory: Arc<dyn InventoryRepository>,
    wait_estimate_secs: i64,
}

impl QuerySurface {
    pub fn new(intents: Arc<dyn IntentRepository>, inventory: Arc<dyn InventoryRepository>) -> Self {
        Self {
            intents,
            inventory,
            wait_estimate_secs: WAIT_ESTIMATE_SECS_DEFAULT,
        }
    }

    pub fn with_wait_estimate_secs(mut self, secs: i64) -> Self {
        self.wait_estimate_secs = secs;
        self
    }

    #[instrument(skip(self), target = "query", fields(intent_id = %intent_id))]
    pub async fn position(&self, intent_id: Uuid) -> Result<Option<PositionResult>> {
        annotate_intent_span(&intent_id);

        let Some(intent) = self.intents.find_by_id(intent_id).await? else {
            return Ok(None);
        };

        if intent.status.is_terminal() {
            return Ok(Some(PositionResult::Terminal(
                self.completion_for(&intent).await?,
            )));
        }

        let ahead = self
            .intents
            .count_ahead(intent.event_id, intent.arrival)
            .await?;
        let queue_position = ahead + 1;

        Ok(Some(PositionResult::Active {
            status: intent.status,
            queue_position,
            estimated_wait_seconds: (queue_position - 1).max(0) * self.wait_estimate_secs,
        }))
    }

    #[instrument(skip(self), target = "query", fields(intent_id = %intent_id))]
    pub async fn completion(&self, intent_id: Uuid) -> Result<Option<CompletionResult>> {
        annotate_intent_span(&intent_id);

        let Some(intent) = self.intents.find_by_id(intent_id).await? else {
            return Ok(None);
        };

        if !intent.status.is_terminal() {
            return Ok(Some(CompletionResult::NotReady));
        }

        Ok(Some(self.completion_for(&intent).await?))
    }

    #[instrument(skip(self), target = "query", fields(event_id = %event_id))]
    pub async fn stats(&self, event_id: Uuid) -> Result<EventStats> {
        self.intents.stats_by_event(event_id).await
    }

    async fn completion_for(
        &self,
        intent: &crate::intent::model::PurchaseIntent,
    ) -> Result<CompletionResult> {
        match intent.status {
            IntentStatus::Completed => {
                let ticket_ids = self.inventory.tickets_for_purchase(intent.id).await?;
                Ok(CompletionResult::Completed {
                    purchase_id: intent.id,
                    ticket_ids,
                })
            }
            IntentStatus::Failed => Ok(CompletionResult::Failed {
                reason: intent
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            }),
            IntentStatus::Expired => Ok(CompletionResult::Expired {
                reason: intent
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "expired".to_string()),
            }),
            other => Err(anyhow!("completion_for called on non-terminal status {other:?}")),
        }
    }
}
