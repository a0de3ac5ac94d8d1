use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::CancellationError;
use crate::intent::model::IntentStatus;
use crate::intent::repository::IntentRepository;
use crate::logger::annotate_intent_span;

/// Cancellation (§4.5): session-scoped, conditional WAITING -> EXPIRED
/// transition. There is no administrator override in the core.
pub struct Cancellation {
    intents: Arc<dyn IntentRepository>,
}

impl Cancellation {
    pub fn new(intents: Arc<dyn IntentRepository>) -> Self {
        Self { intents }
    }

    #[instrument(skip(self), target = "cancellation", fields(intent_id = %intent_id))]
    pub async fn cancel(
        &self,
        intent_id: Uuid,
        session_id: &str,
    ) -> Result<(), CancellationError> {
        annotate_intent_span(&intent_id);

        let intent = self
            .intents
            .find_by_id(intent_id)
            .await
            .map_err(CancellationError::Internal)?
            .ok_or_else(|| CancellationError::NotFound(format!("intent not found: {intent_id}")))?;

        if intent.session_id != session_id {
            return Err(CancellationError::Forbidden);
        }

        if intent.status.is_terminal() {
            return Err(CancellationError::NotCancellable(
                intent.status.as_str().to_string(),
            ));
        }

        let cancelled = self
            .intents
            .set_status(
                intent_id,
                Some(IntentStatus::Waiting),
                IntentStatus::Expired,
                Some("cancelled"),
            )
            .await
            .map_err(CancellationError::Internal)?;

        if !cancelled {
            // Lost the race: the Processor already claimed it (WAITING ->
            // PROCESSING) between our read and this conditional update.
            return Err(CancellationError::NotCancellable(
                IntentStatus::Processing.as_str().to_string(),
            ));
        }

        info!(%intent_id, "intent cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    use crate::intent::model::PurchaseIntent;
    use crate::intent::types::EventStats;

    struct MockIntents {
        intent: Mutex<Option<PurchaseIntent>>,
        claim_wins: bool,
    }

    #[async_trait]
    impl IntentRepository for MockIntents {
        async fn insert(
            &self,
            _event_id: Uuid,
            _session_id: &str,
            _quantity: i64,
            _arrival: i64,
        ) -> anyhow::Result<PurchaseIntent> {
            unreachable!()
        }

        async fn find_existing_active(
            &self,
            _session_id: &str,
            _event_id: Uuid,
        ) -> anyhow::Result<Option<PurchaseIntent>> {
            unreachable!()
        }

        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<PurchaseIntent>> {
            Ok(self
                .intent
                .lock()
                .as_ref()
                .filter(|i| i.id == id)
                .cloned())
        }

        async fn claim(&self, _id: Uuid) -> anyhow::Result<bool> {
            unreachable!()
        }

        async fn set_status(
            &self,
            id: Uuid,
            from: Option<IntentStatus>,
            to: IntentStatus,
            reason: Option<&str>,
        ) -> anyhow::Result<bool> {
            if !self.claim_wins {
                return Ok(false);
            }
            let mut guard = self.intent.lock();
            if let Some(intent) = guard.as_mut().filter(|i| i.id == id) {
                let matches = match from {
                    Some(f) => f == intent.status,
                    None => true,
                };
                if matches {
                    intent.status = to;
                    intent.failure_reason = reason.map(str::to_string);
                    return Ok(true);
                }
            }
            Ok(false)
        }

        async fn next_waiting_for_event(
            &self,
            _event_id: Uuid,
            _limit: i64,
        ) -> anyhow::Result<Vec<PurchaseIntent>> {
            unreachable!()
        }

        async fn events_with_waiting(&self) -> anyhow::Result<Vec<Uuid>> {
            unreachable!()
        }

        async fn expire_older_than(&self, _cutoff_ms: i64) -> anyhow::Result<u64> {
            unreachable!()
        }

        async fn reconcile_stale_processing(&self, _cutoff_ms: i64) -> anyhow::Result<u64> {
            unreachable!()
        }

        async fn count_ahead(&self, _event_id: Uuid, _arrival: i64) -> anyhow::Result<i64> {
            unreachable!()
        }

        async fn stats_by_event(&self, _event_id: Uuid) -> anyhow::Result<EventStats> {
            unreachable!()
        }
    }

    fn mk_intent(status: IntentStatus, session_id: &str) -> PurchaseIntent {
        PurchaseIntent {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            quantity: 2,
            arrival: 1,
            status,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn not_found_when_intent_missing() {
        let repo = Arc::new(MockIntents {
            intent: Mutex::new(None),
            claim_wins: true,
        });
        let cancellation = Cancellation::new(repo);

        let err = cancellation
            .cancel(Uuid::new_v4(), "s1")
            .await
            .unwrap_err();
        assert!(matches!(err, CancellationError::NotFound(_)));
    }

    #[tokio::test]
    async fn forbidden_when_session_mismatches() {
        let intent = mk_intent(IntentStatus::Waiting, "owner");
        let id = intent.id;
        let repo = Arc::new(MockIntents {
            intent: Mutex::new(Some(intent)),
            claim_wins: true,
        });
        let cancellation = Cancellation::new(repo);

        let err = cancellation.cancel(id, "someone-else").await.unwrap_err();
        assert!(matches!(err, CancellationError::Forbidden));
    }

    #[tokio::test]
    async fn not_cancellable_when_already_terminal() {
        let intent = mk_intent(IntentStatus::Completed, "owner");
        let id = intent.id;
        let repo = Arc::new(MockIntents {
            intent: Mutex::new(Some(intent)),
            claim_wins: true,
        });
        let cancellation = Cancellation::new(repo);

        let err = cancellation.cancel(id, "owner").await.unwrap_err();
        assert!(matches!(err, CancellationError::NotCancellable(_)));
    }

    #[tokio::test]
    async fn succeeds_on_waiting_intent() {
        let intent = mk_intent(IntentStatus::Waiting, "owner");
        let id = intent.id;
        let repo = Arc::new(MockIntents {
            intent: Mutex::new(Some(intent)),
            claim_wins: true,
        });
        let cancellation = Cancellation::new(repo);

        cancellation.cancel(id, "owner").await.unwrap();
    }

    #[tokio::test]
    async fn lost_race_against_processor_claim_is_not_cancellable() {
        let intent = mk_intent(IntentStatus::Waiting, "owner");
        let id = intent.id;
        let repo = Arc::new(MockIntents {
            intent: Mutex::new(Some(intent)),
            claim_wins: false,
        });
        let cancellation = Cancellation::new(repo);

        let err = cancellation.cancel(id, "owner").await.unwrap_err();
        assert!(matches!(err, CancellationError::NotCancellable(_)));
    }
}
