use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::AllocationOutcome;
use crate::intent::model::{IntentStatus, PurchaseIntent};
use crate::intent::repository::IntentRepository;
use crate::inventory::allocator::allocate_with_timeout;
use crate::inventory::repository::InventoryRepository;
use crate::metrics::counters::Counters;
use crate::time::now_ms;

/// The Queue Processor (§4.3): one long-lived worker per process, driven
/// by a periodic tick plus a separate expiry sweeper. Correctness comes
/// from the database-level atomic claim, not from there being only one
/// worker process; this struct is deliberately cheap to clone so a tick
/// can fan out per-event work without sharing a `&self` borrow across
/// spawned tasks.
#[derive(Clone)]
pub struct QueueProcessor {
    intents: Arc<dyn IntentRepository>,
    inventory: Arc<dyn InventoryRepository>,
    counters: Counters,
    tick_period: Duration,
    sweeper_period: Duration,
    batch_size: i64,
    intent_expiry: Duration,
    per_intent_timeout: Duration,
    max_attempts: u32,
}

impl QueueProcessor {
    pub fn new(
        intents: Arc<dyn IntentRepository>,
        inventory: Arc<dyn InventoryRepository>,
        tick_period: Duration,
        sweeper_period: Duration,
        batch_size: usize,
        intent_expiry: Duration,
        per_intent_timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            intents,
            inventory,
            counters: Counters::default(),
            tick_period,
            sweeper_period,
            batch_size: batch_size as i64,
            intent_expiry,
            per_intent_timeout,
            max_attempts,
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Startup crash recovery (§4.3 Failure semantics): any intent still
    /// PROCESSING from a prior crashed instance, whose last update
    /// predates now by at least `per_intent_timeout`, is conservatively
    /// failed. This must run once before the tick loop starts.
    #[instrument(skip(self))]
    pub async fn recover_on_startup(&self) -> anyhow::Result<u64> {
        let cutoff = now_ms() - self.per_intent_timeout.as_millis() as i64;
        let reconciled = self.intents.reconcile_stale_processing(cutoff).await?;
        if reconciled > 0 {
            warn!(
                reconciled,
                "reconciled stale PROCESSING intents left by a prior instance"
            );
        }
        Ok(reconciled)
    }

    /// Runs the periodic tick loop forever. Intended to be spawned as its
    /// own task for the lifetime of the process.
    pub async fn run_tick_loop(self) {
        self.counters.set_running(true);
        let mut interval = tokio::time::interval(self.tick_period);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = ?e, "processor tick failed");
            }
        }
    }

    /// Runs the periodic bulk expiry sweep forever, separate from the
    /// worker's own per-event draining.
    pub async fn run_sweeper_loop(self) {
        let mut interval = tokio::time::interval(self.sweeper_period);
        loop {
            interval.tick().await;
            if let Err(e) = self.sweep_expired().await {
                error!(error = ?e, "expiry sweep failed");
            }
        }
    }

    /// Runs a single tick without entering the periodic loop. Not used by
    /// the process's own lifecycle (see `run_tick_loop`); exposed for
    /// demos and tests that want to observe one draining pass
    /// deterministically instead of waiting on a timer.
    pub async fn run_once(&self) -> anyhow::Result<()> {
        self.tick().await
    }

    #[instrument(skip(self))]
    async fn tick(&self) -> anyhow::Result<()> {
        let events = self.intents.events_with_waiting().await?;
        if events.is_empty() {
            return Ok(());
        }

        // Per-event draining runs concurrently across events; the atomic
        // claim inside each event's batch is what keeps two workers from
        // double-processing the same intent, not any ordering here.
        let mut set = JoinSet::new();
        for event_id in events {
            let this = self.clone();
            set.spawn(async move { this.drain_event(event_id).await });
        }
        while let Some(res) = set.join_next().await {
            if let Err(join_err) = res {
                error!(error = ?join_err, "per-event drain task panicked");
            }
        }
        Ok(())
    }

    /// Drains one event's batch in strict `arrival ASC` order (§4.3 step
    /// 2, §5). The row lock inside the Allocator only serializes *access*
    /// to the event row; it says nothing about *order*. Running the
    /// batch's claims concurrently would let a later-arriving intent's
    /// claim-and-process race ahead of an earlier one's and win the last
    /// tickets out of arrival order, breaking the fairness invariant.
    /// Awaiting each intent before starting the next is what actually
    /// enforces "no intent COMPLETEs before every earlier-arriving intent
    /// for that event has reached a terminal state".
    async fn drain_event(&self, event_id: Uuid) {
        let batch = match self
            .intents
            .next_waiting_for_event(event_id, self.batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(%event_id, error = ?e, "failed to list waiting intents for event");
                return;
            }
        };

        for intent in batch {
            self.claim_and_process(intent).await;
        }
    }

    /// Per-intent claim-and-process (§4.4). Any error not already handled
    /// inline is treated as the "uncaught exception" case in step 5: the
    /// intent is forced into FAILED rather than left dangling in
    /// PROCESSING.
    async fn claim_and_process(&self, intent: PurchaseIntent) {
        let intent_id = intent.id;
        if let Err(e) = self.try_claim_and_process(&intent).await {
            error!(%intent_id, error = ?e, "claim-and-process hit an unexpected error; forcing FAILED");
            if let Err(e2) = self
                .intents
                .set_status(intent_id, None, IntentStatus::Failed, Some("internal_error"))
                .await
            {
                error!(%intent_id, error = ?e2, "failed to force-fail intent after internal error");
            }
        }
    }

    async fn try_claim_and_process(&self, intent: &PurchaseIntent) -> anyhow::Result<()> {
        let intent_id = intent.id;

        let claimed = self.intents.claim(intent_id).await?;
        if !claimed {
            // Another worker (or another tick, under multi-process
            // deployment) already claimed this intent.
            return Ok(());
        }

        let age = Utc::now().signed_duration_since(intent.created_at);
        let age_std = age.to_std().unwrap_or(Duration::MAX);
        if age_std > self.intent_expiry {
            self.intents
                .set_status(
                    intent_id,
                    Some(IntentStatus::Processing),
                    IntentStatus::Expired,
                    Some("expired_after_claim"),
                )
                .await?;
            return Ok(());
        }

        let start = Instant::now();
        let mut attempt = 0u32;
        let outcome = loop {
            attempt += 1;
            let outcome = allocate_with_timeout(
                &self.inventory,
                intent.event_id,
                intent_id,
                intent.quantity,
                Utc::now(),
                self.per_intent_timeout,
            )
            .await;

            if !outcome.is_retryable() || attempt >= self.max_attempts {
                break outcome;
            }

            let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
            tokio::time::sleep(backoff).await;
        };
        let elapsed = start.elapsed();

        match outcome {
            AllocationOutcome::Success { ticket_ids } => {
                self.intents
                    .set_status(
                        intent_id,
                        Some(IntentStatus::Processing),
                        IntentStatus::Completed,
                        None,
                    )
                    .await?;
                self.counters.record_success(elapsed, now_ms());
                info!(%intent_id, ticket_count = ticket_ids.len(), attempt, "intent completed");
            }
            other => {
                let reason = failure_reason(&other);
                self.intents
                    .set_status(
                        intent_id,
                        Some(IntentStatus::Processing),
                        IntentStatus::Failed,
                        Some(&reason),
                    )
                    .await?;
                self.counters.record_failure(elapsed, now_ms());
                warn!(%intent_id, reason = %reason, attempt, "intent failed");
            }
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn sweep_expired(&self) -> anyhow::Result<()> {
        let cutoff = Utc::now().timestamp_micros() - self.intent_expiry.as_micros() as i64;
        let expired = self.intents.expire_older_than(cutoff).await?;
        if expired > 0 {
            info!(expired, "swept expired WAITING intents");
        }
        Ok(())
    }
}

fn failure_reason(outcome: &AllocationOutcome) -> String {
    match outcome {
        AllocationOutcome::Success { .. } => unreachable!("Success is handled separately"),
        AllocationOutcome::Internal(msg) => format!("INTERNAL: {msg}"),
        other => other.kind().as_str().to_string(),
    }
}
