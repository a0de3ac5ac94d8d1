use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{AnyPool, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::intent::model::{IntentStatus, PurchaseIntent};
use crate::intent::repository::IntentRepository;
use crate::intent::types::EventStats;
use crate::time::now_ms;

/// sqlx-backed implementation of [`IntentRepository`].
pub struct SqlxIntentRepository {
    pool: AnyPool,
}

impl SqlxIntentRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntentRepository for SqlxIntentRepository {
    #[instrument(skip(self), target = "intent_store", fields(event_id = %event_id, quantity, arrival))]
    async fn insert(
        &self,
        event_id: Uuid,
        session_id: &str,
        quantity: i64,
        arrival: i64,
    ) -> anyhow::Result<PurchaseIntent> {
        let id = Uuid::new_v4();
        let now = now_ms();

        sqlx::query(
            r#"
INSERT INTO purchase_intents
  (id, event_id, session_id, quantity, arrival, status, failure_reason, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, 'WAITING', '', ?, ?);
"#,
        )
        .bind(id.to_string())
        .bind(event_id.to_string())
        .bind(session_id)
        .bind(quantity)
        .bind(arrival)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to insert purchase intent")?;

        Ok(PurchaseIntent {
            id,
            event_id,
            session_id: session_id.to_string(),
            quantity,
            arrival,
            status: IntentStatus::Waiting,
            failure_reason: None,
            created_at: ms_to_datetime(now)?,
            updated_at: ms_to_datetime(now)?,
        })
    }

    async fn find_existing_active(
        &self,
        session_id: &str,
        event_id: Uuid,
    ) -> anyhow::Result<Option<PurchaseIntent>> {
        let row = sqlx::query(
            r#"
SELECT id, event_id, session_id, quantity, arrival, status, failure_reason, created_at, updated_at
FROM purchase_intents
WHERE session_id = ? AND event_id = ? AND status IN ('WAITING', 'PROCESSING')
LIMIT 1;
"#,
        )
        .bind(session_id)
        .bind(event_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("failed to query existing active intent")?;

        row.as_ref().map(row_to_intent).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<PurchaseIntent>> {
        let row = sqlx::query(
            r#"
SELECT id, event_id, session_id, quantity, arrival, status, failure_reason, created_at, updated_at
FROM purchase_intents WHERE id = ?;
"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch intent by id")?;

        row.as_ref().map(row_to_intent).transpose()
    }

    #[instrument(skip(self), target = "intent_store", fields(intent_id = %id))]
    async fn claim(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
UPDATE purchase_intents
SET status = 'PROCESSING', updated_at = ?
WHERE id = ? AND status = 'WAITING';
"#,
        )
        .bind(now_ms())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("failed to claim intent")?;

        Ok(res.rows_affected() == 1)
    }

    #[instrument(skip(self), target = "intent_store", fields(intent_id = %id, to = to.as_str()))]
    async fn set_status(
        &self,
        id: Uuid,
        from: Option<IntentStatus>,
        to: IntentStatus,
        reason: Option<&str>,
    ) -> anyhow::Result<bool> {
        let reason = reason.unwrap_or("");
        let res = match from {
            Some(from) => {
                sqlx::query(
                    r#"
UPDATE purchase_intents
SET status = ?, failure_reason = ?, updated_at = ?
WHERE id = ? AND status = ?;
"#,
                )
                .bind(to.as_str())
                .bind(reason)
                .bind(now_ms())
                .bind(id.to_string())
                .bind(from.as_str())
                .execute(&self.pool)
                .await
                .context("failed to apply conditional status transition")?
            }
            None => {
                sqlx::query(
                    r#"
UPDATE purchase_intents
SET status = ?, failure_reason = ?, updated_at = ?
WHERE id = ? AND status NOT IN ('COMPLETED', 'FAILED', 'EXPIRED');
"#,
                )
                .bind(to.as_str())
                .bind(reason)
                .bind(now_ms())
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .context("failed to apply unconditional status transition")?
            }
        };

        Ok(res.rows_affected() == 1)
    }

    async fn next_waiting_for_event(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<PurchaseIntent>> {
        let rows = sqlx::query(
            r#"
SELECT id, event_id, session_id, quantity, arrival, status, failure_reason, created_at, updated_at
FROM purchase_intents
WHERE event_id = ? AND status = 'WAITING'
ORDER BY arrival ASC, id ASC
LIMIT ?;
"#,
        )
        .bind(event_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch next waiting batch")?;

        rows.iter().map(row_to_intent).collect()
    }

    async fn events_with_waiting(&self) -> anyhow::Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"SELECT DISTINCT event_id FROM purchase_intents WHERE status = 'WAITING';"#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to discover events with waiting intents")?;

        let mut ids = Vec::with_capacity(rows.len());
        for r in rows {
            let s: String = r.get(0);
            ids.push(Uuid::parse_str(&s).context("invalid event id in storage")?);
        }
        Ok(ids)
    }

    async fn expire_older_than(&self, cutoff: i64) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
UPDATE purchase_intents
SET status = 'EXPIRED', failure_reason = 'expired', updated_at = ?
WHERE status = 'WAITING' AND arrival < ?;
"#,
        )
        .bind(now_ms())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("failed to sweep expired intents")?;

        Ok(res.rows_affected())
    }

    async fn reconcile_stale_processing(&self, cutoff_ms: i64) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
UPDATE purchase_intents
SET status = 'FAILED', failure_reason = 'stale_processing_on_restart', updated_at = ?
WHERE status = 'PROCESSING' AND updated_at < ?;
"#,
        )
        .bind(now_ms())
        .bind(cutoff_ms)
        .execute(&self.pool)
        .await
        .context("failed to reconcile stale processing intents")?;

        Ok(res.rows_affected())
    }

    async fn count_ahead(&self, event_id: Uuid, arrival: i64) -> anyhow::Result<i64> {
        let row = sqlx::query(
            r#"
SELECT COUNT(*) FROM purchase_intents
WHERE event_id = ? AND status IN ('WAITING', 'PROCESSING') AND arrival < ?;
"#,
        )
        .bind(event_id.to_string())
        .bind(arrival)
        .fetch_one(&self.pool)
        .await
        .context("failed to count intents ahead")?;

        Ok(row.get::<i64, _>(0))
    }

    async fn stats_by_event(&self, event_id: Uuid) -> anyhow::Result<EventStats> {
        let rows = sqlx::query(
            r#"
SELECT status, COUNT(*) FROM purchase_intents WHERE event_id = ? GROUP BY status;
"#,
        )
        .bind(event_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("failed to aggregate intent stats")?;

        let mut stats = EventStats::default();
        for r in rows {
            let status: String = r.get(0);
            let count: i64 = r.get(1);
            match status.as_str() {
                "WAITING" => stats.waiting = count,
                "PROCESSING" => stats.processing = count,
                "COMPLETED" => stats.completed = count,
                "FAILED" => stats.failed = count,
                "EXPIRED" => stats.expired = count,
                other => return Err(anyhow!("unexpected intent status in storage: {other}")),
            }
        }
        Ok(stats)
    }
}

fn row_to_intent(r: &sqlx::any::AnyRow) -> anyhow::Result<PurchaseIntent> {
    let id_str: String = r.get("id");
    let id = Uuid::parse_str(&id_str).context("invalid intent id")?;

    let event_id_str: String = r.get("event_id");
    let event_id = Uuid::parse_str(&event_id_str).context("invalid event_id")?;

    let status_str: String = r.get("status");
    let status = IntentStatus::from_str(&status_str)?;

    let reason: String = r.get("failure_reason");

    let created_ms: i64 = r.get("created_at");
    let updated_ms: i64 = r.get("updated_at");

    Ok(PurchaseIntent {
        id,
        event_id,
        session_id: r.get("session_id"),
        quantity: r.get("quantity"),
        arrival: r.get("arrival"),
        status,
        failure_reason: if reason.is_empty() { None } else { Some(reason) },
        created_at: ms_to_datetime(created_ms)?,
        updated_at: ms_to_datetime(updated_ms)?,
    })
}

fn ms_to_datetime(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("invalid millisecond timestamp: {ms}"))
}
