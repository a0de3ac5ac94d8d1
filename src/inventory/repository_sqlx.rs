use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{AnyPool, Row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::AllocationOutcome;
use crate::inventory::model::Event;
use crate::inventory::repository::InventoryRepository;
use crate::logger::warn_if_slow;

/// sqlx-backed implementation of [`InventoryRepository`] (§4.2, §4.7).
pub struct SqlxInventoryRepository {
    pool: AnyPool,
}

impl SqlxInventoryRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryRepository for SqlxInventoryRepository {
    #[instrument(skip(self), target = "inventory", fields(name = %name, total_tickets))]
    async fn create_event(
        &self,
        name: &str,
        starts_at: DateTime<Utc>,
        total_tickets: i64,
    ) -> anyhow::Result<Event> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
INSERT INTO events(id, name, starts_at, total_tickets, available_tickets, version, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, 1, ?, ?);
"#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(starts_at.timestamp_millis())
        .bind(total_tickets)
        .bind(total_tickets)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("failed to insert event")?;

        Ok(Event {
            id,
            name: name.to_string(),
            starts_at,
            total_tickets,
            available_tickets: total_tickets,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self), target = "inventory", fields(event_id = %id))]
    async fn get_event(&self, id: Uuid) -> anyhow::Result<Option<Event>> {
        let row = sqlx::query(
            r#"
SELECT id, name, starts_at, total_tickets, available_tickets, version, created_at, updated_at
FROM events WHERE id = ?;
"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch event")?;

        row.as_ref().map(row_to_event).transpose()
    }

    /// The Allocator (§4.2): row lock, re-read, the two abort checks, the
    /// version-guarded decrement, and the bulk ticket insert — one
    /// transaction, rolled back on any early-return path.
    #[instrument(
        skip(self),
        target = "inventory",
        fields(event_id = %event_id, purchase_id = %purchase_id, quantity)
    )]
    async fn allocate(
        &self,
        event_id: Uuid,
        purchase_id: Uuid,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<AllocationOutcome> {
        let mut tx = self.pool.begin().await.context("failed to open transaction")?;

        // Step 1 + 2: row-level exclusive lock, re-read available/version.
        let row = warn_if_slow(
            "allocator_select_for_update",
            Duration::from_millis(500),
            sqlx::query(
                r#"SELECT available_tickets, version, starts_at FROM events WHERE id = ? FOR UPDATE;"#,
            )
            .bind(event_id.to_string())
            .fetch_optional(&mut *tx),
        )
        .await
        .context("failed to lock event row")?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            return Ok(AllocationOutcome::Internal(format!(
                "event not found during allocation: {event_id}"
            )));
        };

        let available: i64 = row.get(0);
        let version: i64 = row.get(1);
        let starts_at_ms: i64 = row.get(2);

        // Step 3: insufficient inventory.
        if available < quantity {
            tx.rollback().await.ok();
            debug!(available, quantity, "allocator: insufficient inventory");
            return Ok(AllocationOutcome::Insufficient);
        }

        // Step 4: event already started.
        let starts_at = Utc
            .timestamp_millis_opt(starts_at_ms)
            .single()
            .ok_or_else(|| anyhow!("invalid starts_at timestamp: {starts_at_ms}"))?;
        if starts_at <= now {
            tx.rollback().await.ok();
            debug!("allocator: event already started");
            return Ok(AllocationOutcome::EventPast);
        }

        // Step 5: version-guarded conditional decrement.
        let now_ms = now.timestamp_millis();
        let update = sqlx::query(
            r#"
UPDATE events
SET available_tickets = available_tickets - ?, version = version + 1, updated_at = ?
WHERE id = ? AND version = ?;
"#,
        )
        .bind(quantity)
        .bind(now_ms)
        .bind(event_id.to_string())
        .bind(version)
        .execute(&mut *tx)
        .await
        .context("failed to apply conditional decrement")?;

        if update.rows_affected() != 1 {
            tx.rollback().await.ok();
            warn!(event_id = %event_id, "allocator: version guard lost the race");
            return Ok(AllocationOutcome::Conflict);
        }

        // Step 6: insert exactly `quantity` ticket rows.
        let mut ticket_ids = Vec::with_capacity(quantity.max(0) as usize);
        for _ in 0..quantity {
            let ticket_id = Uuid::new_v4();
            sqlx::query(
                r#"INSERT INTO tickets(id, event_id, purchase_id, issued_at) VALUES (?, ?, ?, ?);"#,
            )
            .bind(ticket_id.to_string())
            .bind(event_id.to_string())
            .bind(purchase_id.to_string())
            .bind(now_ms)
            .execute(&mut *tx)
            .await
            .context("failed to insert ticket row")?;

            ticket_ids.push(ticket_id);
        }

        // Step 7: commit.
        tx.commit().await.context("failed to commit allocation")?;

        Ok(AllocationOutcome::Success { ticket_ids })
    }

    async fn tickets_for_purchase(&self, purchase_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        let rows = sqlx::query(r#"SELECT id FROM tickets WHERE purchase_id = ?;"#)
            .bind(purchase_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch tickets for purchase")?;

        let mut ids = Vec::with_capacity(rows.len());
        for r in rows {
            let s: String = r.get(0);
            ids.push(Uuid::parse_str(&s).context("invalid ticket id in storage")?);
        }
        Ok(ids)
    }
}

fn row_to_event(r: &sqlx::any::AnyRow) -> anyhow::Result<Event> {
    let id_str: String = r.get("id");
    let id = Uuid::parse_str(&id_str).context("invalid event id")?;

    let starts_at_ms: i64 = r.get("starts_at");
    let created_ms: i64 = r.get("created_at");
    let updated_ms: i64 = r.get("updated_at");

    Ok(Event {
        id,
        name: r.get("name"),
        starts_at: ms_to_datetime(starts_at_ms)?,
        total_tickets: r.get("total_tickets"),
        available_tickets: r.get("available_tickets"),
        version: r.get("version"),
        created_at: ms_to_datetime(created_ms)?,
        updated_at: ms_to_datetime(updated_ms)?,
    })
}

fn ms_to_datetime(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("invalid millisecond timestamp: {ms}"))
}
