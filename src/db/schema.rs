use sqlx::AnyPool;

/// Creates the three tables named in §6 plus their indexes, if absent.
///
/// Timestamps are stored as epoch milliseconds (`BIGINT`) rather than a
/// native timestamp type, since the `Any` driver's timestamp handling
/// varies across backends; `chrono` conversions happen at the repository
/// boundary.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS events (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  starts_at BIGINT NOT NULL,
  total_tickets BIGINT NOT NULL CHECK (total_tickets >= 0),
  available_tickets BIGINT NOT NULL CHECK (available_tickets >= 0 AND available_tickets <= total_tickets),
  version BIGINT NOT NULL,
  created_at BIGINT NOT NULL,
  updated_at BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS tickets (
  id TEXT PRIMARY KEY,
  event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
  purchase_id TEXT NOT NULL,
  issued_at BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS purchase_intents (
  id TEXT PRIMARY KEY,
  event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
  session_id TEXT NOT NULL,
  quantity BIGINT NOT NULL CHECK (quantity > 0 AND quantity <= 100),
  arrival BIGINT NOT NULL,
  status TEXT NOT NULL,
  failure_reason TEXT NOT NULL DEFAULT '',
  created_at BIGINT NOT NULL,
  updated_at BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_tickets_event ON tickets(event_id);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_tickets_purchase ON tickets(purchase_id);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_tickets_issued ON tickets(issued_at);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_intents_event_arrival ON purchase_intents(event_id, arrival);"#,
    )
    .execute(pool)
    .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_intents_status ON purchase_intents(status);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_intents_session ON purchase_intents(session_id);"#)
        .execute(pool)
        .await?;
    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_intents_session_event ON purchase_intents(session_id, event_id);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
