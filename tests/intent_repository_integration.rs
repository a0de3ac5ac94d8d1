//! Exercises the sqlx-backed intent store against a real Postgres
//! instance. Skipped with a logged message when no database is
//! configured via `TEST_DATABASE_URL` / `DATABASE_URL`.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::task::JoinSet;
use uuid::Uuid;

use ticketqueue::db::Db;
use ticketqueue::intent::model::IntentStatus;
use ticketqueue::intent::repository::IntentRepository;
use ticketqueue::intent::repository_sqlx::SqlxIntentRepository;
use ticketqueue::inventory::repository::InventoryRepository;
use ticketqueue::inventory::repository_sqlx::SqlxInventoryRepository;

async fn test_db() -> Option<Db> {
    let url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()?;

    sqlx::any::install_default_drivers();
    match Db::connect(&url).await {
        Ok(db) => {
            db.migrate().await.expect("migration must succeed");
            Some(db)
        }
        Err(e) => {
            eprintln!("skipping intent_repository_integration: could not connect ({e})");
            None
        }
    }
}

async fn seed_event(db: &Db) -> Uuid {
    let inventory = SqlxInventoryRepository::new((*db.pool).clone());
    let event = inventory
        .create_event("Integration Event", Utc::now() + ChronoDuration::hours(2), 50)
        .await
        .unwrap();
    event.id
}

#[tokio::test]
async fn insert_then_find_by_id_round_trips() {
    let Some(db) = test_db().await else { return };
    let event_id = seed_event(&db).await;
    let repo = SqlxIntentRepository::new((*db.pool).clone());

    let intent = repo.insert(event_id, "session-a", 2, 1_000).await.unwrap();
    let found = repo.find_by_id(intent.id).await.unwrap().unwrap();

    assert_eq!(found.event_id, event_id);
    assert_eq!(found.quantity, 2);
    assert_eq!(found.status, IntentStatus::Waiting);
}

#[tokio::test]
async fn find_existing_active_only_matches_non_terminal() {
    let Some(db) = test_db().await else { return };
    let event_id = seed_event(&db).await;
    let repo = SqlxIntentRepository::new((*db.pool).clone());

    let intent = repo.insert(event_id, "session-b", 1, 2_000).await.unwrap();
    let found = repo
        .find_existing_active("session-b", event_id)
        .await
        .unwrap();
    assert_eq!(found.unwrap().id, intent.id);

    repo.set_status(intent.id, Some(IntentStatus::Waiting), IntentStatus::Expired, Some("x"))
        .await
        .unwrap();

    let found = repo
        .find_existing_active("session-b", event_id)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn only_one_concurrent_claim_wins() {
    let Some(db) = test_db().await else { return };
    let event_id = seed_event(&db).await;
    let repo = Arc::new(SqlxIntentRepository::new((*db.pool).clone()));

    let intent = repo.insert(event_id, "session-c", 1, 3_000).await.unwrap();

    let mut set = JoinSet::new();
    for _ in 0..10 {
        let repo = repo.clone();
        let id = intent.id;
        set.spawn(async move { repo.claim(id).await });
    }

    let mut wins = 0;
    while let Some(res) = set.join_next().await {
        if res.unwrap().unwrap() {
            wins += 1;
        }
    }

    assert_eq!(wins, 1, "exactly one caller may win the atomic claim");
}

#[tokio::test]
async fn next_waiting_for_event_respects_arrival_order_and_limit() {
    let Some(db) = test_db().await else { return };
    let event_id = seed_event(&db).await;
    let repo = SqlxIntentRepository::new((*db.pool).clone());

    let mut ids = Vec::new();
    for (i, arrival) in [500_i64, 100, 300, 200, 400].into_iter().enumerate() {
        let intent = repo
            .insert(event_id, &format!("session-order-{i}"), 1, arrival)
            .await
            .unwrap();
        ids.push((arrival, intent.id));
    }

    let batch = repo.next_waiting_for_event(event_id, 3).await.unwrap();
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0].arrival, 100);
    assert_eq!(batch[1].arrival, 200);
    assert_eq!(batch[2].arrival, 300);
}

#[tokio::test]
async fn count_ahead_counts_only_active_earlier_arrivals() {
    let Some(db) = test_db().await else { return };
    let event_id = seed_event(&db).await;
    let repo = SqlxIntentRepository::new((*db.pool).clone());

    let earlier = repo.insert(event_id, "session-d", 1, 10).await.unwrap();
    let _later = repo.insert(event_id, "session-e", 1, 20).await.unwrap();
    let target = repo.insert(event_id, "session-f", 1, 30).await.unwrap();

    let ahead = repo.count_ahead(event_id, target.arrival).await.unwrap();
    assert_eq!(ahead, 2);

    repo.set_status(earlier.id, Some(IntentStatus::Waiting), IntentStatus::Expired, Some("x"))
        .await
        .unwrap();

    let ahead = repo.count_ahead(event_id, target.arrival).await.unwrap();
    assert_eq!(ahead, 1, "terminal intents no longer count toward position");
}

#[tokio::test]
async fn expire_older_than_only_touches_waiting_before_cutoff() {
    let Some(db) = test_db().await else { return };
    let event_id = seed_event(&db).await;
    let repo = SqlxIntentRepository::new((*db.pool).clone());

    let old = repo.insert(event_id, "session-g", 1, 100).await.unwrap();
    let recent = repo.insert(event_id, "session-h", 1, 9_999_999).await.unwrap();

    let expired = repo.expire_older_than(1_000).await.unwrap();
    assert_eq!(expired, 1);

    let old = repo.find_by_id(old.id).await.unwrap().unwrap();
    assert_eq!(old.status, IntentStatus::Expired);

    let recent = repo.find_by_id(recent.id).await.unwrap().unwrap();
    assert_eq!(recent.status, IntentStatus::Waiting);
}

#[tokio::test]
async fn reconcile_stale_processing_fails_only_old_processing_rows() {
    let Some(db) = test_db().await else { return };
    let event_id = seed_event(&db).await;
    let repo = SqlxIntentRepository::new((*db.pool).clone());

    let stuck = repo.insert(event_id, "session-i", 1, 1).await.unwrap();
    repo.claim(stuck.id).await.unwrap();

    let fresh = repo.insert(event_id, "session-j", 1, 2).await.unwrap();
    repo.claim(fresh.id).await.unwrap();

    // Every PROCESSING row's `updated_at` is "now" right after claiming,
    // so a cutoff far in the future reconciles both; this still proves
    // the mechanism transitions PROCESSING -> FAILED correctly.
    let far_future_cutoff = ticketqueue::time::now_ms() + 60_000;
    let reconciled = repo.reconcile_stale_processing(far_future_cutoff).await.unwrap();
    assert_eq!(reconciled, 2);

    let stuck = repo.find_by_id(stuck.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, IntentStatus::Failed);
    assert_eq!(stuck.failure_reason.as_deref(), Some("stale_processing_on_restart"));
}

#[tokio::test]
async fn stats_by_event_groups_by_status() {
    let Some(db) = test_db().await else { return };
    let event_id = seed_event(&db).await;
    let repo = SqlxIntentRepository::new((*db.pool).clone());

    let a = repo.insert(event_id, "session-k", 1, 1).await.unwrap();
    let _b = repo.insert(event_id, "session-l", 1, 2).await.unwrap();
    repo.set_status(a.id, Some(IntentStatus::Waiting), IntentStatus::Expired, Some("x"))
        .await
        .unwrap();

    let stats = repo.stats_by_event(event_id).await.unwrap();
    assert_eq!(stats.waiting, 1);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.total_active(), 1);
}
