use std::sync::Arc;

use ticketqueue::{
    config::AppConfig,
    db::Db,
    intent::cancellation::Cancellation,
    intent::intake::IntentIntake,
    intent::processor::QueueProcessor,
    intent::query::QuerySurface,
    intent::repository::IntentRepository,
    intent::repository_sqlx::SqlxIntentRepository,
    inventory::repository::InventoryRepository,
    inventory::repository_sqlx::SqlxInventoryRepository,
    logger::init_tracing,
    time::ArrivalClock,
};

/// Everything a caller (an RPC/HTTP layer, a CLI, a test harness) needs to
/// drive the queue. The core deliberately exposes no network surface of
/// its own (§1 Non-goals); this struct is what an external front door
/// would be built on top of.
pub struct App {
    pub intake: IntentIntake,
    pub cancellation: Cancellation,
    pub query: QuerySurface,
    pub processor: QueueProcessor,
}

async fn build_app(cfg: &AppConfig) -> anyhow::Result<App> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let pool = (*db.pool).clone();
    let intents: Arc<dyn IntentRepository> = Arc::new(SqlxIntentRepository::new(pool.clone()));
    let inventory: Arc<dyn InventoryRepository> = Arc::new(SqlxInventoryRepository::new(pool));

    let clock = Arc::new(ArrivalClock::new());

    let intake = IntentIntake::new(
        intents.clone(),
        inventory.clone(),
        clock,
        cfg.wait_estimate_per_intent,
    );
    let cancellation = Cancellation::new(intents.clone());
    let query = QuerySurface::new(intents.clone(), inventory.clone())
        .with_wait_estimate_secs(cfg.wait_estimate_per_intent.as_secs() as i64);
    let processor = QueueProcessor::new(
        intents,
        inventory,
        cfg.tick_period,
        cfg.sweeper_period,
        cfg.batch_size,
        cfg.intent_expiry,
        cfg.per_intent_timeout,
        cfg.max_attempts,
    );

    Ok(App {
        intake,
        cancellation,
        query,
        processor,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let json_logs = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(json_logs);

    tracing::info!("starting ticket queue");

    let cfg = AppConfig::from_env();
    let app = build_app(&cfg).await?;

    // Crash recovery (§4.3 Failure semantics) must run before the tick
    // loop starts claiming new work.
    app.processor.recover_on_startup().await?;

    tokio::spawn(app.processor.clone().run_tick_loop());
    tokio::spawn(app.processor.clone().run_sweeper_loop());

    tracing::info!("ticket queue running; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    Ok(())
}
