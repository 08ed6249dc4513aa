use std::sync::Arc;

use linkvend_service::{Fulfillment, FulfillmentConfig, InMemoryEventBus, SessionReaper};
use linkvend_store::SqliteStore;

/// Headless fulfillment daemon: SQLite-backed stores, the session reaper,
/// and an event bus a chat transport can subscribe to. The transport
/// itself plugs in at the `Fulfillment` / `Subscription` seam.
#[tokio::main]
async fn main() {
    linkvend_observability::init();

    let db_path = std::env::var("LINKVEND_DB_PATH").unwrap_or_else(|_| {
        tracing::warn!("LINKVEND_DB_PATH not set; using ./linkvend.db");
        "linkvend.db".to_string()
    });
    let config = FulfillmentConfig::from_env();
    let reaper_tick = config.reaper_tick;

    let store = Arc::new(
        SqliteStore::open(std::path::Path::new(&db_path))
            .await
            .expect("failed to open database"),
    );
    let bus = Arc::new(InMemoryEventBus::new());
    let events = bus.subscribe();

    let fulfillment = Arc::new(Fulfillment::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        bus,
        config,
    ));

    let reaper = SessionReaper::spawn(Arc::clone(&fulfillment), reaper_tick);
    tracing::info!(db_path = %db_path, "fulfillment service up");

    // Until a transport is attached, drain outbound events to the log so
    // nothing backs up on the bus.
    let drain = tokio::task::spawn_blocking(move || {
        while let Ok(event) = events.recv() {
            match serde_json::to_string(&event) {
                Ok(json) => tracing::info!(event = %json, "outbound event"),
                Err(_) => tracing::info!(?event, "outbound event"),
            }
        }
    });

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutting down");
    reaper.shutdown();
    drain.abort();
}
