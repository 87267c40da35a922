//! Pulsewatch - Heartbeat availability statistics service.
//!
//! Ingests push heartbeats, classifies them through a retry/debounce
//! policy, and serves time-windowed uptime and latency queries at
//! minute/hour/day resolution.

mod config;
mod db;
mod heartbeat;
mod query;
mod retention;
mod rollup;
mod web;

use config::ServerConfig;
use db::Store;
use heartbeat::Ingestor;
use retention::RetentionManager;
use rollup::TrackerRegistry;
use web::Server;

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("pulsewatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting Pulsewatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Store::new(&cfg.db_path)?;
    tracing::info!("Database initialized successfully");

    // Rebuild live rollups from stored heartbeats
    let registry = TrackerRegistry::new();
    let ingestor = Ingestor::new(store.clone(), registry.clone());
    ingestor.warm_start(Utc::now())?;

    // Start retention sweep
    let retention = RetentionManager::new(store.clone());
    retention.start();

    // Start web server
    let server = Server::new(cfg, store, registry);
    server.start().await?;

    Ok(())
}
