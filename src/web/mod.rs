//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::heartbeat::Ingestor;
use crate::rollup::TrackerRegistry;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Store,
    pub registry: TrackerRegistry,
    pub ingestor: Ingestor,
}

/// Web server for Pulsewatch.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Store, registry: TrackerRegistry) -> Self {
        let ingestor = Ingestor::new(store.clone(), registry.clone());
        Self {
            state: AppState {
                config,
                store,
                registry,
                ingestor,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // Time-series queries
            .route("/api/status", get(handlers::handle_status))
            .route("/api/dashboard/status", get(handlers::handle_dashboard_status))
            // Heartbeat ingestion
            .route(
                "/api/push/{token}",
                get(handlers::handle_push).post(handlers::handle_push),
            )
            // Monitor management
            .route("/api/monitors", get(handlers::handle_get_monitors))
            .route("/api/monitors", post(handlers::handle_create_monitor))
            .route(
                "/api/monitors/{id}",
                put(handlers::handle_update_monitor).delete(handlers::handle_delete_monitor),
            )
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
