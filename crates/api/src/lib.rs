//! HTTP query API for the escrow indexer.
//!
//! Serves the locked and escrow projections with whitelisted filters and
//! cursor pagination, plus indexer status, health and Prometheus metrics.

pub mod config;
pub mod error;
pub mod query;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CursorStore, ProjectionStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use query::QueryService;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub query: QueryService,
    pub cursors: Arc<dyn CursorStore>,
    /// Number of streams the indexer tracks.
    pub streams: usize,
}

impl AppState {
    pub fn new(
        projections: Arc<dyn ProjectionStore>,
        cursors: Arc<dyn CursorStore>,
        max_query_limit: usize,
        streams: usize,
    ) -> Self {
        Self {
            query: QueryService::new(projections, max_query_limit),
            cursors,
            streams,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/locked", get(routes::records::locked))
        .route("/escrows", get(routes::records::escrows))
        .route("/cursors", get(routes::cursors::list))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
