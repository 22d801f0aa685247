//! Indexer and API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use event_source::{JsonRpcEventSource, RpcClientConfig};
use indexer::{Indexer, swap_trackers};
use sqlx::postgres::PgPoolOptions;
use store::{CursorStore, InMemoryStore, PostgresStore, ProjectionStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Opens the configured backend: PostgreSQL when `DATABASE_URL` is set,
/// memory otherwise.
async fn open_stores(config: &Config) -> (Arc<dyn ProjectionStore>, Arc<dyn CursorStore>) {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = Arc::new(PostgresStore::new(pool));
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL store");

            let projections: Arc<dyn ProjectionStore> = store.clone();
            let cursors: Arc<dyn CursorStore> = store;
            (projections, cursors)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, indexed state will not survive a restart");
            let store = Arc::new(InMemoryStore::new());

            let projections: Arc<dyn ProjectionStore> = store.clone();
            let cursors: Arc<dyn CursorStore> = store;
            (projections, cursors)
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env().expect("invalid configuration");
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open stores and the event source
    let (projections, cursors) = open_stores(&config).await;
    let source = JsonRpcEventSource::new(&config.rpc_url, RpcClientConfig::default())
        .expect("failed to build RPC client");

    // 4. Start one runner per tracked stream
    let registry =
        swap_trackers(&config.package_id, Arc::clone(&projections)).expect("invalid trackers");
    let indexer = Indexer::start(
        &registry,
        Arc::new(source),
        Arc::clone(&cursors),
        config.runner_config(),
    );
    tracing::info!(
        package = %config.package_id,
        rpc = %config.rpc_url,
        streams = registry.len(),
        "indexer running"
    );

    // 5. Build the application
    let state = Arc::new(api::AppState::new(
        projections,
        cursors,
        config.max_query_limit,
        registry.len(),
    ));
    let app = api::create_app(state, metrics_handle);

    // 6. Serve until a shutdown signal, then stop the runners
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    indexer.shutdown().await;
    tracing::info!("server shut down gracefully");
}
