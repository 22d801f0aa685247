//! Supervisor running one polling task per tracker.

use std::sync::Arc;

use event_source::EventSource;
use futures_util::future::join_all;
use store::CursorStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::runner::{RunnerConfig, TrackerRunner};
use crate::tracker::TrackerRegistry;

/// Handle to the running trackers.
pub struct Indexer {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Indexer {
    /// Spawns a runner for every tracker in the registry.
    pub fn start(
        registry: &TrackerRegistry,
        source: Arc<dyn EventSource>,
        cursors: Arc<dyn CursorStore>,
        config: RunnerConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();

        let tasks = registry
            .all()
            .iter()
            .map(|tracker| {
                let runner = TrackerRunner::new(
                    tracker.clone(),
                    Arc::clone(&source),
                    Arc::clone(&cursors),
                    config,
                );
                tokio::spawn(runner.run(shutdown.child_token()))
            })
            .collect::<Vec<_>>();

        tracing::info!(trackers = tasks.len(), "indexer started");

        Self { shutdown, tasks }
    }

    /// Token cancelled by [`Indexer::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of runner tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops every runner and waits for in-flight batches to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();

        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "runner task failed");
            }
        }

        tracing::info!("indexer stopped");
    }
}
