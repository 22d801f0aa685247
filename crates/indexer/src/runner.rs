//! Polling runner for a single tracker.
//!
//! Each cycle walks `Fetching -> Handling -> Advancing` and ends in `Idle`
//! or, on any error, `Backoff`. The cursor is only written after the
//! handler has applied the whole batch, so a crash anywhere before that
//! point replays the batch on restart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use event_source::{EventId, EventOrder, EventPage, EventSource};
use store::CursorStore;
use tokio_util::sync::CancellationToken;

use crate::tracker::Tracker;
use crate::{IndexerError, Result};

/// Timing and paging knobs shared by every runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Wait between cycles once the stream has caught up.
    pub polling_interval: Duration,
    /// Wait after a failed cycle.
    pub error_backoff: Duration,
    /// Maximum events requested per fetch.
    pub page_limit: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_millis(1000),
            error_backoff: Duration::from_millis(1000),
            page_limit: 50,
        }
    }
}

/// Where a runner currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Fetching,
    Handling,
    Advancing,
    Backoff,
}

/// Drives one tracker: fetch after the cursor, handle, advance.
pub struct TrackerRunner {
    tracker: Tracker,
    source: Arc<dyn EventSource>,
    cursors: Arc<dyn CursorStore>,
    config: RunnerConfig,
    position: Option<EventId>,
    cursor_loaded: bool,
    state: RunnerState,
}

impl TrackerRunner {
    pub fn new(
        tracker: Tracker,
        source: Arc<dyn EventSource>,
        cursors: Arc<dyn CursorStore>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            tracker,
            source,
            cursors,
            config,
            position: None,
            cursor_loaded: false,
            state: RunnerState::Idle,
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// The last position this runner persisted or loaded.
    pub fn position(&self) -> Option<&EventId> {
        self.position.as_ref()
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Runs one cycle and returns how long to wait before the next.
    ///
    /// Errors never escape: they are logged, counted and turned into the
    /// backoff delay with the cursor left untouched.
    #[tracing::instrument(skip(self), fields(stream = %self.tracker.stream_id))]
    pub async fn run_cycle(&mut self) -> Duration {
        let outcome = match self.fetch().await {
            Ok(page) => self.process(page).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(delay) => delay,
            Err(e) => self.backoff(e),
        }
    }

    /// Loops until `shutdown` is cancelled.
    ///
    /// Cancellation abandons a pending fetch or wait, but a batch that has
    /// been fetched is always handled and its cursor saved (or failed)
    /// before the loop exits.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(stream = %self.tracker.stream_id, "runner started");

        loop {
            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                fetched = self.fetch() => fetched,
            };

            let delay = match fetched {
                Ok(page) => match self.process(page).await {
                    Ok(delay) => delay,
                    Err(e) => self.backoff(e),
                },
                Err(e) => self.backoff(e),
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(stream = %self.tracker.stream_id, "runner stopped");
    }

    /// Loads the cursor on first use, then fetches the next page after it.
    async fn fetch(&mut self) -> Result<EventPage> {
        if !self.cursor_loaded {
            let cursor = self.cursors.load(&self.tracker.stream_id).await?;
            self.position = cursor.map(|c| c.position);
            self.cursor_loaded = true;
            tracing::debug!(
                stream = %self.tracker.stream_id,
                position = ?self.position,
                "cursor loaded"
            );
        }

        self.state = RunnerState::Fetching;
        let start = Instant::now();
        let page = self
            .source
            .fetch_events(
                &self.tracker.filter,
                self.position.as_ref(),
                EventOrder::Ascending,
                self.config.page_limit,
            )
            .await;
        metrics::histogram!(
            "indexer_fetch_duration_seconds",
            "stream" => self.tracker.stream_id.to_string()
        )
        .record(start.elapsed().as_secs_f64());

        Ok(page?)
    }

    /// Handles a fetched page and advances the cursor past it.
    async fn process(&mut self, page: EventPage) -> Result<Duration> {
        let Some(last) = page.events.last() else {
            // The source may report a new position with no events; it is not trusted.
            self.state = RunnerState::Idle;
            return Ok(self.config.polling_interval);
        };
        let next = page.next_cursor.clone().unwrap_or_else(|| last.id.clone());
        let stream = &self.tracker.stream_id;

        self.state = RunnerState::Handling;
        self.tracker
            .handler
            .handle(stream, &self.tracker.filter, &page.events)
            .await?;

        self.state = RunnerState::Advancing;
        self.cursors.save(stream, &next).await?;

        metrics::counter!("indexer_events_processed_total", "stream" => stream.to_string())
            .increment(page.events.len() as u64);
        metrics::counter!("indexer_cursor_advances_total", "stream" => stream.to_string())
            .increment(1);
        tracing::info!(
            stream = %stream,
            events = page.events.len(),
            position = %next,
            has_more = page.has_more,
            "batch applied"
        );

        self.position = Some(next);
        self.state = RunnerState::Idle;

        Ok(if page.has_more {
            Duration::ZERO
        } else {
            self.config.polling_interval
        })
    }

    fn backoff(&mut self, error: IndexerError) -> Duration {
        let stream = &self.tracker.stream_id;
        metrics::counter!(
            "indexer_batches_failed_total",
            "stream" => stream.to_string(),
            "kind" => error.kind()
        )
        .increment(1);

        match &error {
            IndexerError::MalformedEvent { .. } => {
                tracing::error!(stream = %stream, error = %error, "malformed event, check the tracker filter")
            }
            e if !e.is_transient() => {
                tracing::error!(stream = %stream, error = %error, "cycle failed and will not recover on retry")
            }
            _ => tracing::warn!(stream = %stream, error = %error, "cycle failed, backing off"),
        }

        self.state = RunnerState::Backoff;
        self.config.error_backoff
    }
}
