//! Ingestion error types.

use common::StreamId;
use event_source::{EventId, SourceError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while ingesting a stream.
///
/// None of these stop a runner: every ingestion error leaves the cursor
/// where it was and the batch is retried after the backoff interval.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The event source could not serve the page.
    #[error("Event source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    /// An event does not belong to the stream or has an unknown shape.
    #[error("Malformed event {event_id} on stream {stream}: {reason}")]
    MalformedEvent {
        stream: StreamId,
        event_id: EventId,
        reason: String,
    },

    /// A projection or cursor write failed.
    #[error("Store write failed: {0}")]
    StoreWriteFailure(#[from] StoreError),

    /// Two trackers were registered for the same stream.
    #[error("Duplicate tracker for stream {0}")]
    DuplicateStream(StreamId),
}

impl IndexerError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            IndexerError::SourceUnavailable(_) => "source_unavailable",
            IndexerError::MalformedEvent { .. } => "malformed_event",
            IndexerError::StoreWriteFailure(_) => "store_write_failure",
            IndexerError::DuplicateStream(_) => "duplicate_stream",
        }
    }

    /// Returns true when the same cycle may succeed once retried unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexerError::SourceUnavailable(source) => source.is_transient(),
            IndexerError::StoreWriteFailure(_) => true,
            IndexerError::MalformedEvent { .. } | IndexerError::DuplicateStream(_) => false,
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IndexerError>;
