//! Per-stream positions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::StreamId;
use event_source::EventId;
use serde::{Deserialize, Serialize};

use crate::Result;

/// The persisted position of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// The stream this position belongs to.
    pub stream_id: StreamId,

    /// The last event whose effects were durably applied.
    pub position: EventId,

    /// When the position was last written.
    pub updated_at: DateTime<Utc>,
}

/// Durable mapping from stream id to position.
///
/// `save` must only return once the position would be observed by a
/// later `load`, including one made after a process restart. A missing
/// cursor means the stream is replayed from the beginning of history.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Loads the saved position of a stream.
    async fn load(&self, stream_id: &StreamId) -> Result<Option<Cursor>>;

    /// Saves (upserts) the position of a stream.
    async fn save(&self, stream_id: &StreamId, position: &EventId) -> Result<()>;

    /// Lists every saved cursor, ordered by stream id.
    async fn list(&self) -> Result<Vec<Cursor>>;
}
