use async_trait::async_trait;

use crate::{EventFilter, EventId, EventOrder, EventPage, Result};

/// A remote, append-only history of events that can be read page by page.
///
/// Implementations must return events strictly after `after` (or from the
/// start of history when `after` is `None`) in the requested order. The
/// returned `next_cursor` is handed back unchanged on the next call.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches the next page of events for a stream.
    async fn fetch_events(
        &self,
        filter: &EventFilter,
        after: Option<&EventId>,
        order: EventOrder,
        limit: usize,
    ) -> Result<EventPage>;
}
