use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EventFilter, EventId, EventOrder, EventPage, RawEvent, Result, SourceError,
    source::EventSource,
};

/// In-memory event source for tests and local runs.
///
/// Events are kept in publish order, which is the order the source reports
/// them in. Individual streams can be marked unavailable to simulate a
/// partial outage of the remote node.
#[derive(Clone, Default)]
pub struct InMemoryEventSource {
    events: Arc<RwLock<Vec<RawEvent>>>,
    unavailable: Arc<RwLock<HashSet<EventFilter>>>,
    fetches: Arc<AtomicUsize>,
}

impl InMemoryEventSource {
    /// Creates a new empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the history.
    pub async fn publish(&self, event: RawEvent) {
        self.events.write().await.push(event);
    }

    /// Appends an event built from a type and payload, assigning it a fresh id.
    pub async fn emit(&self, event_type: &str, payload: serde_json::Value) -> EventId {
        let mut events = self.events.write().await;
        let id = EventId::new(format!("tx{}", events.len()), 0);
        events.push(RawEvent::new(id.clone(), event_type, "0xsender", payload));
        id
    }

    /// Marks the stream selected by `filter` as (un)available.
    pub async fn set_unavailable(&self, filter: &EventFilter, unavailable: bool) {
        let mut set = self.unavailable.write().await;
        if unavailable {
            set.insert(filter.clone());
        } else {
            set.remove(filter);
        }
    }

    /// Returns the total number of events published.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns how many fetches have been served or refused so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn fetch_events(
        &self,
        filter: &EventFilter,
        after: Option<&EventId>,
        order: EventOrder,
        limit: usize,
    ) -> Result<EventPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.read().await.contains(filter) {
            return Err(SourceError::Unavailable(format!(
                "stream {filter} is unavailable"
            )));
        }

        let store = self.events.read().await;
        let mut matching: Vec<&RawEvent> = store.iter().filter(|e| filter.matches(e)).collect();
        if order.is_descending() {
            matching.reverse();
        }

        let start = match after {
            Some(cursor) => {
                let idx = matching
                    .iter()
                    .position(|e| &e.id == cursor)
                    .ok_or_else(|| SourceError::UnknownCursor(cursor.to_string()))?;
                idx + 1
            }
            None => 0,
        };

        let remaining = &matching[start..];
        let take = remaining.len().min(limit);
        let events: Vec<RawEvent> = remaining[..take].iter().map(|e| (*e).clone()).collect();

        let next_cursor = events
            .last()
            .map(|e| e.id.clone())
            .or_else(|| after.cloned());

        Ok(EventPage {
            events,
            next_cursor,
            has_more: remaining.len() > take,
        })
    }
}
