//! Core handler trait and the batch working set shared by handlers.

use std::collections::HashMap;

use async_trait::async_trait;
use common::{ObjectId, StreamId};
use event_source::{EventFilter, RawEvent};
use serde::de::DeserializeOwned;
use store::{EscrowUpdate, LockedUpdate};

use crate::{IndexerError, Result};

/// Applies one ordered batch of a stream's events to the projection store.
///
/// A handler either applies the whole batch or returns an error; on error
/// the runner keeps its cursor and the same batch is handed in again later.
/// Handlers must therefore tolerate seeing a batch, or a prefix of it, more
/// than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler.
    fn name(&self) -> &'static str;

    /// Handles a batch of events from `stream`, selected by `filter`.
    async fn handle(
        &self,
        stream: &StreamId,
        filter: &EventFilter,
        events: &[RawEvent],
    ) -> Result<()>;
}

/// Rejects an event whose origin is not the stream being processed.
pub fn check_origin(stream: &StreamId, filter: &EventFilter, event: &RawEvent) -> Result<()> {
    if filter.matches(event) {
        return Ok(());
    }
    Err(IndexerError::MalformedEvent {
        stream: stream.clone(),
        event_id: event.id.clone(),
        reason: format!(
            "event type {} does not originate from {}",
            event.event_type,
            filter.origin()
        ),
    })
}

/// Decodes an event payload into one of a handler's known shapes.
pub fn decode_payload<T: DeserializeOwned>(stream: &StreamId, event: &RawEvent) -> Result<T> {
    serde_json::from_value(event.parsed_json.clone()).map_err(|e| IndexerError::MalformedEvent {
        stream: stream.clone(),
        event_id: event.id.clone(),
        reason: format!("cannot decode {}: {e}", event.tag().unwrap_or("payload")),
    })
}

/// Error for an event tag the stream does not declare.
pub fn unknown_tag(stream: &StreamId, event: &RawEvent) -> IndexerError {
    IndexerError::MalformedEvent {
        stream: stream.clone(),
        event_id: event.id.clone(),
        reason: format!("unknown event type {}", event.event_type),
    }
}

/// A partial record change that can be folded with later changes.
pub trait PartialUpdate {
    fn object_id(&self) -> &ObjectId;
    fn merge(&mut self, later: &Self);
}

impl PartialUpdate for LockedUpdate {
    fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    fn merge(&mut self, later: &Self) {
        LockedUpdate::merge(self, later);
    }
}

impl PartialUpdate for EscrowUpdate {
    fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    fn merge(&mut self, later: &Self) {
        EscrowUpdate::merge(self, later);
    }
}

/// Per-batch map from object id to its folded update.
///
/// Entries keep the order in which objects were first touched, and later
/// events for the same object are folded in event order, so the result
/// never depends on how writes happen to complete.
pub struct WorkingSet<U> {
    updates: Vec<U>,
    index: HashMap<ObjectId, usize>,
}

impl<U: PartialUpdate> WorkingSet<U> {
    pub fn new() -> Self {
        Self {
            updates: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds the update derived from the next event of the batch.
    pub fn push(&mut self, update: U) {
        match self.index.get(update.object_id()) {
            Some(&idx) => self.updates[idx].merge(&update),
            None => {
                self.index.insert(update.object_id().clone(), self.updates.len());
                self.updates.push(update);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Returns one update per object, in first-touch order.
    pub fn into_updates(self) -> Vec<U> {
        self.updates
    }
}

impl<U: PartialUpdate> Default for WorkingSet<U> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_source::EventId;
    use serde_json::json;

    fn raw(event_type: &str) -> RawEvent {
        RawEvent::new(EventId::new("T1", 0), event_type, "0xs", json!({"lock_id": 1}))
    }

    #[test]
    fn origin_check_rejects_foreign_module() {
        let stream = StreamId::new("0xabc::lock");
        let filter = EventFilter::module("0xabc", "lock");

        assert!(check_origin(&stream, &filter, &raw("0xabc::lock::LockCreated")).is_ok());

        let err = check_origin(&stream, &filter, &raw("0xabc::escrow::EscrowCreated")).unwrap_err();
        assert!(matches!(err, IndexerError::MalformedEvent { .. }));
        assert_eq!(err.kind(), "malformed_event");
    }

    #[test]
    fn working_set_folds_in_event_order() {
        let mut set = WorkingSet::new();

        let mut created = LockedUpdate::new(ObjectId::new("A"));
        created.creator = Some("C1".into());
        set.push(created);

        set.push(LockedUpdate::new(ObjectId::new("B")));

        let mut destroyed = LockedUpdate::new(ObjectId::new("A"));
        destroyed.deleted = true;
        set.push(destroyed);

        let updates = set.into_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].object_id.as_str(), "A");
        assert!(updates[0].deleted);
        assert_eq!(updates[0].creator.as_deref(), Some("C1"));
        assert_eq!(updates[1].object_id.as_str(), "B");
    }
}
