//! Lock stream handler: maintains one [`LockedRecord`] per lock object.
//!
//! [`LockedRecord`]: store::LockedRecord

use std::sync::Arc;

use async_trait::async_trait;
use common::{ObjectId, StreamId};
use event_source::{EventFilter, RawEvent};
use serde::Deserialize;
use store::{LockedUpdate, ProjectionStore};

use crate::Result;
use crate::handler::{EventHandler, WorkingSet, check_origin, decode_payload, unknown_tag};

/// Payload of `LockCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockCreated {
    pub lock_id: String,
    pub key_id: String,
    pub creator: String,
    pub item_id: String,
}

/// Payload of `LockDestroyed`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockDestroyed {
    pub lock_id: String,
}

/// Events declared by the lock module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    Created(LockCreated),
    Destroyed(LockDestroyed),
}

impl LockEvent {
    /// Decodes a raw event by its tag, rejecting tags the module does not declare.
    pub fn decode(stream: &StreamId, event: &RawEvent) -> Result<Self> {
        match event.tag() {
            Some("LockCreated") => Ok(LockEvent::Created(decode_payload(stream, event)?)),
            Some("LockDestroyed") => Ok(LockEvent::Destroyed(decode_payload(stream, event)?)),
            _ => Err(unknown_tag(stream, event)),
        }
    }

    /// The update this event contributes to its lock's record.
    pub fn to_update(&self) -> LockedUpdate {
        match self {
            LockEvent::Created(data) => LockedUpdate {
                object_id: ObjectId::new(data.lock_id.clone()),
                key_id: Some(data.key_id.clone()),
                creator: Some(data.creator.clone()),
                item_id: Some(data.item_id.clone()),
                deleted: false,
            },
            LockEvent::Destroyed(data) => {
                let mut update = LockedUpdate::new(ObjectId::new(data.lock_id.clone()));
                update.deleted = true;
                update
            }
        }
    }
}

/// Folds a batch of lock events into one update per lock.
///
/// Fails without producing anything if any event is foreign to the stream
/// or cannot be decoded.
pub fn collect_lock_updates(
    stream: &StreamId,
    filter: &EventFilter,
    events: &[RawEvent],
) -> Result<Vec<LockedUpdate>> {
    let mut working = WorkingSet::new();
    for event in events {
        check_origin(stream, filter, event)?;
        working.push(LockEvent::decode(stream, event)?.to_update());
    }
    Ok(working.into_updates())
}

/// Handler projecting the lock stream into locked records.
#[derive(Clone)]
pub struct LockedHandler {
    store: Arc<dyn ProjectionStore>,
}

impl LockedHandler {
    /// Creates a handler writing to the given store.
    pub fn new(store: Arc<dyn ProjectionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for LockedHandler {
    fn name(&self) -> &'static str {
        "LockedHandler"
    }

    #[tracing::instrument(skip(self, filter, events), fields(events = events.len()))]
    async fn handle(
        &self,
        stream: &StreamId,
        filter: &EventFilter,
        events: &[RawEvent],
    ) -> Result<()> {
        let updates = collect_lock_updates(stream, filter, events)?;
        let count = updates.len();

        for update in updates {
            self.store.upsert_locked(update).await?;
        }

        metrics::counter!("indexer_records_upserted_total", "kind" => "locked")
            .increment(count as u64);
        tracing::debug!(records = count, "applied lock batch");
        Ok(())
    }
}
