//! Escrow stream handler.

use std::sync::Arc;

use async_trait::async_trait;
use common::{ObjectId, StreamId};
use event_source::{EventFilter, RawEvent};
use serde::Deserialize;
use store::{EscrowUpdate, ProjectionStore};

use crate::Result;
use crate::handler::{EventHandler, WorkingSet, check_origin, decode_payload, unknown_tag};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EscrowCreated {
    pub escrow_id: String,
    pub key_id: String,
    pub sender: String,
    pub recipient: String,
    pub item_id: String,
}

/// Payload shared by `EscrowSwapped` and `EscrowCancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EscrowClosed {
    pub escrow_id: String,
}

/// Events declared by the escrow module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowEvent {
    Created(EscrowCreated),
    Swapped(EscrowClosed),
    Cancelled(EscrowClosed),
}

impl EscrowEvent {
    pub fn decode(stream: &StreamId, event: &RawEvent) -> Result<Self> {
        match event.tag() {
            Some("EscrowCreated") => Ok(EscrowEvent::Created(decode_payload(stream, event)?)),
            Some("EscrowSwapped") => Ok(EscrowEvent::Swapped(decode_payload(stream, event)?)),
            Some("EscrowCancelled") => Ok(EscrowEvent::Cancelled(decode_payload(stream, event)?)),
            _ => Err(unknown_tag(stream, event)),
        }
    }

    pub fn to_update(&self) -> EscrowUpdate {
        match self {
            EscrowEvent::Created(data) => EscrowUpdate {
                object_id: ObjectId::new(data.escrow_id.clone()),
                sender: Some(data.sender.clone()),
                recipient: Some(data.recipient.clone()),
                key_id: Some(data.key_id.clone()),
                item_id: Some(data.item_id.clone()),
                swapped: false,
                cancelled: false,
            },
            EscrowEvent::Swapped(data) => {
                let mut update = EscrowUpdate::new(ObjectId::new(data.escrow_id.clone()));
                update.swapped = true;
                update
            }
            EscrowEvent::Cancelled(data) => {
                let mut update = EscrowUpdate::new(ObjectId::new(data.escrow_id.clone()));
                update.cancelled = true;
                update
            }
        }
    }
}

/// Folds a batch of escrow events into one update per escrow.
pub fn collect_escrow_updates(
    stream: &StreamId,
    filter: &EventFilter,
    events: &[RawEvent],
) -> Result<Vec<EscrowUpdate>> {
    let mut working = WorkingSet::new();
    for event in events {
        check_origin(stream, filter, event)?;
        working.push(EscrowEvent::decode(stream, event)?.to_update());
    }
    Ok(working.into_updates())
}

/// Handler projecting the escrow stream into escrow records.
#[derive(Clone)]
pub struct EscrowHandler {
    store: Arc<dyn ProjectionStore>,
}

impl EscrowHandler {
    pub fn new(store: Arc<dyn ProjectionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for EscrowHandler {
    fn name(&self) -> &'static str {
        "EscrowHandler"
    }

    #[tracing::instrument(skip(self, filter, events), fields(events = events.len()))]
    async fn handle(
        &self,
        stream: &StreamId,
        filter: &EventFilter,
        events: &[RawEvent],
    ) -> Result<()> {
        let updates = collect_escrow_updates(stream, filter, events)?;
        let count = updates.len();

        for update in updates {
            self.store.upsert_escrow(update).await?;
        }

        metrics::counter!("indexer_records_upserted_total", "kind" => "escrow")
            .increment(count as u64);
        tracing::debug!(records = count, "applied escrow batch");
        Ok(())
    }
}
