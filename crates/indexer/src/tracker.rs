//! Tracker registry: which streams exist and who handles them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use common::StreamId;
use event_source::EventFilter;
use store::ProjectionStore;

use crate::handler::EventHandler;
use crate::handlers::{EscrowHandler, LockedHandler};
use crate::{IndexerError, Result};

/// Immutable descriptor of one tracked stream.
#[derive(Clone)]
pub struct Tracker {
    pub stream_id: StreamId,
    pub filter: EventFilter,
    pub handler: Arc<dyn EventHandler>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("stream_id", &self.stream_id)
            .field("filter", &self.filter)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// The set of trackers, assembled once at startup.
///
/// Cloning is cheap and every clone sees the same trackers; there is no way
/// to add or remove one after [`TrackerRegistryBuilder::build`].
#[derive(Debug, Clone)]
pub struct TrackerRegistry {
    trackers: Arc<[Tracker]>,
}

impl TrackerRegistry {
    pub fn builder() -> TrackerRegistryBuilder {
        TrackerRegistryBuilder::default()
    }

    /// Returns every registered tracker.
    pub fn all(&self) -> &[Tracker] {
        &self.trackers
    }

    /// Looks up the tracker for a stream.
    pub fn get(&self, stream_id: &StreamId) -> Option<&Tracker> {
        self.trackers.iter().find(|t| &t.stream_id == stream_id)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

/// Collects trackers before the registry is frozen.
#[derive(Default)]
pub struct TrackerRegistryBuilder {
    trackers: Vec<Tracker>,
}

impl TrackerRegistryBuilder {
    /// Registers a stream, its filter and its handler.
    pub fn register(
        mut self,
        stream_id: StreamId,
        filter: EventFilter,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.trackers.push(Tracker {
            stream_id,
            filter,
            handler,
        });
        self
    }

    /// Freezes the registry, rejecting a stream registered twice.
    pub fn build(self) -> Result<TrackerRegistry> {
        let mut seen = HashSet::new();
        for tracker in &self.trackers {
            if !seen.insert(&tracker.stream_id) {
                return Err(IndexerError::DuplicateStream(tracker.stream_id.clone()));
            }
        }

        Ok(TrackerRegistry {
            trackers: self.trackers.into(),
        })
    }
}

/// The lock and escrow trackers of a deployed swap package.
pub fn swap_trackers(
    package_id: &str,
    store: Arc<dyn ProjectionStore>,
) -> Result<TrackerRegistry> {
    TrackerRegistry::builder()
        .register(
            StreamId::for_module(package_id, "lock"),
            EventFilter::module(package_id, "lock"),
            Arc::new(LockedHandler::new(Arc::clone(&store))),
        )
        .register(
            StreamId::for_module(package_id, "escrow"),
            EventFilter::module(package_id, "escrow"),
            Arc::new(EscrowHandler::new(store)),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryStore;

    #[test]
    fn test_swap_trackers_declares_both_streams() {
        let registry = swap_trackers("0xabc", Arc::new(InMemoryStore::new())).unwrap();

        assert_eq!(registry.len(), 2);

        let lock = registry.get(&StreamId::new("0xabc::lock")).unwrap();
        assert_eq!(lock.filter, EventFilter::module("0xabc", "lock"));
        assert_eq!(lock.handler.name(), "LockedHandler");

        let escrow = registry.get(&StreamId::new("0xabc::escrow")).unwrap();
        assert_eq!(escrow.handler.name(), "EscrowHandler");
    }

    #[test]
    fn test_duplicate_stream_is_rejected() {
        let store: Arc<dyn ProjectionStore> = Arc::new(InMemoryStore::new());
        let result = TrackerRegistry::builder()
            .register(
                StreamId::new("0xabc::lock"),
                EventFilter::module("0xabc", "lock"),
                Arc::new(LockedHandler::new(Arc::clone(&store))),
            )
            .register(
                StreamId::new("0xabc::lock"),
                EventFilter::module("0xabc", "lock"),
                Arc::new(LockedHandler::new(store)),
            )
            .build();

        assert!(matches!(result, Err(IndexerError::DuplicateStream(s)) if s.as_str() == "0xabc::lock"));
    }

    #[test]
    fn test_clones_share_trackers() {
        let registry = swap_trackers("0xabc", Arc::new(InMemoryStore::new())).unwrap();
        let clone = registry.clone();

        assert!(std::ptr::eq(registry.all().as_ptr(), clone.all().as_ptr()));
    }
}
