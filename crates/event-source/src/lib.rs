//! Event source collaborator for the indexer.
//!
//! This crate models the remote, append-only event history the indexer
//! consumes:
//! - [`RawEvent`] and [`EventId`], the event shape and its opaque position
//! - [`EventFilter`] selecting one stream out of the chain's events
//! - [`EventSource`], the paging contract the runners fetch through
//! - [`InMemoryEventSource`] for tests and [`JsonRpcEventSource`] for a live node

pub mod error;
pub mod event;
pub mod memory;
pub mod rpc;
pub mod source;

pub use error::{Result, SourceError};
pub use event::{EventFilter, EventId, EventOrder, EventPage, RawEvent};
pub use memory::InMemoryEventSource;
pub use rpc::{JsonRpcEventSource, RpcClientConfig};
pub use source::EventSource;
