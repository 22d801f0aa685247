//! Checkpointed event ingestion.
//!
//! This crate keeps the local projection in sync with the remote event
//! history:
//! - [`EventHandler`] implementations turn a batch of raw events into
//!   idempotent upserts ([`LockedHandler`], [`EscrowHandler`])
//! - [`TrackerRegistry`] declares which streams exist and who handles them
//! - [`TrackerRunner`] polls one stream, handles it, and advances its cursor
//!   only after the batch is applied
//! - [`Indexer`] runs one runner per tracker until shutdown

pub mod error;
pub mod handler;
pub mod handlers;
pub mod indexer;
pub mod runner;
pub mod tracker;

pub use error::{IndexerError, Result};
pub use handler::EventHandler;
pub use handlers::{EscrowEvent, EscrowHandler, LockEvent, LockedHandler};
pub use indexer::Indexer;
pub use runner::{RunnerConfig, RunnerState, TrackerRunner};
pub use tracker::{Tracker, TrackerRegistry, TrackerRegistryBuilder, swap_trackers};
