//! Shared identity types used across the indexer workspace.

pub mod types;

pub use types::{ObjectId, StreamId, SurrogateId};
