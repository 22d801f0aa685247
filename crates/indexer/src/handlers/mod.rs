//! Handlers for the lock and escrow streams.

pub mod escrow;
pub mod locked;

pub use escrow::{EscrowEvent, EscrowHandler};
pub use locked::{LockEvent, LockedHandler};
