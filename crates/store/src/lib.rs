//! Durable state of the indexer.
//!
//! Two stores live here:
//! - the [`CursorStore`], one position per tracked stream
//! - the [`ProjectionStore`], the locked and escrow records derived from events
//!
//! Both have an in-memory backend ([`InMemoryStore`]) and a PostgreSQL
//! backend ([`PostgresStore`]).

pub mod cursor;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod projection;
pub mod query;
pub mod record;

pub use cursor::{Cursor, CursorStore};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use projection::ProjectionStore;
pub use query::{EscrowFilter, LockedFilter, Page, Pagination, SortOrder};
pub use record::{EscrowRecord, EscrowUpdate, LockedRecord, LockedUpdate};
