use async_trait::async_trait;
use common::ObjectId;

use crate::{
    EscrowFilter, EscrowRecord, EscrowUpdate, LockedFilter, LockedRecord, LockedUpdate, Page,
    Pagination, Result,
};

/// Store of the records derived from the lock and escrow streams.
///
/// Records are keyed by object id. An upsert inserts the record if absent,
/// assigning a fresh surrogate id, and otherwise merges the update into the
/// existing row without touching its surrogate id. Records are never deleted.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Inserts or merges a locked record, returning the stored state.
    async fn upsert_locked(&self, update: LockedUpdate) -> Result<LockedRecord>;

    /// Inserts or merges an escrow record, returning the stored state.
    async fn upsert_escrow(&self, update: EscrowUpdate) -> Result<EscrowRecord>;

    /// Gets a locked record by object id.
    async fn get_locked(&self, object_id: &ObjectId) -> Result<Option<LockedRecord>>;

    /// Gets an escrow record by object id.
    async fn get_escrow(&self, object_id: &ObjectId) -> Result<Option<EscrowRecord>>;

    /// Returns one page of locked records matching a filter.
    async fn query_locked(
        &self,
        filter: &LockedFilter,
        pagination: &Pagination,
    ) -> Result<Page<LockedRecord>>;

    /// Returns one page of escrow records matching a filter.
    async fn query_escrows(
        &self,
        filter: &EscrowFilter,
        pagination: &Pagination,
    ) -> Result<Page<EscrowRecord>>;
}
