use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use common::{ObjectId, StreamId, SurrogateId};
use event_source::EventId;
use tokio::sync::RwLock;

use crate::query::Paginated;
use crate::{
    Cursor, CursorStore, EscrowFilter, EscrowRecord, EscrowUpdate, LockedFilter, LockedRecord,
    LockedUpdate, Page, Pagination, ProjectionStore, Result, SortOrder, StoreError,
};

/// Rows of one record kind, ordered by surrogate id.
struct Table<T> {
    rows: BTreeMap<SurrogateId, T>,
    by_object: HashMap<ObjectId, SurrogateId>,
    last_id: SurrogateId,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            by_object: HashMap::new(),
            last_id: SurrogateId::default(),
        }
    }
}

impl<T: Clone + Paginated> Table<T> {
    fn upsert(
        &mut self,
        object_id: ObjectId,
        merge: impl FnOnce(&mut T),
        insert: impl FnOnce(SurrogateId) -> T,
    ) -> T {
        if let Some(id) = self.by_object.get(&object_id)
            && let Some(row) = self.rows.get_mut(id)
        {
            merge(row);
            return row.clone();
        }

        self.last_id = self.last_id.next();
        let row = insert(self.last_id);
        self.by_object.insert(object_id, self.last_id);
        self.rows.insert(self.last_id, row.clone());
        row
    }

    fn get(&self, object_id: &ObjectId) -> Option<T> {
        self.by_object
            .get(object_id)
            .and_then(|id| self.rows.get(id))
            .cloned()
    }

    fn page(&self, pagination: &Pagination, predicate: impl Fn(&T) -> bool) -> Page<T> {
        let matching = |row: &&T| {
            pagination.is_past_cursor(row.surrogate_id()) && predicate(row)
        };

        let data: Vec<T> = match pagination.sort {
            SortOrder::Ascending => self
                .rows
                .values()
                .filter(matching)
                .take(pagination.limit)
                .cloned()
                .collect(),
            SortOrder::Descending => self
                .rows
                .values()
                .rev()
                .filter(matching)
                .take(pagination.limit)
                .cloned()
                .collect(),
        };

        Page::from_rows(data)
    }
}

/// In-memory cursor and projection store.
///
/// Provides the same interface as the PostgreSQL implementation and is used
/// for tests and for running the indexer without a database. Writes can be
/// made to fail to exercise the indexer's retry paths.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    cursors: Arc<RwLock<HashMap<StreamId, Cursor>>>,
    locked: Arc<RwLock<Table<LockedRecord>>>,
    escrows: Arc<RwLock<Table<EscrowRecord>>>,
    write_budget: Arc<Mutex<Option<usize>>>,
    cursor_writes_failing: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits how many more record upserts succeed before every further one
    /// fails. `None` removes the limit.
    pub fn set_write_budget(&self, budget: Option<usize>) {
        *self.lock_budget() = budget;
    }

    /// Makes cursor saves fail (or succeed again).
    pub fn set_cursor_writes_failing(&self, failing: bool) {
        self.cursor_writes_failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the number of locked records.
    pub async fn locked_count(&self) -> usize {
        self.locked.read().await.rows.len()
    }

    /// Returns the number of escrow records.
    pub async fn escrow_count(&self) -> usize {
        self.escrows.read().await.rows.len()
    }

    /// Returns every locked record in surrogate id order.
    pub async fn all_locked(&self) -> Vec<LockedRecord> {
        self.locked.read().await.rows.values().cloned().collect()
    }

    /// Returns every escrow record in surrogate id order.
    pub async fn all_escrows(&self) -> Vec<EscrowRecord> {
        self.escrows.read().await.rows.values().cloned().collect()
    }

    fn lock_budget(&self) -> std::sync::MutexGuard<'_, Option<usize>> {
        self.write_budget
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn take_write(&self) -> Result<()> {
        let mut budget = self.lock_budget();
        match budget.as_mut() {
            None => Ok(()),
            Some(0) => Err(StoreError::Unavailable(
                "record writes are failing".to_string(),
            )),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn load(&self, stream_id: &StreamId) -> Result<Option<Cursor>> {
        Ok(self.cursors.read().await.get(stream_id).cloned())
    }

    async fn save(&self, stream_id: &StreamId, position: &EventId) -> Result<()> {
        if self.cursor_writes_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "cursor writes are failing".to_string(),
            ));
        }

        let cursor = Cursor {
            stream_id: stream_id.clone(),
            position: position.clone(),
            updated_at: Utc::now(),
        };
        self.cursors.write().await.insert(stream_id.clone(), cursor);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Cursor>> {
        let mut cursors: Vec<Cursor> = self.cursors.read().await.values().cloned().collect();
        cursors.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        Ok(cursors)
    }
}

#[async_trait]
impl ProjectionStore for InMemoryStore {
    async fn upsert_locked(&self, update: LockedUpdate) -> Result<LockedRecord> {
        self.take_write()?;
        let mut table = self.locked.write().await;
        let object_id = update.object_id.clone();
        let merge_with = update.clone();
        Ok(table.upsert(
            object_id,
            |row| merge_with.apply(row),
            |id| update.into_record(id),
        ))
    }

    async fn upsert_escrow(&self, update: EscrowUpdate) -> Result<EscrowRecord> {
        self.take_write()?;
        let mut table = self.escrows.write().await;
        let object_id = update.object_id.clone();
        let merge_with = update.clone();
        Ok(table.upsert(
            object_id,
            |row| merge_with.apply(row),
            |id| update.into_record(id),
        ))
    }

    async fn get_locked(&self, object_id: &ObjectId) -> Result<Option<LockedRecord>> {
        Ok(self.locked.read().await.get(object_id))
    }

    async fn get_escrow(&self, object_id: &ObjectId) -> Result<Option<EscrowRecord>> {
        Ok(self.escrows.read().await.get(object_id))
    }

    async fn query_locked(
        &self,
        filter: &LockedFilter,
        pagination: &Pagination,
    ) -> Result<Page<LockedRecord>> {
        Ok(self
            .locked
            .read()
            .await
            .page(pagination, |r| filter.matches(r)))
    }

    async fn query_escrows(
        &self,
        filter: &EscrowFilter,
        pagination: &Pagination,
    ) -> Result<Page<EscrowRecord>> {
        Ok(self
            .escrows
            .read()
            .await
            .page(pagination, |r| filter.matches(r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_created(object_id: &str, creator: &str) -> LockedUpdate {
        LockedUpdate {
            object_id: ObjectId::new(object_id),
            key_id: Some(format!("key-{object_id}")),
            creator: Some(creator.to_string()),
            item_id: Some(format!("item-{object_id}")),
            deleted: false,
        }
    }

    fn lock_destroyed(object_id: &str) -> LockedUpdate {
        let mut update = LockedUpdate::new(ObjectId::new(object_id));
        update.deleted = true;
        update
    }

    #[tokio::test]
    async fn upsert_inserts_then_merges() {
        let store = InMemoryStore::new();

        let inserted = store.upsert_locked(lock_created("L1", "C1")).await.unwrap();
        assert_eq!(inserted.id, SurrogateId::new(1));
        assert!(!inserted.deleted);

        let merged = store.upsert_locked(lock_destroyed("L1")).await.unwrap();
        assert_eq!(merged.id, SurrogateId::new(1));
        assert!(merged.deleted);
        assert_eq!(merged.creator.as_deref(), Some("C1"));
        assert_eq!(store.locked_count().await, 1);
    }

    #[tokio::test]
    async fn surrogate_ids_are_assigned_once_in_insert_order() {
        let store = InMemoryStore::new();
        store.upsert_locked(lock_created("A", "C1")).await.unwrap();
        store.upsert_locked(lock_created("B", "C1")).await.unwrap();
        store.upsert_locked(lock_destroyed("A")).await.unwrap();

        let a = store.get_locked(&ObjectId::new("A")).await.unwrap().unwrap();
        let b = store.get_locked(&ObjectId::new("B")).await.unwrap().unwrap();
        assert_eq!(a.id, SurrogateId::new(1));
        assert_eq!(b.id, SurrogateId::new(2));
    }

    #[tokio::test]
    async fn terminal_before_creation_still_records() {
        let store = InMemoryStore::new();
        let record = store.upsert_locked(lock_destroyed("L9")).await.unwrap();
        assert!(record.deleted);
        assert!(record.creator.is_none());
    }

    #[tokio::test]
    async fn query_pages_descending_by_default() {
        let store = InMemoryStore::new();
        for id in ["A", "B", "C"] {
            store.upsert_locked(lock_created(id, "C1")).await.unwrap();
        }

        let filter = LockedFilter {
            deleted: Some(false),
            ..Default::default()
        };
        let first = store
            .query_locked(&filter, &Pagination::new(2))
            .await
            .unwrap();
        let ids: Vec<i64> = first.data.iter().map(|r| r.id.as_i64()).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(first.next_cursor, Some(SurrogateId::new(2)));

        let second = store
            .query_locked(&filter, &Pagination::new(2).after(SurrogateId::new(2)))
            .await
            .unwrap();
        let ids: Vec<i64> = second.data.iter().map(|r| r.id.as_i64()).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn query_ascending_with_filter() {
        let store = InMemoryStore::new();
        store.upsert_locked(lock_created("A", "C1")).await.unwrap();
        store.upsert_locked(lock_created("B", "C2")).await.unwrap();
        store.upsert_locked(lock_created("C", "C1")).await.unwrap();

        let filter = LockedFilter {
            creator: Some("C1".into()),
            ..Default::default()
        };
        let page = store
            .query_locked(&filter, &Pagination::new(10).sort(SortOrder::Ascending))
            .await
            .unwrap();
        let objects: Vec<&str> = page.data.iter().map(|r| r.object_id.as_str()).collect();
        assert_eq!(objects, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn escrow_upsert_and_query() {
        let store = InMemoryStore::new();
        let mut created = EscrowUpdate::new(ObjectId::new("E1"));
        created.sender = Some("S".into());
        created.recipient = Some("R".into());
        store.upsert_escrow(created).await.unwrap();

        let mut swapped = EscrowUpdate::new(ObjectId::new("E1"));
        swapped.swapped = true;
        store.upsert_escrow(swapped).await.unwrap();

        let filter = EscrowFilter {
            recipient: Some("R".into()),
            swapped: Some(true),
            ..Default::default()
        };
        let page = store
            .query_escrows(&filter, &Pagination::new(10))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(!page.data[0].cancelled);
        assert_eq!(page.data[0].sender.as_deref(), Some("S"));
    }

    #[tokio::test]
    async fn cursor_roundtrip() {
        let store = InMemoryStore::new();
        let stream = StreamId::new("0xabc::lock");
        assert!(store.load(&stream).await.unwrap().is_none());

        store.save(&stream, &EventId::new("T1", 0)).await.unwrap();
        store.save(&stream, &EventId::new("T2", 1)).await.unwrap();

        let cursor = store.load(&stream).await.unwrap().unwrap();
        assert_eq!(cursor.position, EventId::new("T2", 1));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_budget_fails_after_exhaustion() {
        let store = InMemoryStore::new();
        store.set_write_budget(Some(1));

        assert!(store.upsert_locked(lock_created("A", "C1")).await.is_ok());
        let err = store.upsert_locked(lock_created("B", "C1")).await;
        assert!(matches!(err, Err(StoreError::Unavailable(_))));

        store.set_write_budget(None);
        assert!(store.upsert_locked(lock_created("B", "C1")).await.is_ok());
    }

    #[tokio::test]
    async fn failing_cursor_writes_keep_old_position() {
        let store = InMemoryStore::new();
        let stream = StreamId::new("0xabc::lock");
        store.save(&stream, &EventId::new("T1", 0)).await.unwrap();

        store.set_cursor_writes_failing(true);
        assert!(store.save(&stream, &EventId::new("T2", 0)).await.is_err());

        let cursor = store.load(&stream).await.unwrap().unwrap();
        assert_eq!(cursor.position, EventId::new("T1", 0));
    }
}
