use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ObjectId, StreamId, SurrogateId};
use event_source::EventId;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::query::Paginated;
use crate::{
    Cursor, CursorStore, EscrowFilter, EscrowRecord, EscrowUpdate, LockedFilter, LockedRecord,
    LockedUpdate, Page, Pagination, ProjectionStore, Result, SortOrder, StoreError,
};

const LOCKED_COLUMNS: &str = "id, object_id, key_id, creator, item_id, deleted";
const ESCROW_COLUMNS: &str =
    "id, object_id, sender, recipient, key_id, item_id, swapped, cancelled";

/// A value bound to a dynamically built query.
enum Bind {
    Text(String),
    Bool(bool),
    Int(i64),
}

/// Accumulates `WHERE` clauses and their parameters in bind order.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    binds: Vec<Bind>,
}

impl Conditions {
    fn push(&mut self, column: &str, op: &str, value: Bind) {
        self.binds.push(value);
        self.clauses
            .push(format!("{column} {op} ${}", self.binds.len()));
    }

    fn text(&mut self, column: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.push(column, "=", Bind::Text(v.clone()));
        }
    }

    fn flag(&mut self, column: &str, value: Option<bool>) {
        if let Some(v) = value {
            self.push(column, "=", Bind::Bool(v));
        }
    }

    fn id(&mut self, value: Option<SurrogateId>) {
        if let Some(v) = value {
            self.push("id", "=", Bind::Int(v.as_i64()));
        }
    }

    fn page(&mut self, pagination: &Pagination) {
        if let Some(cursor) = pagination.cursor {
            let op = match pagination.sort {
                SortOrder::Ascending => ">",
                SortOrder::Descending => "<",
            };
            self.push("id", op, Bind::Int(cursor.as_i64()));
        }
    }

    fn to_sql(&self, columns: &str, table: &str, pagination: &Pagination) -> String {
        let mut sql = format!("SELECT {columns} FROM {table} WHERE 1=1");
        for clause in &self.clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        let direction = match pagination.sort {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        sql.push_str(&format!(
            " ORDER BY id {direction} LIMIT ${}",
            self.binds.len() + 1
        ));
        sql
    }
}

/// PostgreSQL-backed cursor and projection store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_locked(row: PgRow) -> Result<LockedRecord> {
        Ok(LockedRecord {
            id: SurrogateId::new(row.try_get("id")?),
            object_id: ObjectId::new(row.try_get::<String, _>("object_id")?),
            key_id: row.try_get("key_id")?,
            creator: row.try_get("creator")?,
            item_id: row.try_get("item_id")?,
            deleted: row.try_get("deleted")?,
        })
    }

    fn row_to_escrow(row: PgRow) -> Result<EscrowRecord> {
        Ok(EscrowRecord {
            id: SurrogateId::new(row.try_get("id")?),
            object_id: ObjectId::new(row.try_get::<String, _>("object_id")?),
            sender: row.try_get("sender")?,
            recipient: row.try_get("recipient")?,
            key_id: row.try_get("key_id")?,
            item_id: row.try_get("item_id")?,
            swapped: row.try_get("swapped")?,
            cancelled: row.try_get("cancelled")?,
        })
    }

    fn row_to_cursor(row: PgRow) -> Result<Cursor> {
        let event_seq: i64 = row.try_get("event_seq")?;
        Ok(Cursor {
            stream_id: StreamId::new(row.try_get::<String, _>("stream_id")?),
            position: EventId::new(
                row.try_get::<String, _>("tx_digest")?,
                u64::try_from(event_seq)
                    .map_err(|_| StoreError::OutOfRange(format!("event_seq {event_seq}")))?,
            ),
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    async fn fetch_page<T: Paginated>(
        &self,
        conditions: Conditions,
        columns: &str,
        table: &str,
        pagination: &Pagination,
        map: fn(PgRow) -> Result<T>,
    ) -> Result<Page<T>> {
        let sql = conditions.to_sql(columns, table, pagination);
        let limit = i64::try_from(pagination.limit)
            .map_err(|_| StoreError::OutOfRange(format!("limit {}", pagination.limit)))?;

        let mut query = sqlx::query(&sql);
        for bind in conditions.binds {
            query = match bind {
                Bind::Text(v) => query.bind(v),
                Bind::Bool(v) => query.bind(v),
                Bind::Int(v) => query.bind(v),
            };
        }
        query = query.bind(limit);

        let started = Instant::now();
        let rows = query.fetch_all(&self.pool).await?;
        metrics::histogram!("store_query_duration_seconds", "table" => table.to_string())
            .record(started.elapsed().as_secs_f64());

        let data = rows.into_iter().map(map).collect::<Result<Vec<_>>>()?;
        tracing::debug!(table, rows = data.len(), "page fetched");
        Ok(Page::from_rows(data))
    }
}

#[async_trait]
impl CursorStore for PostgresStore {
    async fn load(&self, stream_id: &StreamId) -> Result<Option<Cursor>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT stream_id, tx_digest, event_seq, updated_at
            FROM cursors
            WHERE stream_id = $1
            "#,
        )
        .bind(stream_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_cursor).transpose()
    }

    #[tracing::instrument(skip(self), fields(stream = %stream_id, position = %position))]
    async fn save(&self, stream_id: &StreamId, position: &EventId) -> Result<()> {
        let event_seq = i64::try_from(position.event_seq)
            .map_err(|_| StoreError::OutOfRange(format!("event_seq {}", position.event_seq)))?;

        sqlx::query(
            r#"
            INSERT INTO cursors (stream_id, tx_digest, event_seq, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (stream_id) DO UPDATE SET
                tx_digest = EXCLUDED.tx_digest,
                event_seq = EXCLUDED.event_seq,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(stream_id.as_str())
        .bind(&position.tx_digest)
        .bind(event_seq)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Cursor>> {
        let rows = sqlx::query(
            r#"
            SELECT stream_id, tx_digest, event_seq, updated_at
            FROM cursors
            ORDER BY stream_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_cursor).collect()
    }
}

#[async_trait]
impl ProjectionStore for PostgresStore {
    #[tracing::instrument(skip(self, update), fields(object_id = %update.object_id))]
    async fn upsert_locked(&self, update: LockedUpdate) -> Result<LockedRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO locked (object_id, key_id, creator, item_id, deleted)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (object_id) DO UPDATE SET
                key_id = COALESCE(EXCLUDED.key_id, locked.key_id),
                creator = COALESCE(EXCLUDED.creator, locked.creator),
                item_id = COALESCE(EXCLUDED.item_id, locked.item_id),
                deleted = locked.deleted OR EXCLUDED.deleted
            RETURNING id, object_id, key_id, creator, item_id, deleted
            "#,
        )
        .bind(update.object_id.as_str())
        .bind(update.key_id)
        .bind(update.creator)
        .bind(update.item_id)
        .bind(update.deleted)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_locked(row)
    }

    #[tracing::instrument(skip(self, update), fields(object_id = %update.object_id))]
    async fn upsert_escrow(&self, update: EscrowUpdate) -> Result<EscrowRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO escrows (object_id, sender, recipient, key_id, item_id, swapped, cancelled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (object_id) DO UPDATE SET
                sender = COALESCE(EXCLUDED.sender, escrows.sender),
                recipient = COALESCE(EXCLUDED.recipient, escrows.recipient),
                key_id = COALESCE(EXCLUDED.key_id, escrows.key_id),
                item_id = COALESCE(EXCLUDED.item_id, escrows.item_id),
                swapped = escrows.swapped OR EXCLUDED.swapped,
                cancelled = escrows.cancelled OR EXCLUDED.cancelled
            RETURNING id, object_id, sender, recipient, key_id, item_id, swapped, cancelled
            "#,
        )
        .bind(update.object_id.as_str())
        .bind(update.sender)
        .bind(update.recipient)
        .bind(update.key_id)
        .bind(update.item_id)
        .bind(update.swapped)
        .bind(update.cancelled)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_escrow(row)
    }

    async fn get_locked(&self, object_id: &ObjectId) -> Result<Option<LockedRecord>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {LOCKED_COLUMNS} FROM locked WHERE object_id = $1"
        ))
        .bind(object_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_locked).transpose()
    }

    async fn get_escrow(&self, object_id: &ObjectId) -> Result<Option<EscrowRecord>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrows WHERE object_id = $1"
        ))
        .bind(object_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_escrow).transpose()
    }

    async fn query_locked(
        &self,
        filter: &LockedFilter,
        pagination: &Pagination,
    ) -> Result<Page<LockedRecord>> {
        let mut conditions = Conditions::default();
        conditions.id(filter.id);
        conditions.text("object_id", &filter.object_id.as_ref().map(|o| o.to_string()));
        conditions.text("creator", &filter.creator);
        conditions.text("key_id", &filter.key_id);
        conditions.flag("deleted", filter.deleted);
        conditions.page(pagination);

        self.fetch_page(
            conditions,
            LOCKED_COLUMNS,
            "locked",
            pagination,
            Self::row_to_locked,
        )
        .await
    }

    async fn query_escrows(
        &self,
        filter: &EscrowFilter,
        pagination: &Pagination,
    ) -> Result<Page<EscrowRecord>> {
        let mut conditions = Conditions::default();
        conditions.id(filter.id);
        conditions.text("object_id", &filter.object_id.as_ref().map(|o| o.to_string()));
        conditions.text("sender", &filter.sender);
        conditions.text("recipient", &filter.recipient);
        conditions.text("key_id", &filter.key_id);
        conditions.flag("swapped", filter.swapped);
        conditions.flag("cancelled", filter.cancelled);
        conditions.page(pagination);

        self.fetch_page(
            conditions,
            ESCROW_COLUMNS,
            "escrows",
            pagination,
            Self::row_to_escrow,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_filtered_descending_query() {
        let mut conditions = Conditions::default();
        conditions.text("creator", &Some("C1".into()));
        conditions.flag("deleted", Some(false));
        let pagination = Pagination::new(2).after(SurrogateId::new(5));
        conditions.page(&pagination);

        let sql = conditions.to_sql(LOCKED_COLUMNS, "locked", &pagination);
        assert_eq!(
            sql,
            "SELECT id, object_id, key_id, creator, item_id, deleted FROM locked WHERE 1=1 \
             AND creator = $1 AND deleted = $2 AND id < $3 ORDER BY id DESC LIMIT $4"
        );
        assert_eq!(conditions.binds.len(), 3);
    }

    #[test]
    fn id_filter_binds_an_integer() {
        let mut conditions = Conditions::default();
        conditions.id(Some(SurrogateId::new(7)));
        conditions.id(None);

        assert_eq!(conditions.clauses, vec!["id = $1".to_string()]);
        assert!(matches!(conditions.binds[..], [Bind::Int(7)]));
    }

    #[test]
    fn builds_unfiltered_ascending_query() {
        let conditions = Conditions::default();
        let pagination = Pagination::new(10).sort(SortOrder::Ascending);
        let sql = conditions.to_sql(ESCROW_COLUMNS, "escrows", &pagination);
        assert!(sql.ends_with("WHERE 1=1 ORDER BY id ASC LIMIT $1"));
    }
}
