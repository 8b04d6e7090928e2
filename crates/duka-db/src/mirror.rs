//! # Mirror Tables
//!
//! One generic helper for every mirrored entity: upsert by primary key,
//! read back with the `synced` flag, scan pending rows.
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Mirror Write Paths                                │
//! │                                                                         │
//! │  upsert(record, synced)                                                │
//! │  ├── online write round-tripped   → synced = 1                         │
//! │  └── offline / fallback write     → synced = 0   (pending)             │
//! │                                                                         │
//! │  refresh(record)   (remote pull, refresh-on-read)                      │
//! │  ├── no local row                 → inserted with synced = 1           │
//! │  ├── local row synced = 1         → overwritten (remote wins on read)  │
//! │  └── local row synced = 0         → UNTOUCHED (local wins until push)  │
//! │                                                                         │
//! │  mark_synced(id)   (after a successful push)                           │
//! │  └── synced = 0 → 1, row content unchanged                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes are always `INSERT ... ON CONFLICT(id) DO UPDATE`, so at most one
//! row exists per primary key and no writer does read-modify-write.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use duka_core::{Filter, FilterValue, Record};

/// A SQLite query with positional arguments.
pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

// =============================================================================
// MirrorRecord Trait
// =============================================================================

/// An entity stored in the mirror.
///
/// `COLUMNS` lists every column except `synced`, `id` first, in the order
/// `bind_columns` binds them.
pub trait MirrorRecord:
    Record + Serialize + DeserializeOwned + for<'r> FromRow<'r, SqliteRow> + Unpin
{
    /// Table name, identical locally and remotely.
    const TABLE: &'static str;

    /// Column names in bind order.
    const COLUMNS: &'static [&'static str];

    /// Binds every column value, in `COLUMNS` order.
    fn bind_columns<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;
}

/// A mirrored row together with its bookkeeping flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRow<R> {
    pub record: R,
    /// `false` while the row is a local-only pending write.
    pub synced: bool,
}

impl<R> MirrorRow<R> {
    pub fn is_pending(&self) -> bool {
        !self.synced
    }
}

// =============================================================================
// SQL Builders
// =============================================================================

fn upsert_sql(table: &str, columns: &[&str], only_if_synced: bool) -> String {
    let placeholders = vec!["?"; columns.len() + 1].join(", ");
    let assignments = columns
        .iter()
        .skip(1)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {table} ({}, synced) VALUES ({placeholders}) \
         ON CONFLICT(id) DO UPDATE SET {assignments}, synced = excluded.synced",
        columns.join(", ")
    );
    if only_if_synced {
        sql.push_str(&format!(" WHERE {table}.synced = 1"));
    }
    sql
}

fn select_sql(table: &str, columns: &[&str]) -> String {
    format!("SELECT {}, synced FROM {table}", columns.join(", "))
}

fn decode_row<R: MirrorRecord>(row: &SqliteRow) -> DbResult<MirrorRow<R>> {
    let record = R::from_row(row)?;
    let synced: bool = row.try_get("synced")?;
    Ok(MirrorRow { record, synced })
}

// =============================================================================
// MirrorTable
// =============================================================================

/// Typed access to the mirror table of `R`.
pub struct MirrorTable<R> {
    pool: SqlitePool,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for MirrorTable<R> {
    fn clone(&self) -> Self {
        MirrorTable {
            pool: self.pool.clone(),
            _record: PhantomData,
        }
    }
}

impl<R> std::fmt::Debug for MirrorTable<R>
where
    R: MirrorRecord,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorTable").field("table", &R::TABLE).finish()
    }
}

impl<R: MirrorRecord> MirrorTable<R> {
    pub fn new(pool: SqlitePool) -> Self {
        MirrorTable {
            pool,
            _record: PhantomData,
        }
    }

    pub fn table(&self) -> &'static str {
        R::TABLE
    }

    /// Inserts or replaces the row, setting `synced` as given.
    pub async fn upsert(&self, record: &R, synced: bool) -> DbResult<()> {
        let sql = upsert_sql(R::TABLE, R::COLUMNS, false);

        record
            .bind_columns(sqlx::query(&sql))
            .bind(synced)
            .execute(&self.pool)
            .await?;

        debug!(table = R::TABLE, id = record.id(), synced, "Mirror upsert");
        Ok(())
    }

    /// Stores a row pulled from the remote store unless a pending local
    /// row holds the same key.
    ///
    /// ## Returns
    /// * `true` - the row was inserted or overwritten
    /// * `false` - a pending local row was kept
    pub async fn refresh(&self, record: &R) -> DbResult<bool> {
        let sql = upsert_sql(R::TABLE, R::COLUMNS, true);

        let result = record
            .bind_columns(sqlx::query(&sql))
            .bind(true)
            .execute(&self.pool)
            .await?;

        let applied = result.rows_affected() > 0;
        debug!(table = R::TABLE, id = record.id(), applied, "Mirror refresh");
        Ok(applied)
    }

    /// `refresh` for many rows in one transaction. Returns how many were
    /// applied.
    pub async fn refresh_all(&self, records: &[R]) -> DbResult<usize> {
        let sql = upsert_sql(R::TABLE, R::COLUMNS, true);
        let mut tx = self.pool.begin().await?;
        let mut applied = 0;

        for record in records {
            let result = record
                .bind_columns(sqlx::query(&sql))
                .bind(true)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() > 0 {
                applied += 1;
            }
        }

        tx.commit().await?;

        debug!(
            table = R::TABLE,
            total = records.len(),
            applied,
            "Mirror bulk refresh"
        );
        Ok(applied)
    }

    /// Reads one row by primary key.
    pub async fn get(&self, id: &str) -> DbResult<Option<MirrorRow<R>>> {
        let sql = format!("{} WHERE id = ?", select_sql(R::TABLE, R::COLUMNS));

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_row::<R>).transpose()
    }

    /// Reads rows matching an equality filter, oldest first.
    ///
    /// ## Errors
    /// `DbError::QueryFailed` when the filter names a column `R` doesn't have.
    pub async fn list(&self, filter: &Filter) -> DbResult<Vec<MirrorRow<R>>> {
        let mut sql = select_sql(R::TABLE, R::COLUMNS);

        for (i, (column, _)) in filter.conditions().iter().enumerate() {
            if !R::COLUMNS.contains(&column.as_str()) {
                return Err(DbError::QueryFailed(format!(
                    "unknown column '{column}' on {}",
                    R::TABLE
                )));
            }
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(column);
            sql.push_str(" = ?");
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = filter.max_rows() {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        for (_, value) in filter.conditions() {
            query = match value {
                FilterValue::Text(s) => query.bind(s.as_str()),
                FilterValue::Int(i) => query.bind(*i),
                FilterValue::Bool(b) => query.bind(*b),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row::<R>).collect()
    }

    /// Records only, without the flag.
    pub async fn records(&self, filter: &Filter) -> DbResult<Vec<R>> {
        Ok(self
            .list(filter)
            .await?
            .into_iter()
            .map(|row| row.record)
            .collect())
    }

    /// Rows with `synced = 0`, oldest `created_at` first.
    pub async fn pending(&self) -> DbResult<Vec<R>> {
        let sql = format!(
            "{} WHERE synced = 0 ORDER BY created_at ASC, id ASC",
            select_sql(R::TABLE, R::COLUMNS)
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| decode_row::<R>(row).map(|r| r.record))
            .collect()
    }

    /// Flips a row to `synced = 1`. Returns whether the row exists.
    pub async fn mark_synced(&self, id: &str) -> DbResult<bool> {
        let sql = format!("UPDATE {} SET synced = 1 WHERE id = ?", R::TABLE);

        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;

        debug!(table = R::TABLE, id, "Mirror row marked synced");
        Ok(result.rows_affected() > 0)
    }

    /// Removes a row. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", R::TABLE);

        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;

        debug!(table = R::TABLE, id, "Mirror row deleted");
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE synced = 0", R::TABLE);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::{Duration, Utc};
    use duka_core::{Customer, CustomerPatch, NewCustomer, Patch};

    async fn customers() -> (Database, MirrorTable<Customer>) {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();
        let table = db.mirror::<Customer>();
        (db, table)
    }

    fn jane() -> Customer {
        Customer::create(
            uuid::Uuid::new_v4().to_string(),
            NewCustomer::new("Jane", "+255700000001").with_email("jane@duka.co.tz"),
            Utc::now(),
        )
    }

    #[test]
    fn test_upsert_sql_shape() {
        let sql = upsert_sql("customers", &["id", "name"], true);
        assert_eq!(
            sql,
            "INSERT INTO customers (id, name, synced) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, synced = excluded.synced \
             WHERE customers.synced = 1"
        );
    }

    #[tokio::test]
    async fn test_upsert_then_get() {
        let (_db, table) = customers().await;
        let customer = jane();

        table.upsert(&customer, false).await.unwrap();

        let row = table.get(&customer.id).await.unwrap().unwrap();
        assert_eq!(row.record, customer);
        assert!(row.is_pending());
        assert!(table.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_row_per_key() {
        let (_db, table) = customers().await;
        let mut customer = jane();

        table.upsert(&customer, false).await.unwrap();
        customer.name = "Jane Doe".to_string();
        table.upsert(&customer, true).await.unwrap();

        assert_eq!(table.count().await.unwrap(), 1);
        let row = table.get(&customer.id).await.unwrap().unwrap();
        assert_eq!(row.record.name, "Jane Doe");
        assert!(row.synced);
    }

    #[tokio::test]
    async fn test_refresh_never_clobbers_pending_row() {
        let (_db, table) = customers().await;
        let local = jane();
        table.upsert(&local, false).await.unwrap();

        let mut remote = local.clone();
        remote.name = "Remote Name".to_string();
        assert!(!table.refresh(&remote).await.unwrap());

        let row = table.get(&local.id).await.unwrap().unwrap();
        assert_eq!(row.record.name, "Jane");
        assert!(!row.synced);

        // Once pushed, remote state wins again.
        table.mark_synced(&local.id).await.unwrap();
        assert!(table.refresh(&remote).await.unwrap());
        let row = table.get(&local.id).await.unwrap().unwrap();
        assert_eq!(row.record.name, "Remote Name");
    }

    #[tokio::test]
    async fn test_refresh_inserts_unknown_rows_as_synced() {
        let (_db, table) = customers().await;
        let rows = vec![jane(), jane()];

        assert_eq!(table.refresh_all(&rows).await.unwrap(), 2);
        assert_eq!(table.count_pending().await.unwrap(), 0);
        assert_eq!(table.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_pending_oldest_first_and_mark_synced() {
        let (_db, table) = customers().await;
        let mut older = jane();
        older.created_at = Utc::now() - Duration::hours(1);
        let newer = jane();

        table.upsert(&newer, false).await.unwrap();
        table.upsert(&older, false).await.unwrap();

        let pending = table.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, older.id);

        assert!(table.mark_synced(&older.id).await.unwrap());
        assert_eq!(table.count_pending().await.unwrap(), 1);
        assert!(!table.mark_synced("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_with_filter() {
        let (_db, table) = customers().await;
        let active = jane();
        let mut inactive = jane();
        CustomerPatch::deactivate().apply_to(&mut inactive, Utc::now());

        table.upsert(&active, true).await.unwrap();
        table.upsert(&inactive, true).await.unwrap();

        let rows = table
            .records(&Filter::new().eq("status", "inactive"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, inactive.id);

        assert_eq!(table.list(&Filter::new().limit(1)).await.unwrap().len(), 1);
        assert!(matches!(
            table.list(&Filter::new().eq("synced", 0i64)).await,
            Err(DbError::QueryFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_db, table) = customers().await;
        let customer = jane();
        table.upsert(&customer, true).await.unwrap();

        assert!(table.delete(&customer.id).await.unwrap());
        assert!(!table.delete(&customer.id).await.unwrap());
        assert!(table.get(&customer.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_store_errors() {
        let (db, table) = customers().await;
        db.close().await;

        assert!(matches!(
            table.upsert(&jane(), false).await,
            Err(DbError::ConnectionFailed(_))
        ));
    }
}
