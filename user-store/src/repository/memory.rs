//! In-process store
//!
//! [`MemoryStore`] keeps tables as vectors of JSON rows behind a
//! `tokio::sync::RwLock`. It evaluates predicates itself, so raw SQL
//! fragments (conditions and joins) are rejected with
//! [`RepositoryErrorKind::Unsupported`](super::RepositoryErrorKind::Unsupported).
//!
//! Transactions work on a snapshot of all tables and publish it on commit.
//! Writes made to the parent store while a transaction is open are lost when
//! it commits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use super::entity::{row_id, Row, DELETED_AT_COLUMN, ID_COLUMN};
use super::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use super::store::{Store, StoreTransaction, Transactional};
use crate::query::eval::{column_value, matches_all, sort_rows};
use crate::query::Query;

#[derive(Debug, Clone, Default)]
struct Table {
    next_id: i64,
    rows: Vec<Row>,
    unique: Vec<String>,
}

impl Table {
    fn check_unique(&self, candidate: &Row, skip: Option<usize>) -> RepositoryResult<()> {
        for column in &self.unique {
            let value = column_value(candidate, column);
            if value.is_null() {
                continue;
            }
            let taken = self
                .rows
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .any(|(_, row)| column_value(row, column) == value);
            if taken {
                return Err(RepositoryError::already_exists(
                    RepositoryOperation::Create,
                    format!("duplicate key value violates unique constraint on {}", column),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: RwLock<HashMap<String, Table>>,
    reads: AtomicU64,
}

/// In-process [`Store`] implementation
///
/// Clones share the same tables.
///
/// # Example
///
/// ```rust
/// use user_store::repository::MemoryStore;
///
/// # async fn example() {
/// let store = MemoryStore::new();
/// store.add_unique("users", "email").await;
/// assert_eq!(store.read_count(), 0);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce uniqueness of `column` in `table` on insert and update
    pub async fn add_unique(&self, table: &str, column: &str) {
        let mut tables = self.inner.tables.write().await;
        let entry = tables.entry(table.to_string()).or_default();
        if !entry.unique.iter().any(|c| c == column) {
            entry.unique.push(column.to_string());
        }
    }

    /// Number of `fetch` and `count` calls served so far
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    /// Every row of `table`, soft-deleted included, in insertion order
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .tables
            .read()
            .await
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    async fn snapshot(&self) -> HashMap<String, Table> {
        self.inner.tables.read().await.clone()
    }

    async fn replace(&self, tables: HashMap<String, Table>) {
        *self.inner.tables.write().await = tables;
    }

    fn reject_raw(query: &Query, operation: RepositoryOperation) -> RepositoryResult<()> {
        if query.has_raw_sql() {
            return Err(RepositoryError::unsupported(
                operation,
                "raw SQL fragments require a SQL store",
            ));
        }
        Ok(())
    }

    fn selected(table: &Table, query: &Query, operation: RepositoryOperation) -> RepositoryResult<Vec<usize>> {
        let mut indices = Vec::new();
        for (i, row) in table.rows.iter().enumerate() {
            if !query.is_unscoped() && !column_value(row, DELETED_AT_COLUMN).is_null() {
                continue;
            }
            let hit = matches_all(query.conditions(), row).map_err(|_| {
                RepositoryError::unsupported(operation, "raw SQL fragments require a SQL store")
            })?;
            if hit {
                indices.push(i);
            }
        }
        Ok(indices)
    }
}

impl Store for MemoryStore {
    async fn fetch(&self, table: &str, query: &Query) -> RepositoryResult<Vec<Row>> {
        let operation = RepositoryOperation::FindAll;
        Self::reject_raw(query, operation)?;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);

        let tables = self.inner.tables.read().await;
        let Some(data) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Row> = Self::selected(data, query, operation)?
            .into_iter()
            .map(|i| data.rows[i].clone())
            .collect();
        drop(tables);

        if let Some(order) = query.ordering() {
            sort_rows(&mut rows, order);
        }
        let offset = usize::try_from(query.offset_value().unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = query
            .limit_value()
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, table: &str, query: &Query) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::Count;
        Self::reject_raw(query, operation)?;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);

        let tables = self.inner.tables.read().await;
        match tables.get(table) {
            Some(data) => Ok(Self::selected(data, query, operation)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> RepositoryResult<Vec<Row>> {
        let mut tables = self.inner.tables.write().await;
        let data = tables.entry(table.to_string()).or_default();

        // validate the whole batch against a scratch copy so a failure leaves
        // the table untouched
        let mut scratch = data.clone();
        let mut stored = Vec::with_capacity(rows.len());
        for mut row in rows {
            let id = match row_id(&row) {
                Some(id) if id != 0 => {
                    if scratch.rows.iter().any(|r| row_id(r) == Some(id)) {
                        return Err(RepositoryError::already_exists(
                            RepositoryOperation::Create,
                            format!("duplicate key value violates unique constraint on {}", ID_COLUMN),
                        )
                        .with_entity(table, id.to_string()));
                    }
                    id
                }
                _ => scratch.next_id + 1,
            };
            scratch.next_id = scratch.next_id.max(id);
            row.insert(ID_COLUMN.to_string(), Value::from(id));
            scratch.check_unique(&row, None)?;
            scratch.rows.push(row.clone());
            stored.push(row);
        }
        *data = scratch;
        Ok(stored)
    }

    async fn update(&self, table: &str, fields: Row, query: &Query) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::Update;
        Self::reject_raw(query, operation)?;

        let mut tables = self.inner.tables.write().await;
        let Some(data) = tables.get_mut(table) else {
            return Ok(0);
        };

        let indices = Self::selected(data, query, operation)?;
        let mut scratch = data.clone();
        for &i in &indices {
            let mut row = scratch.rows[i].clone();
            for (column, value) in &fields {
                if column != ID_COLUMN {
                    row.insert(column.clone(), value.clone());
                }
            }
            scratch
                .check_unique(&row, Some(i))
                .map_err(|e| e.with_operation(operation))?;
            scratch.rows[i] = row;
        }
        *data = scratch;
        Ok(indices.len() as u64)
    }

    async fn delete(&self, table: &str, query: &Query) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::Delete;
        Self::reject_raw(query, operation)?;

        let mut tables = self.inner.tables.write().await;
        let Some(data) = tables.get_mut(table) else {
            return Ok(0);
        };

        let doomed = Self::selected(data, query, operation)?;
        let mut index = 0;
        data.rows.retain(|_| {
            let keep = !doomed.contains(&index);
            index += 1;
            keep
        });
        Ok(doomed.len() as u64)
    }
}

/// Transaction over a [`MemoryStore`] snapshot
#[derive(Debug, Clone)]
pub struct MemoryTransaction {
    parent: MemoryStore,
    work: MemoryStore,
    finished: Arc<AtomicBool>,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> RepositoryResult<()> {
        if self.finished.load(Ordering::Acquire) {
            return Err(RepositoryError::database_error(
                RepositoryOperation::Transaction,
                "transaction already finished",
            ));
        }
        Ok(())
    }

    fn finish(&self) -> RepositoryResult<()> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(RepositoryError::database_error(
                RepositoryOperation::Transaction,
                "transaction already finished",
            ));
        }
        Ok(())
    }
}

impl Transactional for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> RepositoryResult<MemoryTransaction> {
        let work = MemoryStore::new();
        work.replace(self.snapshot().await).await;
        Ok(MemoryTransaction {
            parent: self.clone(),
            work,
            finished: Arc::default(),
        })
    }
}

impl Store for MemoryTransaction {
    async fn fetch(&self, table: &str, query: &Query) -> RepositoryResult<Vec<Row>> {
        self.ensure_open()?;
        self.parent.inner.reads.fetch_add(1, Ordering::Relaxed);
        self.work.fetch(table, query).await
    }

    async fn count(&self, table: &str, query: &Query) -> RepositoryResult<u64> {
        self.ensure_open()?;
        self.parent.inner.reads.fetch_add(1, Ordering::Relaxed);
        self.work.count(table, query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> RepositoryResult<Vec<Row>> {
        self.ensure_open()?;
        self.work.insert(table, rows).await
    }

    async fn update(&self, table: &str, fields: Row, query: &Query) -> RepositoryResult<u64> {
        self.ensure_open()?;
        self.work.update(table, fields, query).await
    }

    async fn delete(&self, table: &str, query: &Query) -> RepositoryResult<u64> {
        self.ensure_open()?;
        self.work.delete(table, query).await
    }
}

impl StoreTransaction for MemoryTransaction {
    async fn commit(self) -> RepositoryResult<()> {
        self.finish()?;
        self.parent.replace(self.work.snapshot().await).await;
        Ok(())
    }

    async fn rollback(self) -> RepositoryResult<()> {
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderBy, Predicate, RawSql};
    use crate::repository::RepositoryErrorKind;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = MemoryStore::new();
        let stored = store
            .insert("t", vec![row(json!({"name": "a"})), row(json!({"id": 0, "name": "b"}))])
            .await
            .unwrap();
        assert_eq!(row_id(&stored[0]), Some(1));
        assert_eq!(row_id(&stored[1]), Some(2));
    }

    #[tokio::test]
    async fn test_unique_violation_leaves_table_untouched() {
        let store = MemoryStore::new();
        store.add_unique("users", "email").await;
        store
            .insert("users", vec![row(json!({"email": "a@b.c", "deleted_at": null}))])
            .await
            .unwrap();

        let err = store
            .insert(
                "users",
                vec![
                    row(json!({"email": "x@y.z", "deleted_at": null})),
                    row(json!({"email": "a@b.c", "deleted_at": null})),
                ],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::AlreadyExists);
        assert_eq!(store.rows("users").await.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_window_and_scope() {
        let store = MemoryStore::new();
        store
            .insert(
                "t",
                vec![
                    row(json!({"n": 3, "deleted_at": null})),
                    row(json!({"n": 1, "deleted_at": null})),
                    row(json!({"n": 2, "deleted_at": "2024-01-01T00:00:00Z"})),
                ],
            )
            .await
            .unwrap();

        let live = store
            .fetch("t", &Query::new().order_by(OrderBy::asc("n")))
            .await
            .unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0]["n"], json!(1));

        let all = store.fetch("t", &Query::new().unscoped()).await.unwrap();
        assert_eq!(all.len(), 3);

        let page = store
            .fetch("t", &Query::new().unscoped().order_by(OrderBy::asc("n")).offset(1).limit(1))
            .await
            .unwrap();
        assert_eq!(page[0]["n"], json!(2));
        assert_eq!(store.read_count(), 3);
    }

    #[tokio::test]
    async fn test_raw_sql_rejected() {
        let store = MemoryStore::new();
        let err = store
            .fetch("t", &Query::new().filter(RawSql::new("1 = 1")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_update_and_delete_counts() {
        let store = MemoryStore::new();
        store
            .insert(
                "t",
                vec![row(json!({"k": "a", "v": 1})), row(json!({"k": "b", "v": 1}))],
            )
            .await
            .unwrap();

        let changed = store
            .update("t", row(json!({"v": 2})), &Query::new().filter(Predicate::eq("k", "a")))
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let removed = store
            .delete("t", &Query::new().filter(Predicate::eq("v", 1_i64)))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.rows("t").await[0]["v"], json!(2));
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let store = MemoryStore::new();

        let tx = store.begin().await.unwrap();
        tx.insert("t", vec![row(json!({"k": "a"}))]).await.unwrap();
        assert!(store.rows("t").await.is_empty());
        tx.commit().await.unwrap();
        assert_eq!(store.rows("t").await.len(), 1);

        let tx = store.begin().await.unwrap();
        tx.insert("t", vec![row(json!({"k": "b"}))]).await.unwrap();
        tx.clone().rollback().await.unwrap();
        assert_eq!(store.rows("t").await.len(), 1);
        assert!(tx.fetch("t", &Query::new()).await.is_err());
    }
}
