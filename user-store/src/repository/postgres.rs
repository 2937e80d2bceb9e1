//! PostgreSQL store
//!
//! Rows cross the wire as `jsonb`: reads select `to_jsonb(table.*)` and
//! writes expand a bound JSON document with `jsonb_populate_record(set)`, so
//! every entity field maps onto the column of the same name and PostgreSQL
//! performs the type conversion. Timestamp columns must be `timestamptz` for
//! the JSON form to carry an offset.

use std::sync::Arc;

use serde_json::Value;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{Executor, Postgres, QueryBuilder};
use tokio::sync::Mutex;
use tracing::debug;

use super::entity::{row_id, Row, ID_COLUMN};
use super::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use super::store::{Store, StoreTransaction, Transactional};
use crate::query::sql::{count_rows, push_where, select_rows};
use crate::query::Query;

fn storage_error(err: sqlx::Error, operation: RepositoryOperation) -> RepositoryError {
    RepositoryError::from(err).with_operation(operation)
}

fn into_row(value: Value, operation: RepositoryOperation) -> RepositoryResult<Row> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(RepositoryError::serialization_error(
            operation,
            format!("expected a JSON object row, got {}", other),
        )),
    }
}

fn quote(column: &str) -> String {
    format!("\"{}\"", column.replace('"', "\"\""))
}

fn reject_joins(query: &Query, operation: RepositoryOperation) -> RepositoryResult<()> {
    if !query.joins().is_empty() {
        return Err(RepositoryError::unsupported(
            operation,
            "join clauses are only supported on reads",
        ));
    }
    Ok(())
}

/// Columns for an insert: the union of row keys in first-seen order
///
/// `id` is written only when every row carries a non-zero id; otherwise the
/// column default assigns it.
fn insert_columns(rows: &[Row]) -> Vec<String> {
    let explicit_ids = rows.iter().all(|r| row_id(r).is_some_and(|id| id != 0));
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if key == ID_COLUMN && !explicit_ids {
                continue;
            }
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

async fn fetch_rows<'e, E>(executor: E, table: &str, query: &Query) -> RepositoryResult<Vec<Row>>
where
    E: Executor<'e, Database = Postgres>,
{
    let operation = RepositoryOperation::FindAll;
    let mut qb = select_rows(table, query)?;
    debug!(table, sql = qb.sql(), "fetching rows");

    let values: Vec<Json<Value>> = qb
        .build_query_scalar()
        .fetch_all(executor)
        .await
        .map_err(|e| storage_error(e, operation))?;
    values
        .into_iter()
        .map(|Json(value)| into_row(value, operation))
        .collect()
}

async fn count_matching<'e, E>(executor: E, table: &str, query: &Query) -> RepositoryResult<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let operation = RepositoryOperation::Count;
    let mut qb = count_rows(table, query)?;
    debug!(table, sql = qb.sql(), "counting rows");

    let count: i64 = qb
        .build_query_scalar()
        .fetch_one(executor)
        .await
        .map_err(|e| storage_error(e, operation))?;
    Ok(u64::try_from(count).unwrap_or_default())
}

async fn insert_rows<'e, E>(executor: E, table: &str, rows: Vec<Row>) -> RepositoryResult<Vec<Row>>
where
    E: Executor<'e, Database = Postgres>,
{
    let operation = RepositoryOperation::Create;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let columns = insert_columns(&rows)
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ");
    let document = Value::Array(rows.into_iter().map(Value::Object).collect());

    let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_recordset(NULL::{table}, "
    ));
    qb.push_bind(Json(document));
    qb.push(format!(") RETURNING to_jsonb({table}.*)"));
    debug!(table, sql = qb.sql(), "inserting rows");

    let values: Vec<Json<Value>> = qb
        .build_query_scalar()
        .fetch_all(executor)
        .await
        .map_err(|e| storage_error(e, operation))?;
    values
        .into_iter()
        .map(|Json(value)| into_row(value, operation))
        .collect()
}

async fn update_rows<'e, E>(
    executor: E,
    table: &str,
    fields: Row,
    query: &Query,
) -> RepositoryResult<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let operation = RepositoryOperation::Update;
    reject_joins(query, operation)?;

    let columns: Vec<String> = fields
        .keys()
        .filter(|c| c.as_str() != ID_COLUMN)
        .cloned()
        .collect();
    if columns.is_empty() {
        return Err(RepositoryError::validation_failed(
            operation,
            "no columns to update",
        ));
    }

    let mut qb: QueryBuilder<'static, Postgres> =
        QueryBuilder::new("WITH src AS (SELECT * FROM jsonb_populate_record(NULL::");
    qb.push(table).push(", ");
    qb.push_bind(Json(Value::Object(fields)));
    qb.push(format!(")) UPDATE {table} SET "));
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        let column = quote(column);
        qb.push(format!("{column} = (SELECT {column} FROM src)"));
    }
    push_where(&mut qb, table, query, operation)?;
    debug!(table, sql = qb.sql(), "updating rows");

    let result = qb
        .build()
        .execute(executor)
        .await
        .map_err(|e| storage_error(e, operation))?;
    Ok(result.rows_affected())
}

async fn delete_rows<'e, E>(executor: E, table: &str, query: &Query) -> RepositoryResult<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let operation = RepositoryOperation::Delete;
    reject_joins(query, operation)?;

    let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new(format!("DELETE FROM {table}"));
    push_where(&mut qb, table, query, operation)?;
    debug!(table, sql = qb.sql(), "deleting rows");

    let result = qb
        .build()
        .execute(executor)
        .await
        .map_err(|e| storage_error(e, operation))?;
    Ok(result.rows_affected())
}

/// [`Store`] backed by a PostgreSQL connection pool
///
/// # Example
///
/// ```rust,ignore
/// use user_store::database::create_pool;
/// use user_store::repository::PgStore;
///
/// let pool = create_pool(&config.database.unwrap()).await?;
/// let store = PgStore::new(pool);
/// ```
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PgStore {
    async fn fetch(&self, table: &str, query: &Query) -> RepositoryResult<Vec<Row>> {
        fetch_rows(&self.pool, table, query).await
    }

    async fn count(&self, table: &str, query: &Query) -> RepositoryResult<u64> {
        count_matching(&self.pool, table, query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> RepositoryResult<Vec<Row>> {
        insert_rows(&self.pool, table, rows).await
    }

    async fn update(&self, table: &str, fields: Row, query: &Query) -> RepositoryResult<u64> {
        update_rows(&self.pool, table, fields, query).await
    }

    async fn delete(&self, table: &str, query: &Query) -> RepositoryResult<u64> {
        delete_rows(&self.pool, table, query).await
    }
}

type SharedTx = Arc<Mutex<Option<sqlx::Transaction<'static, Postgres>>>>;

/// An open PostgreSQL transaction
///
/// Statements run one at a time on the transaction's connection.
#[derive(Debug, Clone)]
pub struct PgTransaction {
    inner: SharedTx,
}

fn finished() -> RepositoryError {
    RepositoryError::database_error(
        RepositoryOperation::Transaction,
        "transaction already finished",
    )
}

impl Transactional for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> RepositoryResult<PgTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error(e, RepositoryOperation::Transaction))?;
        Ok(PgTransaction {
            inner: Arc::new(Mutex::new(Some(tx))),
        })
    }
}

impl Store for PgTransaction {
    async fn fetch(&self, table: &str, query: &Query) -> RepositoryResult<Vec<Row>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        fetch_rows(&mut **tx, table, query).await
    }

    async fn count(&self, table: &str, query: &Query) -> RepositoryResult<u64> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        count_matching(&mut **tx, table, query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> RepositoryResult<Vec<Row>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        insert_rows(&mut **tx, table, rows).await
    }

    async fn update(&self, table: &str, fields: Row, query: &Query) -> RepositoryResult<u64> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        update_rows(&mut **tx, table, fields, query).await
    }

    async fn delete(&self, table: &str, query: &Query) -> RepositoryResult<u64> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        delete_rows(&mut **tx, table, query).await
    }
}

impl StoreTransaction for PgTransaction {
    async fn commit(self) -> RepositoryResult<()> {
        let tx = self.inner.lock().await.take().ok_or_else(finished)?;
        tx.commit()
            .await
            .map_err(|e| storage_error(e, RepositoryOperation::Transaction))
    }

    async fn rollback(self) -> RepositoryResult<()> {
        let tx = self.inner.lock().await.take().ok_or_else(finished)?;
        tx.rollback()
            .await
            .map_err(|e| storage_error(e, RepositoryOperation::Transaction))
    }
}
