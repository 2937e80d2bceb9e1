//! Storage collaborator traits
//!
//! A [`Store`] executes query contexts against named tables and moves rows as
//! JSON objects. It knows nothing about entities or filter semantics; the
//! repository layers those on top.
//!
//! The traits use return-position `impl Future + Send` so implementations can
//! be written with plain `async fn` and used from multi-threaded runtimes.
//!
//! # Soft-delete scope
//!
//! Unless a query is [`unscoped`](crate::query::Query::unscoped), every
//! operation only sees rows whose `deleted_at` is null. This applies to
//! reads, counts, updates and deletes alike.

use std::future::Future;

use super::entity::Row;
use super::error::RepositoryResult;
use crate::query::Query;

/// Row-level storage operations
pub trait Store: Clone + Send + Sync + 'static {
    /// Rows of `table` matching `query`, honoring joins, ordering, limit and
    /// offset. Preloads are resolved by the caller.
    fn fetch(
        &self,
        table: &str,
        query: &Query,
    ) -> impl Future<Output = RepositoryResult<Vec<Row>>> + Send;

    /// Number of rows matching `query`, ignoring ordering, limit and offset
    fn count(&self, table: &str, query: &Query)
        -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Insert rows, returning them as stored
    ///
    /// Rows without an `id` (or with `id == 0`) receive a generated one.
    /// The returned rows are in input order.
    fn insert(
        &self,
        table: &str,
        rows: Vec<Row>,
    ) -> impl Future<Output = RepositoryResult<Vec<Row>>> + Send;

    /// Overwrite `fields` on every row matching `query`; returns rows affected
    fn update(
        &self,
        table: &str,
        fields: Row,
        query: &Query,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Physically remove every row matching `query`; returns rows affected
    fn delete(
        &self,
        table: &str,
        query: &Query,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;
}

/// A store that can open transactions
pub trait Transactional: Store {
    /// Transaction handle; also a [`Store`] scoped to the transaction
    type Tx: StoreTransaction;

    /// Open a transaction
    fn begin(&self) -> impl Future<Output = RepositoryResult<Self::Tx>> + Send;
}

/// An open transaction
///
/// Clones share the same underlying transaction. Finishing it through any
/// clone finishes it for all of them; later operations fail.
pub trait StoreTransaction: Store {
    /// Make the transaction's writes durable
    fn commit(self) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Discard the transaction's writes
    fn rollback(self) -> impl Future<Output = RepositoryResult<()>> + Send;
}
