//! Generic repository
//!
//! [`BaseRepository`] gives every [`Entity`] typed CRUD, conditional and
//! join-based lookups, bulk operations, pagination, a read-through cache and
//! transactions over any [`Store`]/[`Cache`] pair.
//!
//! Single-record reads report absence as `Ok(None)`; every other failure is a
//! [`RepositoryError`] carrying the store's message.
//!
//! # Example
//!
//! ```rust,ignore
//! use user_store::cache::MemoryCache;
//! use user_store::query::{build_query, Predicate, Query};
//! use user_store::repository::{BaseRepository, MemoryStore};
//!
//! let users: BaseRepository<User, _, _> = BaseRepository::new(MemoryStore::new(), MemoryCache::new());
//!
//! users.create(&mut user).await?;
//! let found = users.get_by_condition(Predicate::eq("email", "jane@example.com")).await?;
//! let page = users.paginate(Some(build_query(Query::new(), &params)), "id", 20, 1).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::entity::{
    from_row, meta_from_row, to_row, Entity, RelationKind, Row, DELETED_AT_COLUMN, ID_COLUMN,
    IS_DELETED_COLUMN, UPDATED_AT_COLUMN,
};
use super::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use super::pagination::{Pagination, PaginationResult};
use super::store::{Store, StoreTransaction, Transactional};
use crate::cache::Cache;
use crate::query::eval::column_value;
use crate::query::{Condition, FilterOperator, FilterValue, OrderBy, Predicate, Query, RawSql};

/// Lifetime of entries written by [`BaseRepository::get_cached_by_id`]
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Callback run around [`BaseRepository::create_with_hook`]
pub type Hook<'a, T> = &'a (dyn Fn(&mut T) -> RepositoryResult<()> + Send + Sync);

fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Typed data access for one entity type
pub struct BaseRepository<T, S, C> {
    store: S,
    cache: C,
    cache_ttl: Duration,
    _entity: PhantomData<fn() -> T>,
}

impl<T, S: Clone, C: Clone> Clone for BaseRepository<T, S, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            cache_ttl: self.cache_ttl,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity, S: fmt::Debug, C: fmt::Debug> fmt::Debug for BaseRepository<T, S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseRepository")
            .field("entity", &T::NAME)
            .field("store", &self.store)
            .field("cache", &self.cache)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl<T: Entity, S: Store, C: Cache> BaseRepository<T, S, C> {
    /// Repository over `store`, caching through `cache`
    pub fn new(store: S, cache: C) -> Self {
        Self {
            store,
            cache,
            cache_ttl: DEFAULT_CACHE_TTL,
            _entity: PhantomData,
        }
    }

    /// Override the lifetime of cached entities
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The same store and cache, typed for another entity
    pub fn for_entity<U: Entity>(&self) -> BaseRepository<U, S, C> {
        BaseRepository {
            store: self.store.clone(),
            cache: self.cache.clone(),
            cache_ttl: self.cache_ttl,
            _entity: PhantomData,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The underlying cache
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// An unfiltered query over live rows, for callers to refine
    pub fn query(&self) -> Query {
        Query::new()
    }

    fn column(name: &str) -> String {
        if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{}", T::TABLE, name)
        }
    }

    fn by_id(id: i64) -> Query {
        Query::new().filter(Predicate::eq(Self::column(ID_COLUMN), id))
    }

    fn context(err: RepositoryError, operation: RepositoryOperation) -> RepositoryError {
        let err = err.with_operation(operation);
        if err.entity_type.is_none() {
            err.with_entity_type(T::NAME)
        } else {
            err
        }
    }

    fn require_id(entity: &T, operation: RepositoryOperation) -> RepositoryResult<i64> {
        match entity.meta().id {
            0 => Err(RepositoryError::validation_failed(
                operation,
                format!("{} has no identifier", T::NAME),
            )
            .with_entity_type(T::NAME)),
            id => Ok(id),
        }
    }

    async fn load(&self, query: Query, operation: RepositoryOperation) -> RepositoryResult<Vec<T>> {
        let mut rows = self
            .store
            .fetch(T::TABLE, &query)
            .await
            .map_err(|e| Self::context(e, operation))?;

        if !query.preloads().is_empty() {
            self.attach_relations(&mut rows, query.preloads()).await?;
        }

        rows.into_iter().map(|row| from_row(row, operation)).collect()
    }

    async fn attach_relations(&self, rows: &mut [Row], names: &[String]) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Preload;

        for name in names {
            let relation = T::relation(name).ok_or_else(|| {
                RepositoryError::validation_failed(
                    operation,
                    format!("{} has no relation named {}", T::NAME, name),
                )
                .with_entity_type(T::NAME)
            })?;

            let mut keys: Vec<FilterValue> = Vec::new();
            for row in rows.iter() {
                let value = column_value(row, relation.local_key);
                if value.is_null() {
                    continue;
                }
                let key = FilterValue::from_key(value);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }

            let related = if keys.is_empty() {
                Vec::new()
            } else {
                let query = Query::new().filter(Predicate::new(
                    format!("{}.{}", relation.table, relation.foreign_key),
                    FilterOperator::In,
                    FilterValue::List(keys),
                ));
                self.store
                    .fetch(relation.table, &query)
                    .await
                    .map_err(|e| Self::context(e, operation))?
            };

            for row in rows.iter_mut() {
                let local = column_value(row, relation.local_key).clone();
                let mut matching = related
                    .iter()
                    .filter(|r| !local.is_null() && column_value(r, relation.foreign_key) == &local)
                    .cloned()
                    .map(Value::Object);
                let attached = match relation.kind {
                    RelationKind::One => matching.next().unwrap_or(Value::Null),
                    RelationKind::Many => Value::Array(matching.collect()),
                };
                row.insert(relation.name.to_string(), attached);
            }

            debug!(
                entity = T::NAME,
                relation = relation.name,
                related = related.len(),
                "preloaded relation"
            );
        }
        Ok(())
    }

    /// Entity with identifier `id`, or `None`
    pub async fn get(&self, id: i64) -> RepositoryResult<Option<T>> {
        let items = self.load(Self::by_id(id).limit(1), RepositoryOperation::Get).await?;
        Ok(items.into_iter().next())
    }

    /// First entity (by identifier) matching `condition`, or `None`
    pub async fn get_by_condition(
        &self,
        condition: impl Into<Condition>,
    ) -> RepositoryResult<Option<T>> {
        let query = Query::new()
            .filter(condition)
            .order_by(OrderBy::asc(Self::column(ID_COLUMN)))
            .limit(1);
        let items = self.load(query, RepositoryOperation::Get).await?;
        Ok(items.into_iter().next())
    }

    /// Entities matching `filter` with the total match count
    ///
    /// `order_by` is a clause like `"id"` or `"created_at desc"`; empty means
    /// unordered. The total is counted before `limit`/`offset` apply.
    /// `limit == 0` returns every match and ignores `offset`.
    pub async fn find_all(
        &self,
        filter: Option<Query>,
        order_by: &str,
        limit: u64,
        offset: u64,
    ) -> RepositoryResult<(Vec<T>, u64)> {
        let operation = RepositoryOperation::FindAll;
        let base = filter.unwrap_or_default();

        let total = self
            .store
            .count(T::TABLE, &base.clone().without_window())
            .await
            .map_err(|e| Self::context(e, RepositoryOperation::Count))?;

        let mut query = base;
        if let Some(order) = OrderBy::parse(order_by) {
            query = query.order_by(OrderBy {
                column: Self::column(&order.column),
                direction: order.direction,
            });
        }
        if limit > 0 {
            query = query.limit(limit).offset(offset);
        }

        let items = self.load(query, operation).await?;
        debug!(entity = T::NAME, total, returned = items.len(), "find_all");
        Ok((items, total))
    }

    /// Every entity matching `condition`
    pub async fn find_all_by_condition(
        &self,
        condition: impl Into<Condition>,
    ) -> RepositoryResult<Vec<T>> {
        self.load(Query::new().filter(condition), RepositoryOperation::FindAll)
            .await
    }

    /// Entities matching `condition` after an optional raw join, with the
    /// named relations attached
    ///
    /// The join clause is inserted verbatim; only its `?` arguments are bound.
    pub async fn find_all_by_condition_with_join(
        &self,
        relations: &[&str],
        join: Option<RawSql>,
        condition: impl Into<Condition>,
    ) -> RepositoryResult<Vec<T>> {
        let mut query = relations
            .iter()
            .fold(Query::new(), |query, relation| query.preload(*relation));
        if let Some(join) = join {
            query = query.join(join);
        }
        self.load(query.filter(condition), RepositoryOperation::FindAll)
            .await
    }

    /// Persist a new entity, filling in its identifier and timestamps
    pub async fn create(&self, entity: &mut T) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Create;
        entity.meta_mut().stamp_created(Utc::now());
        let row = to_row(entity, operation)?;

        let stored = self
            .store
            .insert(T::TABLE, vec![row])
            .await
            .map_err(|e| Self::context(e, operation))?;
        let stored = stored.first().ok_or_else(|| {
            RepositoryError::database_error(operation, "insert returned no row")
                .with_entity_type(T::NAME)
        })?;
        *entity.meta_mut() = meta_from_row(stored, operation)?;

        debug!(entity = T::NAME, id = entity.meta().id, "created");
        Ok(())
    }

    /// Run `pre`, create the entity, then run `post`
    ///
    /// A failing `pre` hook prevents the insert. A failing `post` hook is
    /// returned after the row has been written.
    pub async fn create_with_hook(
        &self,
        entity: &mut T,
        pre: Option<Hook<'_, T>>,
        post: Option<Hook<'_, T>>,
    ) -> RepositoryResult<()> {
        if let Some(pre) = pre {
            pre(entity)?;
        }
        self.create(entity).await?;
        if let Some(post) = post {
            post(entity)?;
        }
        Ok(())
    }

    /// Overwrite every column of the live row with the entity's identifier
    pub async fn update(&self, entity: &mut T) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Update;
        let id = Self::require_id(entity, operation)?;
        entity.meta_mut().updated_at = Utc::now();

        let mut row = to_row(entity, operation)?;
        row.remove(ID_COLUMN);
        let affected = self
            .store
            .update(T::TABLE, row, &Self::by_id(id))
            .await
            .map_err(|e| Self::context(e, operation))?;

        if affected == 0 {
            return Err(RepositoryError::not_found(operation, T::NAME, id));
        }
        debug!(entity = T::NAME, id, "updated");
        Ok(())
    }

    /// Set `fields` on every live row matching `condition`
    ///
    /// `updated_at` is refreshed; the identifier column is never written.
    pub async fn update_specific_record(
        &self,
        mut fields: Row,
        condition: impl Into<Condition>,
    ) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Update;
        fields.remove(ID_COLUMN);
        fields.insert(UPDATED_AT_COLUMN.to_string(), timestamp_value(Utc::now()));

        let affected = self
            .store
            .update(T::TABLE, fields, &Query::new().filter(condition))
            .await
            .map_err(|e| Self::context(e, operation))?;
        debug!(entity = T::NAME, affected, "updated fields");
        Ok(())
    }

    /// Soft-delete (mark) or hard-delete (remove) the entity's row
    ///
    /// Hard deletes ignore the soft-delete scope. Deleting a row that is
    /// already gone is not an error.
    pub async fn delete(&self, entity: &T, soft: bool) -> RepositoryResult<()> {
        let (operation, affected) = if soft {
            let operation = RepositoryOperation::SoftDelete;
            let id = Self::require_id(entity, operation)?;
            let affected = self
                .store
                .update(T::TABLE, Self::soft_delete_fields(), &Self::by_id(id))
                .await
                .map_err(|e| Self::context(e, operation))?;
            (operation, affected)
        } else {
            let operation = RepositoryOperation::Delete;
            let id = Self::require_id(entity, operation)?;
            let affected = self
                .store
                .delete(T::TABLE, &Self::by_id(id).unscoped())
                .await
                .map_err(|e| Self::context(e, operation))?;
            (operation, affected)
        };

        debug!(entity = T::NAME, id = entity.meta().id, %operation, affected, "deleted");
        Ok(())
    }

    fn soft_delete_fields() -> Row {
        let now = timestamp_value(Utc::now());
        let mut fields = Row::new();
        fields.insert(IS_DELETED_COLUMN.to_string(), Value::Bool(true));
        fields.insert(DELETED_AT_COLUMN.to_string(), now.clone());
        fields.insert(UPDATED_AT_COLUMN.to_string(), now);
        fields
    }

    /// One page of entities matching `filter`
    ///
    /// Pages are 1-based (page `0` reads as page `1`); the offset is
    /// `(page - 1) * limit`. `limit == 0` puts every match on one page.
    pub async fn paginate(
        &self,
        filter: Option<Query>,
        order_by: &str,
        limit: u64,
        page: u64,
    ) -> RepositoryResult<PaginationResult<T>> {
        let window = Pagination::page(page, limit);
        let (items, total) = self
            .find_all(filter, order_by, window.limit, window.offset)
            .await?;

        Ok(PaginationResult {
            items,
            total,
            total_pages: window.total_pages(total),
            page: page.max(1),
            limit,
        })
    }

    /// Cache-aside read of the entity with identifier `id`
    ///
    /// A hit is returned without touching storage. On a miss the entity is
    /// loaded with [`get`](Self::get) and, if present, written to the cache
    /// under `cache_key`. Cache read failures and undecodable entries count
    /// as misses; cache write failures are logged and ignored. Absent
    /// entities are not cached.
    pub async fn get_cached_by_id(&self, cache_key: &str, id: i64) -> RepositoryResult<Option<T>> {
        match self.cache.get(cache_key).await {
            Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                Ok(entity) => {
                    debug!(entity = T::NAME, key = cache_key, "cache hit");
                    return Ok(Some(entity));
                }
                Err(e) => warn!(key = cache_key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => debug!(entity = T::NAME, key = cache_key, "cache miss"),
            Err(e) => warn!(key = cache_key, error = %e, "Cache read failed, loading from storage"),
        }

        let Some(entity) = self.get(id).await? else {
            return Ok(None);
        };

        match serde_json::to_string(&entity) {
            Ok(payload) => {
                if let Err(e) = self.cache.set(cache_key, &payload, self.cache_ttl).await {
                    warn!(key = cache_key, error = %e, "Cache write failed");
                }
            }
            Err(e) => warn!(key = cache_key, error = %e, "Failed to serialize entity for cache"),
        }
        Ok(Some(entity))
    }

    /// Persist several new entities in one statement
    pub async fn bulk_create(&self, entities: &mut [T]) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Create;
        if entities.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let rows = entities
            .iter_mut()
            .map(|entity| {
                entity.meta_mut().stamp_created(now);
                to_row(entity, operation)
            })
            .collect::<RepositoryResult<Vec<_>>>()?;

        let stored = self
            .store
            .insert(T::TABLE, rows)
            .await
            .map_err(|e| Self::context(e, operation))?;
        if stored.len() != entities.len() {
            return Err(RepositoryError::database_error(
                operation,
                format!("inserted {} rows for {} entities", stored.len(), entities.len()),
            )
            .with_entity_type(T::NAME));
        }

        for (entity, row) in entities.iter_mut().zip(&stored) {
            *entity.meta_mut() = meta_from_row(row, operation)?;
        }
        debug!(entity = T::NAME, count = stored.len(), "bulk created");
        Ok(())
    }

    /// Soft-delete every live row matching `condition`; returns rows affected
    ///
    /// An empty condition is rejected rather than deleting the whole table.
    pub async fn bulk_delete(&self, condition: impl Into<Condition>) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::SoftDelete;
        let condition = condition.into();
        if matches!(&condition, Condition::All(items) if items.is_empty()) {
            return Err(RepositoryError::validation_failed(
                operation,
                "bulk delete requires a condition",
            )
            .with_entity_type(T::NAME));
        }

        let affected = self
            .store
            .update(
                T::TABLE,
                Self::soft_delete_fields(),
                &Query::new().filter(condition),
            )
            .await
            .map_err(|e| Self::context(e, operation))?;
        debug!(entity = T::NAME, affected, "bulk deleted");
        Ok(affected)
    }

    /// Number of live entities matching `condition`
    pub async fn count_by_condition(&self, condition: impl Into<Condition>) -> RepositoryResult<u64> {
        self.store
            .count(T::TABLE, &Query::new().filter(condition))
            .await
            .map_err(|e| Self::context(e, RepositoryOperation::Count))
    }

    /// Every entity, soft-deleted ones included
    pub async fn find_all_including_deleted(&self) -> RepositoryResult<Vec<T>> {
        self.load(Query::new().unscoped(), RepositoryOperation::FindAll)
            .await
    }

    /// Clear the soft-delete marker of the entity with identifier `id`
    pub async fn restore_soft_deleted(&self, id: i64) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Restore;
        let mut fields = Row::new();
        fields.insert(IS_DELETED_COLUMN.to_string(), Value::Bool(false));
        fields.insert(DELETED_AT_COLUMN.to_string(), Value::Null);
        fields.insert(UPDATED_AT_COLUMN.to_string(), timestamp_value(Utc::now()));

        let affected = self
            .store
            .update(T::TABLE, fields, &Self::by_id(id).unscoped())
            .await
            .map_err(|e| Self::context(e, operation))?;
        if affected == 0 {
            return Err(RepositoryError::not_found(operation, T::NAME, id));
        }
        Ok(())
    }

    /// Entities matching `filter` with the named relations attached
    pub async fn preload_relations(
        &self,
        filter: Option<Query>,
        relations: &[&str],
    ) -> RepositoryResult<Vec<T>> {
        let query = relations
            .iter()
            .fold(filter.unwrap_or_default(), |query, relation| {
                query.preload(*relation)
            });
        self.load(query, RepositoryOperation::FindAll).await
    }

    /// Run `work` inside a transaction
    ///
    /// `work` receives a repository bound to the transaction (use
    /// [`for_entity`](Self::for_entity) to reach other tables in it). The
    /// transaction commits when `work` succeeds and rolls back when it
    /// fails. Transaction repositories cannot open nested transactions.
    pub async fn with_transaction<F, Fut, R, E>(&self, work: F) -> Result<R, E>
    where
        S: Transactional,
        F: FnOnce(BaseRepository<T, S::Tx, C>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<RepositoryError>,
    {
        let operation = RepositoryOperation::Transaction;
        let tx = self
            .store
            .begin()
            .await
            .map_err(|e| E::from(Self::context(e, operation)))?;

        let scoped = BaseRepository {
            store: tx.clone(),
            cache: self.cache.clone(),
            cache_ttl: self.cache_ttl,
            _entity: PhantomData,
        };

        match work(scoped).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| E::from(Self::context(e, operation)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(entity = T::NAME, error = %rollback, "Transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::{Error, Result};
    use crate::query::{build_query, FilterDescriptor, FilterField};
    use crate::repository::{EntityMeta, MemoryStore, Relation, RepositoryErrorKind};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Category {
        #[serde(flatten)]
        meta: EntityMeta,
        code: String,
        title: String,
    }

    impl Entity for Category {
        const TABLE: &'static str = "categories";
        const NAME: &'static str = "Category";

        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        #[serde(flatten)]
        meta: EntityMeta,
        name: String,
        price: i64,
        category_code: String,
        in_stock: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<Category>,
    }

    impl Entity for Item {
        const TABLE: &'static str = "items";
        const NAME: &'static str = "Item";

        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }

        fn relations() -> &'static [Relation] {
            const RELATIONS: &[Relation] =
                &[Relation::one("category", "categories", "category_code", "code")];
            RELATIONS
        }
    }

    fn item(name: &str, price: i64) -> Item {
        Item {
            meta: EntityMeta::default(),
            name: name.to_string(),
            price,
            category_code: "tools".to_string(),
            in_stock: true,
            category: None,
        }
    }

    fn repo() -> BaseRepository<Item, MemoryStore, MemoryCache> {
        BaseRepository::new(MemoryStore::new(), MemoryCache::new())
    }

    async fn seed(repo: &BaseRepository<Item, MemoryStore, MemoryCache>, n: usize) {
        let mut items: Vec<Item> = (1..=n).map(|i| item(&format!("item-{i}"), i as i64)).collect();
        repo.bulk_create(&mut items).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let repo = repo();
        let mut hammer = item("Hammer", 1200);
        repo.create(&mut hammer).await.unwrap();

        assert_ne!(hammer.meta.id, 0);
        assert_ne!(hammer.meta.created_at, DateTime::<Utc>::default());

        let loaded = repo.get(hammer.meta.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Hammer");
        assert_eq!(loaded.price, 1200);
        assert_eq!(loaded.meta, hammer.meta);
    }

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let repo = repo();
        assert!(repo.get(99).await.unwrap().is_none());
        assert!(repo
            .get_by_condition(Predicate::eq("name", "nope"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_by_condition_returns_first_by_id() {
        let repo = repo();
        seed(&repo, 3).await;
        let first = repo
            .get_by_condition(Predicate::gt("price", 1_i64))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.name, "item-2");
    }

    #[tokio::test]
    async fn test_paginate_second_page_of_25() {
        let repo = repo();
        seed(&repo, 25).await;

        let page = repo.paginate(None, "id", 10, 2).await.unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.items[0].meta.id, 11);
        assert_eq!(page.page, 2);

        let last = repo.paginate(None, "id", 10, 3).await.unwrap();
        assert_eq!(last.items.len(), 5);
        assert!(!last.has_next());
    }

    #[tokio::test]
    async fn test_find_all_unlimited_and_ordered() {
        let repo = repo();
        seed(&repo, 5).await;

        let (items, total) = repo.find_all(None, "price desc", 0, 3).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].price, 5);
    }

    #[tokio::test]
    async fn test_find_all_is_idempotent() {
        let repo = repo();
        seed(&repo, 4).await;
        let filter = Query::new().filter(Predicate::gte("price", 2_i64));

        let first = repo.find_all(Some(filter.clone()), "id", 2, 0).await.unwrap();
        let second = repo.find_all(Some(filter), "id", 2, 0).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.1, 3);
    }

    #[tokio::test]
    async fn test_filter_descriptor_like_matches_substrings() {
        struct ItemFilter {
            name: Option<String>,
        }
        impl FilterDescriptor for ItemFilter {
            fn filter_fields(&self) -> Vec<FilterField> {
                vec![FilterField::optional(
                    "name",
                    FilterOperator::ILike,
                    self.name.clone(),
                )]
            }
        }

        let repo = repo();
        for name in ["Claw Hammer", "Sledgehammer", "Wrench"] {
            repo.create(&mut item(name, 10)).await.unwrap();
        }

        let filter = ItemFilter {
            name: Some("HAMMER".into()),
        };
        let (items, total) = repo
            .find_all(Some(build_query(repo.query(), &filter)), "id", 0, 0)
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(items.iter().all(|i| i.name.to_lowercase().contains("hammer")));

        let case_sensitive = Query::new().filter(Predicate::like("name", "%HAMMER%"));
        let (items, _) = repo.find_all(Some(case_sensitive), "id", 0, 0).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_cache_miss_populates_and_hit_skips_storage() {
        let repo = repo();
        let mut hammer = item("Hammer", 1200);
        repo.create(&mut hammer).await.unwrap();
        let key = format!("item:{}", hammer.meta.id);

        let reads = repo.store().read_count();
        let first = repo.get_cached_by_id(&key, hammer.meta.id).await.unwrap();
        assert_eq!(first.as_ref().map(|i| i.name.as_str()), Some("Hammer"));
        assert_eq!(repo.store().read_count(), reads + 1);
        assert!(repo.cache().get(&key).await.unwrap().is_some());

        let second = repo.get_cached_by_id(&key, hammer.meta.id).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(repo.store().read_count(), reads + 1);
    }

    #[tokio::test]
    async fn test_cache_absent_entity_is_not_cached() {
        let repo = repo();
        assert!(repo.get_cached_by_id("item:5", 5).await.unwrap().is_none());
        assert!(repo.cache().is_empty());
    }

    #[tokio::test]
    async fn test_cache_garbage_is_a_miss() {
        let repo = repo();
        let mut hammer = item("Hammer", 1);
        repo.create(&mut hammer).await.unwrap();
        repo.cache()
            .set("item:1", "not json", Duration::from_secs(60))
            .await
            .unwrap();

        let loaded = repo.get_cached_by_id("item:1", hammer.meta.id).await.unwrap();
        assert_eq!(loaded.map(|i| i.name), Some("Hammer".to_string()));
    }

    #[derive(Debug, Clone)]
    struct BrokenCache;

    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Cache("down".into()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(Error::Cache("down".into()))
        }

        async fn delete(&self, _keys: &[&str]) -> Result<u64> {
            Err(Error::Cache("down".into()))
        }

        async fn increment(&self, _key: &str, _window: Duration) -> Result<u64> {
            Err(Error::Cache("down".into()))
        }
    }

    #[tokio::test]
    async fn test_cache_failures_fall_back_to_storage() {
        let repo: BaseRepository<Item, _, _> = BaseRepository::new(MemoryStore::new(), BrokenCache);
        let mut hammer = item("Hammer", 1);
        repo.create(&mut hammer).await.unwrap();

        let loaded = repo.get_cached_by_id("k", hammer.meta.id).await.unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn test_soft_and_hard_delete() {
        let repo = repo();
        let mut soft = item("soft", 1);
        let mut hard = item("hard", 2);
        repo.create(&mut soft).await.unwrap();
        repo.create(&mut hard).await.unwrap();

        repo.delete(&soft, true).await.unwrap();
        assert!(repo.get(soft.meta.id).await.unwrap().is_none());
        let everything = repo.find_all_including_deleted().await.unwrap();
        let kept = everything.iter().find(|i| i.meta.id == soft.meta.id).unwrap();
        assert!(kept.meta.is_deleted);
        assert!(kept.meta.deleted_at.is_some());

        repo.delete(&hard, false).await.unwrap();
        assert!(repo.get(hard.meta.id).await.unwrap().is_none());
        assert!(repo
            .find_all_including_deleted()
            .await
            .unwrap()
            .iter()
            .all(|i| i.meta.id != hard.meta.id));

        // hard delete reaches soft-deleted rows too
        repo.delete(&soft, false).await.unwrap();
        assert!(repo.find_all_including_deleted().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_soft_deleted() {
        let repo = repo();
        let mut it = item("x", 1);
        repo.create(&mut it).await.unwrap();
        repo.delete(&it, true).await.unwrap();

        repo.restore_soft_deleted(it.meta.id).await.unwrap();
        let restored = repo.get(it.meta.id).await.unwrap().unwrap();
        assert!(!restored.meta.is_soft_deleted());

        let err = repo.restore_soft_deleted(404).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_requires_live_row() {
        let repo = repo();
        let mut fresh = item("fresh", 1);
        let err = repo.update(&mut fresh).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);

        fresh.meta.id = 77;
        let err = repo.update(&mut fresh).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::NotFound);
        assert_eq!(err.entity_id.as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn test_update_overwrites_fields() {
        let repo = repo();
        let mut it = item("old", 1);
        repo.create(&mut it).await.unwrap();
        let created = it.meta.updated_at;

        it.name = "new".into();
        it.in_stock = false;
        repo.update(&mut it).await.unwrap();

        let loaded = repo.get(it.meta.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "new");
        assert!(!loaded.in_stock);
        assert!(loaded.meta.updated_at >= created);
    }

    #[tokio::test]
    async fn test_update_specific_record_only_touches_matches() {
        let repo = repo();
        seed(&repo, 3).await;

        let mut fields = Row::new();
        fields.insert("in_stock".into(), json!(false));
        fields.insert("id".into(), json!(999));
        repo.update_specific_record(fields, Predicate::eq("name", "item-2"))
            .await
            .unwrap();

        let out = repo
            .find_all_by_condition(Predicate::eq("in_stock", false))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].meta.id, 2);
    }

    #[tokio::test]
    async fn test_bulk_create_and_bulk_delete() {
        let repo = repo();
        let mut items = vec![item("a", 1), item("b", 2), item("c", 3)];
        repo.bulk_create(&mut items).await.unwrap();
        assert_eq!(
            items.iter().map(|i| i.meta.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let removed = repo.bulk_delete(Predicate::lte("price", 2_i64)).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.count_by_condition(Condition::all(Vec::<Predicate>::new())).await.unwrap(), 1);
        assert_eq!(repo.find_all_including_deleted().await.unwrap().len(), 3);

        let err = repo.bulk_delete(Vec::<Predicate>::new()).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_count_by_condition() {
        let repo = repo();
        seed(&repo, 6).await;
        let n = repo
            .count_by_condition(Predicate::between("price", 2_i64, 4_i64))
            .await
            .unwrap();
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn test_preload_and_join_lookup() {
        let repo = repo();
        let categories = repo.for_entity::<Category>();
        categories
            .create(&mut Category {
                meta: EntityMeta::default(),
                code: "tools".into(),
                title: "Tools".into(),
            })
            .await
            .unwrap();
        let mut orphan = item("orphan", 1);
        orphan.category_code = "none".into();
        repo.create(&mut orphan).await.unwrap();
        repo.create(&mut item("saw", 2)).await.unwrap();

        let items = repo.preload_relations(None, &["category"]).await.unwrap();
        let saw = items.iter().find(|i| i.name == "saw").unwrap();
        assert_eq!(saw.category.as_ref().map(|c| c.title.as_str()), Some("Tools"));
        let orphan = items.iter().find(|i| i.name == "orphan").unwrap();
        assert!(orphan.category.is_none());

        let joined = repo
            .find_all_by_condition_with_join(&["category"], None, Predicate::eq("name", "saw"))
            .await
            .unwrap();
        assert_eq!(joined.len(), 1);
        assert!(joined[0].category.is_some());

        let err = repo.preload_relations(None, &["owner"]).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_relations_are_not_written() {
        let repo = repo();
        let mut it = item("with-rel", 1);
        it.category = Some(Category {
            meta: EntityMeta::default(),
            code: "tools".into(),
            title: "Tools".into(),
        });
        repo.create(&mut it).await.unwrap();
        let rows = repo.store().rows("items").await;
        assert!(!rows[0].contains_key("category"));
    }

    #[tokio::test]
    async fn test_raw_join_on_memory_store_is_unsupported() {
        let repo = repo();
        let err = repo
            .find_all_by_condition_with_join(
                &[],
                Some(RawSql::new("JOIN categories ON categories.code = items.category_code")),
                Predicate::eq("name", "x"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Unsupported);
        assert_eq!(err.entity_type.as_deref(), Some("Item"));
    }

    #[tokio::test]
    async fn test_create_with_hook() {
        let repo = repo();

        let veto = |_: &mut Item| -> RepositoryResult<()> {
            Err(RepositoryError::validation_failed(
                RepositoryOperation::Create,
                "price must be positive",
            ))
        };
        let mut bad = item("bad", -1);
        assert!(repo.create_with_hook(&mut bad, Some(&veto), None).await.is_err());
        assert!(repo.find_all_including_deleted().await.unwrap().is_empty());

        let normalize = |i: &mut Item| -> RepositoryResult<()> {
            i.name = i.name.trim().to_string();
            Ok(())
        };
        let seen = std::sync::Mutex::new(0_i64);
        let record = |i: &mut Item| -> RepositoryResult<()> {
            *seen.lock().unwrap() = i.meta.id;
            Ok(())
        };
        let mut good = item("  good  ", 5);
        repo.create_with_hook(&mut good, Some(&normalize), Some(&record))
            .await
            .unwrap();
        assert_eq!(good.name, "good");
        assert_eq!(*seen.lock().unwrap(), good.meta.id);
    }

    #[tokio::test]
    async fn test_transaction_commits_on_success() {
        let repo = repo();
        let id = repo
            .with_transaction(|tx| async move {
                let mut a = item("a", 1);
                tx.create(&mut a).await?;
                tx.for_entity::<Category>()
                    .create(&mut Category {
                        meta: EntityMeta::default(),
                        code: "c".into(),
                        title: "C".into(),
                    })
                    .await?;
                Ok::<_, RepositoryError>(a.meta.id)
            })
            .await
            .unwrap();

        assert!(repo.get(id).await.unwrap().is_some());
        assert_eq!(repo.store().rows("categories").await.len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let repo = repo();
        let result: std::result::Result<(), Error> = repo
            .with_transaction(|tx| async move {
                tx.create(&mut item("doomed", 1)).await?;
                Err(Error::Conflict("abort".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert!(repo.find_all_including_deleted().await.unwrap().is_empty());
    }
}
