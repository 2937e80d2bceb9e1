//! Generic repository over pluggable storage
//!
//! This module provides typed data access for any [`Entity`], layered over a
//! row-level [`Store`] and a [`Cache`](crate::cache::Cache).
//!
//! # Features
//!
//! - **Generic CRUD**: [`BaseRepository`] for create, read, update and delete
//! - **Soft Delete**: rows are hidden by `deleted_at` and can be restored
//! - **Relation Loading**: named [`Relation`]s preloaded with one query each
//! - **Pagination**: [`PaginationResult`] with totals and page counts
//! - **Transactions**: closures run against a transaction-bound repository
//! - **Stores**: [`PgStore`] (with the `database` feature) and [`MemoryStore`]
//!
//! # Example
//!
//! ```rust,ignore
//! use user_store::repository::{BaseRepository, Entity, EntityMeta, PgStore};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Role {
//!     #[serde(flatten)]
//!     meta: EntityMeta,
//!     name: String,
//! }
//!
//! impl Entity for Role {
//!     const TABLE: &'static str = "roles";
//!     const NAME: &'static str = "Role";
//!     fn meta(&self) -> &EntityMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut EntityMeta { &mut self.meta }
//! }
//!
//! let roles: BaseRepository<Role, _, _> = BaseRepository::new(PgStore::new(pool), cache);
//! let (items, total) = roles.find_all(None, "name", 20, 0).await?;
//! ```

mod base;
mod entity;
mod error;
mod memory;
mod pagination;
#[cfg(feature = "database")]
mod postgres;
mod store;

pub use base::{BaseRepository, Hook, DEFAULT_CACHE_TTL};
pub use entity::{
    Entity, EntityMeta, Relation, RelationKind, Row, CREATED_AT_COLUMN, DELETED_AT_COLUMN,
    ID_COLUMN, IS_DELETED_COLUMN, UPDATED_AT_COLUMN,
};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
pub use memory::{MemoryStore, MemoryTransaction};
pub use pagination::{Pagination, PaginationResult};
#[cfg(feature = "database")]
pub use postgres::{PgStore, PgTransaction};
pub use store::{Store, StoreTransaction, Transactional};
