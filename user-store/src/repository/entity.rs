//! Entity metadata
//!
//! An entity is any serde-serializable record that embeds [`EntityMeta`]
//! (usually with `#[serde(flatten)]`) and names its table. Rows travel
//! between the repository and a [`Store`](super::Store) as JSON objects, so a
//! struct's serde field names are its column names.
//!
//! # Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use user_store::repository::{Entity, EntityMeta};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Product {
//!     #[serde(flatten)]
//!     meta: EntityMeta,
//!     name: String,
//! }
//!
//! impl Entity for Product {
//!     const TABLE: &'static str = "products";
//!     const NAME: &'static str = "Product";
//!
//!     fn meta(&self) -> &EntityMeta {
//!         &self.meta
//!     }
//!
//!     fn meta_mut(&mut self) -> &mut EntityMeta {
//!         &mut self.meta
//!     }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{RepositoryError, RepositoryOperation, RepositoryResult};

/// A stored row as a JSON object keyed by column name
pub type Row = Map<String, Value>;

/// Primary key column
pub const ID_COLUMN: &str = "id";
/// Creation timestamp column
pub const CREATED_AT_COLUMN: &str = "created_at";
/// Update timestamp column
pub const UPDATED_AT_COLUMN: &str = "updated_at";
/// Soft-delete flag column
pub const IS_DELETED_COLUMN: &str = "is_deleted";
/// Soft-delete timestamp column; non-null rows are out of the default scope
pub const DELETED_AT_COLUMN: &str = "deleted_at";

/// Identifier, timestamps and soft-delete marker shared by every entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityMeta {
    /// Store-assigned identifier; `0` until created
    pub id: i64,
    /// Set on create
    pub created_at: DateTime<Utc>,
    /// Set on create and on every update
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag
    pub is_deleted: bool,
    /// Soft-delete timestamp
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EntityMeta {
    /// Whether the entity has been persisted
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Whether the entity is soft-deleted
    pub fn is_soft_deleted(&self) -> bool {
        self.is_deleted || self.deleted_at.is_some()
    }

    pub(crate) fn stamp_created(&mut self, now: DateTime<Utc>) {
        if self.created_at == DateTime::<Utc>::default() {
            self.created_at = now;
        }
        self.updated_at = now;
        self.is_deleted = false;
        self.deleted_at = None;
    }
}

/// Cardinality of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// At most one related row, attached as an object or null
    One,
    /// Any number of related rows, attached as an array
    Many,
}

/// A named relation that can be preloaded
///
/// Related rows are those in `table` whose `foreign_key` equals this
/// entity's `local_key`. The relation is attached under `name`, which must
/// match the serde name of the entity's field holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    /// Field name the related rows are attached under
    pub name: &'static str,
    /// Related table
    pub table: &'static str,
    /// Column on this entity
    pub local_key: &'static str,
    /// Column on the related table
    pub foreign_key: &'static str,
    /// Cardinality
    pub kind: RelationKind,
}

impl Relation {
    /// One-to-one relation
    pub const fn one(
        name: &'static str,
        table: &'static str,
        local_key: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            table,
            local_key,
            foreign_key,
            kind: RelationKind::One,
        }
    }

    /// One-to-many relation
    pub const fn many(
        name: &'static str,
        table: &'static str,
        local_key: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            table,
            local_key,
            foreign_key,
            kind: RelationKind::Many,
        }
    }
}

/// A persistable record type
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table holding the rows
    const TABLE: &'static str;
    /// Human-readable name used in errors and logs
    const NAME: &'static str;

    /// Shared metadata
    fn meta(&self) -> &EntityMeta;

    /// Shared metadata, mutably
    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Relations that can be preloaded
    fn relations() -> &'static [Relation] {
        &[]
    }

    /// Look up a relation by name
    fn relation(name: &str) -> Option<&'static Relation> {
        Self::relations().iter().find(|r| r.name == name)
    }
}

/// Serialize an entity into a row, leaving out relation fields
pub(crate) fn to_row<T: Entity>(
    entity: &T,
    operation: RepositoryOperation,
) -> RepositoryResult<Row> {
    let value = serde_json::to_value(entity)
        .map_err(|e| RepositoryError::serialization_error(operation, e.to_string()))?;
    match value {
        Value::Object(mut row) => {
            for relation in T::relations() {
                row.remove(relation.name);
            }
            Ok(row)
        }
        other => Err(RepositoryError::serialization_error(
            operation,
            format!("{} serialized to {} instead of an object", T::NAME, other),
        )
        .with_entity_type(T::NAME)),
    }
}

/// Deserialize a row into an entity
pub(crate) fn from_row<T: Entity>(row: Row, operation: RepositoryOperation) -> RepositoryResult<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| {
        RepositoryError::serialization_error(operation, e.to_string()).with_entity_type(T::NAME)
    })
}

/// Read the metadata columns out of a stored row
pub(crate) fn meta_from_row(row: &Row, operation: RepositoryOperation) -> RepositoryResult<EntityMeta> {
    serde_json::from_value(Value::Object(row.clone()))
        .map_err(|e| RepositoryError::serialization_error(operation, e.to_string()))
}

/// Identifier column of a stored row
pub(crate) fn row_id(row: &Row) -> Option<i64> {
    row.get(ID_COLUMN).and_then(Value::as_i64)
}
