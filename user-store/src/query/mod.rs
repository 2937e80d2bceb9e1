//! Dynamic query construction
//!
//! This module turns caller-supplied filter values into query contexts. It
//! never touches storage: the repository executes whatever [`Query`] it is
//! handed, and the query layer knows nothing about how that happens.
//!
//! - [`filter`]: predicates, values and raw SQL fragments
//! - [`context`]: the accumulating [`Query`] context
//! - [`builder`]: [`FilterDescriptor`] and [`build_query`]
//! - [`eval`]: in-process evaluation used by the memory store
//! - `sql`: PostgreSQL rendering (with the `database` feature)
//!
//! # Example
//!
//! ```rust
//! use user_store::query::{build_query, FilterDescriptor, FilterField, FilterOperator, Query};
//!
//! struct UserFilter {
//!     last_name: Option<String>,
//!     is_verified: bool,
//! }
//!
//! impl FilterDescriptor for UserFilter {
//!     fn filter_fields(&self) -> Vec<FilterField> {
//!         vec![
//!             FilterField::optional("last_name", FilterOperator::ILike, self.last_name.clone()),
//!             FilterField::new("is_verified", FilterOperator::Equal, self.is_verified),
//!         ]
//!     }
//! }
//!
//! let query = build_query(
//!     Query::new(),
//!     &UserFilter { last_name: Some("smi".into()), is_verified: true },
//! );
//! assert_eq!(query.conditions().len(), 2);
//! ```

pub mod builder;
pub mod context;
pub mod eval;
pub mod filter;
#[cfg(feature = "database")]
pub mod sql;

pub use builder::{build_query, FilterDescriptor, FilterField, Presence};
pub use context::{OrderBy, OrderDirection, Query};
pub use filter::{Condition, FilterOperator, FilterValue, Predicate, RawSql};
