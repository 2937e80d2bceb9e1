//! # user-store
//!
//! Generic repository, dynamic query builder and user management core for
//! e-commerce backends.
//!
//! ## Features
//!
//! - **Generic repository**: typed CRUD, soft delete, relation preloading,
//!   pagination, bulk writes and transactions for any [`Entity`](repository::Entity)
//! - **Dynamic queries**: filter structs describe their fields once and
//!   [`build_query`](query::build_query) turns the provided ones into predicates
//! - **Storage backends**: PostgreSQL via sqlx, plus an in-process store
//! - **Caching**: read-through entity cache over Redis or memory
//! - **Users**: registration with emailed one-time codes, verification,
//!   JWT login, listing and updates
//! - **Configuration**: layered TOML and environment configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use user_store::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Wire storage and cache
//!     let pool = create_pool(config.database.as_ref().expect("database configured")).await?;
//!     let service = UserService::new(
//!         PgStore::new(pool),
//!         MemoryCache::new(),
//!         LogNotifier,
//!         &config,
//!     )?;
//!
//!     let users = service.list_users(UserQueryParams::default()).await?;
//!     println!("{} verified users", users.len());
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod observability;
pub mod query;
pub mod rate_limit;
pub mod repository;
pub mod users;

#[cfg(feature = "database")]
pub mod database;

#[cfg(any(feature = "database", feature = "cache"))]
mod backoff;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{Cache, MemoryCache};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::observability::init_tracing;
    pub use crate::query::{
        build_query, Condition, FilterDescriptor, FilterField, FilterOperator, FilterValue,
        OrderBy, Predicate, Presence, Query, RawSql,
    };
    pub use crate::rate_limit::RateLimiter;
    pub use crate::repository::{
        BaseRepository, Entity, EntityMeta, MemoryStore, PaginationResult, Relation,
        RepositoryError, RepositoryErrorKind, Store, Transactional,
    };
    pub use crate::users::{LogNotifier, Notifier, UserQueryParams, UserRequest, UserService};

    #[cfg(feature = "cache")]
    pub use crate::cache::RedisCache;

    #[cfg(feature = "database")]
    pub use crate::database::create_pool;

    #[cfg(feature = "database")]
    pub use crate::repository::PgStore;

    #[cfg(feature = "jwt")]
    pub use crate::auth::JwtIssuer;

    pub use serde::{Deserialize, Serialize};
    pub use tracing::{debug, error, info, warn};
}
