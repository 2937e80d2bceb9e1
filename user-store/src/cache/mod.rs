//! Key/value cache collaborator
//!
//! The [`Cache`] trait is the small surface the repository's read-through
//! path, the one-time-code store and the rate limiter need: string get/set
//! with a time-to-live, delete and a windowed counter.
//!
//! Implementations:
//! - [`RedisCache`] over a deadpool-redis pool (with the `cache` feature)
//! - [`MemoryCache`] in-process, for tests and single-node embedders

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

mod memory;
#[cfg(feature = "cache")]
mod redis_cache;

pub use memory::MemoryCache;
#[cfg(feature = "cache")]
pub use redis_cache::{create_pool, RedisCache};

/// String key/value store with expiry
pub trait Cache: Clone + Send + Sync + 'static {
    /// Value under `key`; `None` when absent or expired
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Store `value` under `key` for `ttl`
    fn set(&self, key: &str, value: &str, ttl: Duration)
        -> impl Future<Output = Result<()>> + Send;

    /// Remove keys; returns how many existed
    fn delete(&self, keys: &[&str]) -> impl Future<Output = Result<u64>> + Send;

    /// Increment the counter under `key`, starting a `window`-long expiry when
    /// the counter is created; returns the new count
    fn increment(&self, key: &str, window: Duration) -> impl Future<Output = Result<u64>> + Send;
}
