//! Redis-backed cache and pool management

use std::ops::DerefMut;
use std::time::Duration;

use deadpool_redis::{Config as DeadpoolConfig, Connection, Pool, Runtime};

use super::Cache;
use crate::{
    backoff::connect_with_retries,
    config::RedisConfig,
    error::{sanitize_url, Error, Result},
};

/// Create a Redis connection pool, retrying with exponential backoff
pub async fn create_pool(config: &RedisConfig) -> Result<Pool> {
    let pool = connect_with_retries(
        "Redis",
        config.max_retries,
        Duration::from_secs(config.retry_delay_secs),
        || try_create_pool(config),
    )
    .await?;

    tracing::info!(
        url = %sanitize_url(&config.url),
        max_connections = config.max_connections,
        "Redis connection pool created"
    );
    Ok(pool)
}

/// Attempt to create a Redis pool and check out one connection (single try)
async fn try_create_pool(config: &RedisConfig) -> Result<Pool> {
    let pool = DeadpoolConfig::from_url(&config.url)
        .builder()
        .map_err(|e| Error::Internal(format!("Failed to build Redis pool: {}", e)))?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create Redis pool: {}", e)))?;

    drop(checkout(&pool).await?);
    Ok(pool)
}

async fn checkout(pool: &Pool) -> Result<Connection> {
    pool.get().await.map_err(|e| {
        Error::Redis(Box::new(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "Failed to get Redis connection",
            e.to_string(),
        ))))
    })
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// [`Cache`] over a deadpool-redis pool
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl RedisCache {
    /// Wrap a pool
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = checkout(&self.pool).await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(conn.deref_mut())
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = checkout(&self.pool).await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(conn.deref_mut())
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = checkout(&self.pool).await?;
        let removed: u64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(conn.deref_mut())
            .await?;
        Ok(removed)
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        let mut conn = checkout(&self.pool).await?;
        let count: u64 = redis::cmd("INCR")
            .arg(key)
            .query_async(conn.deref_mut())
            .await?;

        // the window starts with the first hit
        if count == 1 {
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs(window))
                .query_async(conn.deref_mut())
                .await?;
        }
        Ok(count)
    }
}
