//! PostgreSQL connection pool management

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::{
    backoff::connect_with_retries,
    config::DatabaseConfig,
    error::{sanitize_url, Error, Result},
    repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation},
};

/// Create a PostgreSQL connection pool, retrying with exponential backoff
///
/// Retries up to `max_retries` times with a base delay of
/// `retry_delay_secs`, doubling after each failure.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = connect_with_retries(
        "Database",
        config.max_retries,
        Duration::from_secs(config.retry_delay_secs),
        || try_create_pool(config),
    )
    .await?;

    tracing::info!(
        url = %sanitize_url(&config.url),
        max = config.max_connections,
        min = config.min_connections,
        "Database connection pool created"
    );
    Ok(pool)
}

/// Attempt to create a database pool (single try)
async fn try_create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| {
            Error::Repository(RepositoryError::new(
                RepositoryOperation::Connect,
                RepositoryErrorKind::ConnectionFailed,
                format!("Failed to connect to {}: {}", sanitize_url(&config.url), e),
            ))
        })
}
