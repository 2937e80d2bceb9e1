//! Error types

use thiserror::Error;

use crate::repository::RepositoryError;

/// Sanitize a connection URL by removing credentials
///
/// ```rust
/// use user_store::error::sanitize_url;
///
/// assert_eq!(
///     sanitize_url("postgres://admin:secret@db:5432/users"),
///     "postgres://<redacted>@db:5432/users"
/// );
/// ```
pub fn sanitize_url(url: &str) -> String {
    if let (Some(at_pos), Some(scheme_end)) = (url.rfind('@'), url.find("://")) {
        if at_pos > scheme_end {
            return format!("{}<redacted>@{}", &url[..scheme_end + 3], &url[at_pos + 1..]);
        }
    }
    url.to_string()
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Storage failure from a repository
    #[error("{0}")]
    Repository(RepositoryError),

    /// Redis error
    #[cfg(feature = "cache")]
    #[error("Redis error: {0}")]
    Redis(Box<redis::RedisError>),

    /// Cache failure outside Redis (bad stored value, pool exhaustion)
    #[error("Cache error: {0}")]
    Cache(String),

    /// JWT error
    #[cfg(feature = "jwt")]
    #[error("JWT error: {0}")]
    Jwt(Box<jsonwebtoken::errors::Error>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credentials missing or wrong
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input or expired one-time code
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Too many requests in the current window
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// State conflict (e.g. already verified)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input failed validation rules
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code, for callers that map errors onto a
    /// transport
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Repository(_) => "STORAGE_ERROR",
            #[cfg(feature = "cache")]
            Error::Redis(_) => "CACHE_ERROR",
            Error::Cache(_) => "CACHE_ERROR",
            #[cfg(feature = "jwt")]
            Error::Jwt(_) => "TOKEN_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Error::Conflict(_) => "CONFLICT",
            Error::ValidationError(_) => "VALIDATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the failure is on the caller's side
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized(_)
                | Error::NotFound(_)
                | Error::BadRequest(_)
                | Error::RateLimitExceeded
                | Error::Conflict(_)
                | Error::ValidationError(_)
        )
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        Error::Repository(err)
    }
}

#[cfg(feature = "cache")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Redis(Box::new(err))
    }
}

#[cfg(feature = "jwt")]
impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error::Jwt(Box::new(err))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryOperation;

    #[test]
    fn test_sanitize_url() {
        assert_eq!(
            sanitize_url("redis://:pw@cache:6379"),
            "redis://<redacted>@cache:6379"
        );
        assert_eq!(sanitize_url("redis://cache:6379"), "redis://cache:6379");
        assert_eq!(sanitize_url("not a url"), "not a url");
    }

    #[test]
    fn test_repository_error_is_carried_verbatim() {
        let repo = RepositoryError::database_error(
            RepositoryOperation::Create,
            "duplicate key value violates unique constraint \"users_email_key\"",
        );
        let err: Error = repo.clone().into();
        assert_eq!(err.to_string(), repo.to_string());
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::NotFound("x".into()).is_client_error());
        assert!(Error::RateLimitExceeded.is_client_error());
        assert_eq!(Error::RateLimitExceeded.to_string(), "Rate limit exceeded");
        assert!(!Error::Internal("x".into()).is_client_error());
    }
}
