//! Repository error types
//!
//! Every storage failure surfaces as a [`RepositoryError`] naming the
//! operation that failed and a coarse [`RepositoryErrorKind`]. The message
//! of the backing store is carried verbatim.
//!
//! # Example
//!
//! ```rust
//! use user_store::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::new(
//!     RepositoryOperation::Update,
//!     RepositoryErrorKind::NotFound,
//!     "no live row with this id",
//! )
//! .with_entity("User", "42");
//! assert_eq!(error.entity_id.as_deref(), Some("42"));
//! ```

use std::fmt;

/// Operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Establishing a connection
    Connect,
    /// Single-record read by id or condition
    Get,
    /// Multi-record read
    FindAll,
    /// Counting matches
    Count,
    /// Inserting one or more records
    Create,
    /// Full or partial update
    Update,
    /// Physical removal
    Delete,
    /// Marking records deleted
    SoftDelete,
    /// Clearing the soft-delete marker
    Restore,
    /// Loading related records
    Preload,
    /// Beginning, committing or rolling back a transaction
    Transaction,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Get => write!(f, "get"),
            Self::FindAll => write!(f, "find_all"),
            Self::Count => write!(f, "count"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::SoftDelete => write!(f, "soft_delete"),
            Self::Restore => write!(f, "restore"),
            Self::Preload => write!(f, "preload"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// No live record matched a write that required one
    NotFound,
    /// Unique key already taken
    AlreadyExists,
    /// Other integrity constraint failed
    ConstraintViolation,
    /// Input rejected before reaching storage
    ValidationFailed,
    /// Storage unreachable
    ConnectionFailed,
    /// Storage did not answer in time
    Timeout,
    /// Any other storage failure
    DatabaseError,
    /// Row could not be converted to or from an entity
    SerializationError,
    /// The store cannot execute this kind of query
    Unsupported,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Structured repository error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Store-provided or descriptive message
    pub message: String,
    /// Entity involved (e.g. "User")
    pub entity_type: Option<String>,
    /// Identifier of the entity involved
    pub entity_id: Option<String>,
}

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// A write targeted a record that is absent or soft-deleted
    pub fn not_found(
        operation: RepositoryOperation,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
    ) -> Self {
        Self::new(operation, RepositoryErrorKind::NotFound, "record not found")
            .with_entity(entity_type, entity_id.to_string())
    }

    /// Input rejected before storage was touched
    pub fn validation_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::ValidationFailed, message)
    }

    /// Unique key collision
    pub fn already_exists(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::AlreadyExists, message)
    }

    /// Generic storage failure
    pub fn database_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DatabaseError, message)
    }

    /// Conversion between rows and entities failed
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Query shape the store cannot run
    pub fn unsupported(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Unsupported, message)
    }

    /// Attach entity context
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Attach the entity type only
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Replace the operation
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Transient failures that may succeed on retry
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed ({}): {}", self.operation, self.kind, self.message)?;
        match (&self.entity_type, &self.entity_id) {
            (Some(entity_type), Some(entity_id)) => write!(f, " [{}: {}]", entity_type, entity_id),
            (Some(entity_type), None) => write!(f, " [{}]", entity_type),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for RepositoryError {}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(RepositoryOperation::Get, err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        let operation = RepositoryOperation::FindAll;
        match &err {
            sqlx::Error::Database(db) => {
                let kind = match db.code().as_deref() {
                    Some("23505") => RepositoryErrorKind::AlreadyExists,
                    Some(code) if code.starts_with("23") => RepositoryErrorKind::ConstraintViolation,
                    _ => RepositoryErrorKind::DatabaseError,
                };
                Self::new(operation, kind, db.message())
            }
            sqlx::Error::PoolTimedOut => {
                Self::new(operation, RepositoryErrorKind::Timeout, err.to_string())
            }
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                Self::new(operation, RepositoryErrorKind::ConnectionFailed, err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::serialization_error(operation, err.to_string())
            }
            _ => Self::database_error(operation, err.to_string()),
        }
    }
}
