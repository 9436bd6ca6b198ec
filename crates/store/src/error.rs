//! Message store error types.

use thiserror::Error;

/// Errors surfaced by the message store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database cannot be reached. Transient; callers should pause
    /// dependent work and retry once a health probe succeeds.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A queue mapping row already exists. Raised when a concurrent writer
    /// wins the creation race; the routing layer swallows it and re-reads.
    #[error("queue already exists: {0}")]
    DuplicateQueue(String),

    /// A referenced queue or message no longer exists.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// Queue mapping lookup or creation failed.
    #[error("routing failed for queue {queue}: {reason}")]
    Routing { queue: String, reason: String },

    /// A batched write was rejected part-way through; the batch is retried
    /// one message at a time.
    #[error("batch write failed: {0}")]
    TransientBatchFailure(String),

    /// Invalid store configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Driver-level database error with no more specific classification.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Any other persistence fault.
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_unavailable(&err) {
            StoreError::Unavailable(err.to_string())
        } else if is_integrity_violation(&err) {
            StoreError::IntegrityViolation(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Config(err.to_string())
    }
}

/// True when the error is a uniqueness-constraint rejection.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.kind() == sqlx::error::ErrorKind::UniqueViolation,
        _ => false,
    }
}

/// True when the error is a referential-integrity rejection (foreign key,
/// not-null, or check constraint).
pub(crate) fn is_integrity_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => matches!(
            db_err.kind(),
            sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation
        ),
        _ => false,
    }
}

/// True when the database cannot currently be reached at all.
pub(crate) fn is_unavailable(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
    )
}
