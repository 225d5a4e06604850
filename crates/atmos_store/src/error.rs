//! Error types for database operations.

use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while talking to the catalog database.
#[derive(Error, Debug)]
pub enum DbError {
    /// No connection could be obtained (pool exhausted, server gone).
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// The engine rejected or failed a statement.
    #[error("statement failed: {0}")]
    Statement(String),

    /// A table or column identifier is not a plain SQL identifier.
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    /// A record does not have one value per table column.
    #[error("record has {actual} values, table expects {expected}")]
    ColumnMismatch {
        /// Number of columns in the table.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A session watermark was inserted twice.
    #[error("watermark for session {0:?} already exists")]
    DuplicateSession(String),
}

impl DbError {
    /// Returns true if the failure is transient and the caller should
    /// simply not answer, relying on the requester to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Unavailable(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => DbError::Unavailable(err.to_string()),
            other => DbError::Statement(other.to_string()),
        }
    }
}
