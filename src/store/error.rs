//! Store-level errors.

use thiserror::Error;

use crate::db::DbError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// `PRAGMA integrity_check` reported problems.
    #[error("integrity check failed: {}", .0.join("; "))]
    IntegrityCheck(Vec<String>),
}
