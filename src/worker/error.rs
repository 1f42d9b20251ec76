//! Errors raised while executing an operation inside the worker.

use rusqlite::ErrorCode;
use thiserror::Error;

use super::protocol::{codes, ErrorInfo};

/// Result type for worker-side operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur while the worker executes an operation.
///
/// None of these are process faults; each is reported back to the
/// supervisor as an error response.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An operation other than `open` arrived before a database was opened.
    #[error("database is not open")]
    NotOpen,

    /// The named prepared statement was never registered.
    #[error("prepared statement not found: {0}")]
    UnknownPrepared(String),

    /// The request argument did not match the operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request line could not be decoded.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// SQLite reported a failure.
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl RuntimeError {
    /// Protocol error code for this error.
    pub fn code(&self) -> String {
        match self {
            Self::NotOpen => codes::DB_NOT_OPEN.to_string(),
            Self::UnknownPrepared(_) => codes::PREPARED_STATEMENT_NOT_FOUND.to_string(),
            Self::InvalidArgument(_) => codes::INVALID_ARGUMENT.to_string(),
            Self::InvalidRequest(_) => codes::INVALID_REQUEST.to_string(),
            Self::Sqlite(err) => sqlite_code_name(err.sqlite_error_code()).to_string(),
        }
    }
}

impl From<RuntimeError> for ErrorInfo {
    fn from(err: RuntimeError) -> Self {
        ErrorInfo::new(err.code(), err.to_string())
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Map a primary SQLite result code to its C constant name.
fn sqlite_code_name(code: Option<ErrorCode>) -> &'static str {
    match code {
        Some(ErrorCode::InternalMalfunction) => "SQLITE_INTERNAL",
        Some(ErrorCode::PermissionDenied) => "SQLITE_PERM",
        Some(ErrorCode::OperationAborted) => "SQLITE_ABORT",
        Some(ErrorCode::DatabaseBusy) => "SQLITE_BUSY",
        Some(ErrorCode::DatabaseLocked) => "SQLITE_LOCKED",
        Some(ErrorCode::OutOfMemory) => "SQLITE_NOMEM",
        Some(ErrorCode::ReadOnly) => "SQLITE_READONLY",
        Some(ErrorCode::OperationInterrupted) => "SQLITE_INTERRUPT",
        Some(ErrorCode::SystemIoFailure) => "SQLITE_IOERR",
        Some(ErrorCode::DatabaseCorrupt) => "SQLITE_CORRUPT",
        Some(ErrorCode::NotFound) => "SQLITE_NOTFOUND",
        Some(ErrorCode::DiskFull) => "SQLITE_FULL",
        Some(ErrorCode::CannotOpen) => "SQLITE_CANTOPEN",
        Some(ErrorCode::FileLockingProtocolFailed) => "SQLITE_PROTOCOL",
        Some(ErrorCode::SchemaChanged) => "SQLITE_SCHEMA",
        Some(ErrorCode::TooBig) => "SQLITE_TOOBIG",
        Some(ErrorCode::ConstraintViolation) => "SQLITE_CONSTRAINT",
        Some(ErrorCode::TypeMismatch) => "SQLITE_MISMATCH",
        Some(ErrorCode::ApiMisuse) => "SQLITE_MISUSE",
        Some(ErrorCode::NoLargeFileSupport) => "SQLITE_NOLFS",
        Some(ErrorCode::AuthorizationForStatementDenied) => "SQLITE_AUTH",
        Some(ErrorCode::ParameterOutOfRange) => "SQLITE_RANGE",
        Some(ErrorCode::NotADatabase) => "SQLITE_NOTADB",
        _ => "SQLITE_ERROR",
    }
}
