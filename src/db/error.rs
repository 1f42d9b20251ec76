//! Client-side error types.

use std::io;

use thiserror::Error;

use crate::worker::protocol::ErrorInfo;

/// Result type for database client operations.
pub type DbResult<T> = Result<T, DbError>;

pub const DB_HAS_BEEN_KILLED: &str = "DB_HAS_BEEN_KILLED";
pub const DB_SUBPROCESS_CRASHED: &str = "DB_SUBPROCESS_CRASHED";
pub const DB_SPAWN_FAILED: &str = "DB_SPAWN_FAILED";
pub const DB_UNEXPECTED_RESULT: &str = "DB_UNEXPECTED_RESULT";
pub const DB_INVALID_ARGUMENT: &str = "DB_INVALID_ARGUMENT";

/// Errors surfaced by [`DbClient`](super::DbClient) operations.
#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// The client was killed; the command never reached the queue.
    #[error("database client has been killed")]
    Killed,

    /// The worker exited while the command was queued or in flight.
    #[error("database subprocess crashed (code: {code:?}, signal: {signal:?})")]
    SubprocessCrashed {
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// The worker executed the operation and reported a failure.
    #[error("{message} (code: {code})")]
    Worker {
        message: String,
        code: String,
        stack: Option<String>,
    },

    /// A worker could not be spawned.
    #[error("failed to spawn database worker: {0}")]
    SpawnFailed(String),

    /// The worker's result did not have the shape the operation expects.
    #[error("unexpected result from worker: {0}")]
    UnexpectedResult(String),

    /// Statement arguments could not be encoded.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DbError {
    /// Stable error code.
    pub fn code(&self) -> &str {
        match self {
            Self::Killed => DB_HAS_BEEN_KILLED,
            Self::SubprocessCrashed { .. } => DB_SUBPROCESS_CRASHED,
            Self::Worker { code, .. } => code,
            Self::SpawnFailed(_) => DB_SPAWN_FAILED,
            Self::UnexpectedResult(_) => DB_UNEXPECTED_RESULT,
            Self::InvalidArgument(_) => DB_INVALID_ARGUMENT,
        }
    }

    pub fn is_killed(&self) -> bool {
        matches!(self, Self::Killed)
    }

    pub fn is_crashed(&self) -> bool {
        matches!(self, Self::SubprocessCrashed { .. })
    }

    pub(crate) fn spawn_failed(err: io::Error) -> Self {
        Self::SpawnFailed(err.to_string())
    }
}

impl From<ErrorInfo> for DbError {
    fn from(info: ErrorInfo) -> Self {
        Self::Worker {
            message: info.message,
            code: info.code,
            stack: info.stack,
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::UnexpectedResult(err.to_string())
    }
}
