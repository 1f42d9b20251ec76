//! Protocol types for supervisor/worker communication.
//!
//! The wire format is NDJSON: one request object per line on the worker's
//! stdin, one response object per line on its stdout. There are no request
//! identifiers; the supervisor never has more than one request outstanding,
//! so every response belongs to the oldest unanswered request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Envelope
// ============================================================================

/// Database operations understood by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Open,
    Close,
    IsOpen,
    Pragma,
    Backup,
    Prepare,
    IsPrepared,
    DeletePrepared,
    ExecutePrepared,
    RunPrepared,
    Execute,
}

impl Operation {
    /// All operations, in protocol order.
    pub const ALL: [Operation; 11] = [
        Operation::Open,
        Operation::Close,
        Operation::IsOpen,
        Operation::Pragma,
        Operation::Backup,
        Operation::Prepare,
        Operation::IsPrepared,
        Operation::DeletePrepared,
        Operation::ExecutePrepared,
        Operation::RunPrepared,
        Operation::Execute,
    ];

    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Open => "open",
            Operation::Close => "close",
            Operation::IsOpen => "isOpen",
            Operation::Pragma => "pragma",
            Operation::Backup => "backup",
            Operation::Prepare => "prepare",
            Operation::IsPrepared => "isPrepared",
            Operation::DeletePrepared => "deletePrepared",
            Operation::ExecutePrepared => "executePrepared",
            Operation::RunPrepared => "runPrepared",
            Operation::Execute => "execute",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation: {}", s))
    }
}

/// Request sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    /// Operation to perform.
    pub operation_name: Operation,
    /// Operation-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<serde_json::Value>,
}

impl WorkerRequest {
    /// Build a request with no argument.
    pub fn bare(operation: Operation) -> Self {
        Self {
            operation_name: operation,
            argument: None,
        }
    }
}

/// Response received from the worker.
///
/// Exactly one of `error` and `result` carries information: a success has
/// `error: null`, a failure has `result: null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// Error information (present on failure).
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    /// Result data (null on failure).
    #[serde(default)]
    pub result: serde_json::Value,
}

impl WorkerResponse {
    /// A successful response.
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            error: None,
            result,
        }
    }

    /// A failed response.
    pub fn err(error: ErrorInfo) -> Self {
        Self {
            error: Some(error),
            result: serde_json::Value::Null,
        }
    }

    /// Split into a `Result`.
    pub fn into_result(self) -> Result<serde_json::Value, ErrorInfo> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}

/// Error information in a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Human-readable error message.
    pub message: String,
    /// Error code.
    pub code: String,
    /// Optional stack trace from the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            stack: None,
        }
    }
}

/// Local error codes reported by the worker.
pub mod codes {
    pub const DB_NOT_OPEN: &str = "DB_NOT_OPEN";
    pub const PREPARED_STATEMENT_NOT_FOUND: &str = "PREPARED_STATEMENT_NOT_FOUND";
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
}

// ============================================================================
// Operation Arguments
// ============================================================================

/// Argument for `open`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenArgs {
    /// Database file path, or `:memory:`.
    pub path: String,
}

/// Argument for `pragma`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PragmaArgs {
    /// Pragma body, e.g. `journal_mode = WAL`.
    pub command: String,
}

/// Argument for `backup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupArgs {
    /// Destination file path.
    pub destination: String,
}

/// Argument for `prepare`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareArgs {
    pub name: String,
    pub statement: String,
}

/// Argument for `isPrepared` and `deletePrepared`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameArgs {
    pub name: String,
}

/// Argument for `executePrepared` and `runPrepared`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedArgs {
    pub name: String,
    /// Positional (array) or named (object) bindings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

/// Argument for `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteArgs {
    pub sql: String,
}

// ============================================================================
// Operation Results
// ============================================================================

/// A result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Result of `runPrepared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Rows modified by the statement.
    pub changes: u64,
    /// Rowid of the most recent successful insert.
    pub last_insert_rowid: i64,
}
