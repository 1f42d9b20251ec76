//! Worker runtime and wire protocol.
//!
//! The worker is the only place a SQLite connection lives. It runs either as
//! the `tempus-db-worker` child process (NDJSON over stdin/stdout) or on a
//! dedicated thread inside the host process. Either way it answers exactly
//! one response per request and never speaks first.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Host process (Tokio)                        │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                DbClient  →  supervisor task               │  │
//! │  │  - FIFO command queue, one request in flight              │  │
//! │  │  - crash detection, respawn, bounded kill                 │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                              │                                   │
//! │               stdin (NDJSON) │ stdout (NDJSON)                  │
//! │                              ▼                                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          tempus-db-worker (WorkerRuntime + rusqlite)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod error;
pub mod protocol;
mod runtime;

pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{serve, Interrupter, WorkerRuntime};
