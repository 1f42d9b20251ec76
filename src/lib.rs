//! # Tempus
//!
//! Data layer of a personal productivity timer: a SQLite database owned by
//! an isolated worker and driven through a supervised command queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Callers (CLI, backend server, store::init)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [db::DbClient]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Supervisor task: FIFO queue, single flight, respawn    │
//! │   + lifecycle events (open, crash, respawn, kill)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [NDJSON over stdio, or channels]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Worker runtime: one rusqlite Connection           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod logging;
pub mod store;
pub mod worker;

pub use db::{ClientConfig, DbClient, DbError, DbEvent, DbResult};
pub use worker::protocol::{Row, RunResult};
