//! Subprocess-isolated database client.
//!
//! [`DbClient`] is the only way the rest of the application touches SQLite.
//! It forwards each call to a supervisor task that queues it, sends it to
//! the worker once nothing else is in flight, and settles it with the
//! worker's reply.
//!
//! If the worker dies, every queued command fails with
//! [`DbError::SubprocessCrashed`], a replacement worker is spawned and the
//! last opened database is reopened. [`DbClient::kill`] shuts everything
//! down for good, waiting at most [`ClientConfig::close_timeout`] for the
//! worker to close the database.
//!
//! Collaborators observe the lifecycle through [`DbClient::subscribe`]:
//!
//! | event                           | when                               |
//! |---------------------------------|------------------------------------|
//! | `open`                          | `open` succeeded                   |
//! | `open_failed`                   | `open` failed                      |
//! | `db_subprocess:crashed`         | the worker exited unexpectedly     |
//! | `db_subprocess:re_spawned`      | a replacement worker is running    |
//! | `db_subprocess:re_spawn_failed` | no replacement could be spawned    |
//! | `kill`                          | shutdown finished                  |

mod client;
mod command;
mod error;
mod events;
mod supervisor;
mod worker;

pub use client::{ClientConfig, DbClient, DEFAULT_CLOSE_TIMEOUT};
pub use error::{
    DbError, DbResult, DB_HAS_BEEN_KILLED, DB_INVALID_ARGUMENT, DB_SPAWN_FAILED,
    DB_SUBPROCESS_CRASHED, DB_UNEXPECTED_RESULT,
};
pub use events::{DbEvent, EventBus, DEFAULT_EVENT_CAPACITY};
pub use worker::{
    ProcessSpawner, SpawnedWorker, ThreadSpawner, WorkerEvent, WorkerExit, WorkerProcess,
    WorkerSpawner,
};
