//! Public handle to the supervised database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::command::{Command, Request};
use super::error::{DbError, DbResult};
use super::events::{DbEvent, EventBus, DEFAULT_EVENT_CAPACITY};
use super::supervisor::Supervisor;
use super::worker::WorkerSpawner;
use crate::worker::protocol::{
    BackupArgs, ExecuteArgs, NameArgs, OpenArgs, Operation, PragmaArgs, PrepareArgs,
    PreparedArgs, Row, RunResult,
};

/// Default time `kill` waits for the worker to acknowledge `close`.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Construction parameters for [`DbClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Database file path, or `:memory:`.
    pub path: String,
    /// How long `kill` waits for `close` before force-terminating.
    pub close_timeout: Duration,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

/// Async handle to a database owned by a supervised worker.
///
/// Every operation is queued and sent to the worker one at a time, in call
/// order. Handles are cheap to clone; all clones share one supervisor.
///
/// # Example
///
/// ```ignore
/// use tempus::db::{ClientConfig, DbClient, ProcessSpawner};
///
/// let client = DbClient::new(
///     ClientConfig::new(":memory:"),
///     ProcessSpawner::new("tempus-db-worker"),
/// )?;
/// client.open(":memory:").await?;
/// client.prepare("q1", "select 1 as x").await?;
/// let rows = client.execute_prepared("q1", ()).await?;
/// client.kill().await;
/// ```
#[derive(Clone)]
pub struct DbClient {
    inbox: mpsc::UnboundedSender<Request>,
    killed: Arc<AtomicBool>,
    events: EventBus,
    path: Arc<str>,
}

impl DbClient {
    /// Spawn the first worker and start the supervisor task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ClientConfig, spawner: impl WorkerSpawner) -> DbResult<Self> {
        Self::with_spawner(config, Arc::new(spawner))
    }

    /// Like [`DbClient::new`], with a shared spawner.
    pub fn with_spawner(config: ClientConfig, spawner: Arc<dyn WorkerSpawner>) -> DbResult<Self> {
        let events = EventBus::new(config.event_capacity);
        let killed = Arc::new(AtomicBool::new(false));
        let supervisor =
            Supervisor::new(spawner, config.close_timeout, events.clone(), killed.clone())?;

        let (inbox, rx) = mpsc::unbounded_channel();
        tokio::spawn(supervisor.run(rx));

        Ok(Self {
            inbox,
            killed,
            events,
            path: Arc::from(config.path),
        })
    }

    /// The database path this client was created for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Subscribe to lifecycle events. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<DbEvent> {
        self.events.subscribe()
    }

    /// Whether `kill` has been called.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub async fn open(&self, path: impl Into<String>) -> DbResult<()> {
        let args = OpenArgs { path: path.into() };
        self.call(Operation::Open, Some(serde_json::to_value(args)?))
            .await
            .map(drop)
    }

    pub async fn close(&self) -> DbResult<()> {
        self.call(Operation::Close, None).await.map(drop)
    }

    pub async fn is_open(&self) -> DbResult<bool> {
        self.call_as(Operation::IsOpen, None).await
    }

    /// Run `PRAGMA <command>` and return its rows.
    pub async fn pragma(&self, command: impl Into<String>) -> DbResult<Vec<Row>> {
        let args = PragmaArgs {
            command: command.into(),
        };
        self.call_as(Operation::Pragma, Some(serde_json::to_value(args)?))
            .await
    }

    /// Copy the open database to `destination`.
    pub async fn backup(&self, destination: impl Into<String>) -> DbResult<()> {
        let args = BackupArgs {
            destination: destination.into(),
        };
        self.call(Operation::Backup, Some(serde_json::to_value(args)?))
            .await
            .map(drop)
    }

    /// Compile `statement` and register it as `name`.
    pub async fn prepare(&self, name: impl Into<String>, statement: impl Into<String>) -> DbResult<()> {
        let args = PrepareArgs {
            name: name.into(),
            statement: statement.into(),
        };
        self.call(Operation::Prepare, Some(serde_json::to_value(args)?))
            .await
            .map(drop)
    }

    pub async fn is_prepared(&self, name: impl Into<String>) -> DbResult<bool> {
        let args = NameArgs { name: name.into() };
        self.call_as(Operation::IsPrepared, Some(serde_json::to_value(args)?))
            .await
    }

    /// Unregister a prepared statement. Returns whether it existed.
    pub async fn delete_prepared(&self, name: impl Into<String>) -> DbResult<bool> {
        let args = NameArgs { name: name.into() };
        self.call_as(Operation::DeletePrepared, Some(serde_json::to_value(args)?))
            .await
    }

    /// Run a prepared query and return its rows.
    ///
    /// `args` binds positionally when it serializes to an array, by name
    /// when it serializes to an object; `()` binds nothing.
    pub async fn execute_prepared(
        &self,
        name: impl Into<String>,
        args: impl Serialize,
    ) -> DbResult<Vec<Row>> {
        let argument = prepared_args(name.into(), args)?;
        self.call_as(Operation::ExecutePrepared, Some(argument)).await
    }

    /// Run a prepared statement for its side effects.
    pub async fn run_prepared(
        &self,
        name: impl Into<String>,
        args: impl Serialize,
    ) -> DbResult<RunResult> {
        let argument = prepared_args(name.into(), args)?;
        self.call_as(Operation::RunPrepared, Some(argument)).await
    }

    /// Execute one or more statements without returning rows.
    pub async fn execute(&self, sql: impl Into<String>) -> DbResult<()> {
        let args = ExecuteArgs { sql: sql.into() };
        self.call(Operation::Execute, Some(serde_json::to_value(args)?))
            .await
            .map(drop)
    }

    /// Shut down permanently.
    ///
    /// Queued commands fail with [`DbError::Killed`]; the worker gets a
    /// bounded chance to close the database before it is terminated.
    /// Calling again resolves immediately.
    pub async fn kill(&self) {
        if self.is_killed() {
            return;
        }
        let (done, rx) = oneshot::channel();
        if self.inbox.send(Request::Kill(done)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    async fn call(&self, operation: Operation, argument: Option<Value>) -> DbResult<Value> {
        if self.is_killed() {
            return Err(DbError::Killed);
        }
        let (command, rx) = Command::new(operation, argument);
        self.inbox
            .send(Request::Command(command))
            .map_err(|_| DbError::Killed)?;
        // A dropped reply means the supervisor is gone.
        rx.await.map_err(|_| DbError::Killed)?
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        operation: Operation,
        argument: Option<Value>,
    ) -> DbResult<T> {
        let value = self.call(operation, argument).await?;
        Ok(serde_json::from_value(value)?)
    }
}

fn prepared_args(name: String, args: impl Serialize) -> DbResult<Value> {
    let args = serde_json::to_value(args).map_err(|e| DbError::InvalidArgument(e.to_string()))?;
    let args = (!args.is_null()).then_some(args);
    serde_json::to_value(PreparedArgs { name, args })
        .map_err(|e| DbError::InvalidArgument(e.to_string()))
}
