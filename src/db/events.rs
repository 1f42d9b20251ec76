//! Lifecycle events published by the supervisor.

use std::fmt;

use tokio::sync::broadcast;

use super::error::DbError;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// A lifecycle notification.
#[derive(Debug, Clone)]
pub enum DbEvent {
    /// `open` succeeded.
    Open { path: String },
    /// `open` failed.
    OpenFailed { path: String, error: DbError },
    /// The worker exited unexpectedly.
    Crashed {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// A replacement worker was spawned after a crash.
    Respawned,
    /// A replacement worker could not be spawned.
    RespawnFailed { error: DbError },
    /// The client finished shutting down.
    Killed,
}

impl DbEvent {
    /// Event name as published to collaborators.
    pub fn name(&self) -> &'static str {
        match self {
            DbEvent::Open { .. } => "open",
            DbEvent::OpenFailed { .. } => "open_failed",
            DbEvent::Crashed { .. } => "db_subprocess:crashed",
            DbEvent::Respawned => "db_subprocess:re_spawned",
            DbEvent::RespawnFailed { .. } => "db_subprocess:re_spawn_failed",
            DbEvent::Killed => "kill",
        }
    }
}

impl fmt::Display for DbEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbEvent::Open { path } => write!(f, "{} {}", self.name(), path),
            DbEvent::OpenFailed { path, error } => write!(f, "{} {}: {}", self.name(), path, error),
            DbEvent::Crashed { code, signal } => {
                write!(f, "{} (code: {:?}, signal: {:?})", self.name(), code, signal)
            }
            DbEvent::RespawnFailed { error } => write!(f, "{}: {}", self.name(), error),
            DbEvent::Respawned | DbEvent::Killed => f.write_str(self.name()),
        }
    }
}

/// Fan-out of lifecycle events to zero or more subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DbEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<DbEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: DbEvent) {
        tracing::debug!(event = event.name(), "lifecycle event");
        let _ = self.tx.send(event);
    }
}
