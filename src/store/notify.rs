//! Operator notifications for worker lifecycle events.

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::db::{DbClient, DbError, DbEvent};

/// Log lifecycle events and call `on_fatal` when the worker cannot be
/// respawned.
///
/// `on_fatal` runs at most once; the host uses it to start an orderly
/// shutdown. The task ends after `kill` or when the client is gone.
pub fn spawn_notifier<F>(client: &DbClient, on_fatal: F) -> JoinHandle<()>
where
    F: FnOnce(DbError) + Send + 'static,
{
    let mut events = client.subscribe();
    let mut on_fatal = Some(on_fatal);

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "missed database lifecycle events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                DbEvent::Open { path } => tracing::debug!(%path, "database opened"),
                DbEvent::OpenFailed { path, error } => {
                    tracing::warn!(%path, %error, "database could not be opened")
                }
                DbEvent::Crashed { code, signal } => {
                    tracing::warn!(?code, ?signal, "database worker crashed, respawning")
                }
                DbEvent::Respawned => tracing::info!("database worker is back"),
                DbEvent::RespawnFailed { error } => {
                    tracing::error!(%error, "database worker could not be respawned");
                    if let Some(on_fatal) = on_fatal.take() {
                        on_fatal(error);
                    }
                }
                DbEvent::Killed => break,
            }
        }
    })
}
