//! The supervisor task: command queue, single-flight dispatch and worker
//! lifecycle.
//!
//! All state lives in one task, so the queue needs no locking. A worker
//! response is always matched to the head of the queue, which is only sound
//! because at most one request is ever in flight. Pipelining requests would
//! require correlation identifiers on the wire.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use super::command::{Command, Request};
use super::error::{DbError, DbResult};
use super::events::{DbEvent, EventBus};
use super::worker::{SpawnedWorker, WorkerEvent, WorkerExit, WorkerSpawner};
use crate::worker::protocol::{Operation, WorkerRequest, WorkerResponse};

pub(crate) struct Supervisor {
    spawner: Arc<dyn WorkerSpawner>,
    close_timeout: Duration,
    events: EventBus,
    queue: VecDeque<Command>,
    /// Shared with client handles so calls after `kill` fail without
    /// reaching the queue. Never reverts.
    killed: Arc<AtomicBool>,
    /// A request is outstanding.
    dispatching: bool,
    /// `Some` while a worker is alive.
    worker: Option<SpawnedWorker>,
    /// Path most recently passed to `open`, reopened after a respawn.
    last_open_path: Option<String>,
}

impl Supervisor {
    /// Spawn the first worker.
    pub(crate) fn new(
        spawner: Arc<dyn WorkerSpawner>,
        close_timeout: Duration,
        events: EventBus,
        killed: Arc<AtomicBool>,
    ) -> DbResult<Self> {
        let worker = spawner.spawn().map_err(DbError::spawn_failed)?;
        Ok(Self {
            spawner,
            close_timeout,
            events,
            queue: VecDeque::new(),
            killed,
            dispatching: false,
            worker: Some(worker),
            last_open_path: None,
        })
    }

    /// Serve client requests and worker events until killed, or until
    /// every client handle is gone.
    pub(crate) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Request>) {
        loop {
            tokio::select! {
                request = inbox.recv() => match request {
                    Some(Request::Command(command)) => self.enqueue(command),
                    Some(Request::Kill(done)) => {
                        self.kill(&mut inbox, Some(done)).await;
                        return;
                    }
                    None => {
                        tracing::debug!("all client handles dropped");
                        self.kill(&mut inbox, None).await;
                        return;
                    }
                },
                event = next_worker_event(&mut self.worker) => {
                    match event {
                        Some(WorkerEvent::Response(response)) => self.on_response(response),
                        Some(WorkerEvent::Exited(exit)) => self.on_crash(exit),
                        None => self.on_crash(WorkerExit::default()),
                    }
                }
            }
        }
    }

    fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    fn enqueue(&mut self, command: Command) {
        if self.is_killed() {
            command.settle(Err(DbError::Killed));
            return;
        }
        if let Some(path) = command.open_path() {
            self.last_open_path = Some(path.to_string());
        }
        self.queue.push_back(command);
        self.dispatch();
    }

    fn dispatch(&mut self) {
        if self.is_killed() || self.dispatching {
            return;
        }
        let (Some(head), Some(worker)) = (self.queue.front(), self.worker.as_mut()) else {
            return;
        };

        self.dispatching = true;
        tracing::trace!(operation = %head.operation(), queued = self.queue.len(), "dispatching");
        if let Err(e) = worker.process.send(head.request()) {
            // The exit event that follows rejects the head.
            tracing::warn!(error = %e, "failed to hand request to worker");
        }
    }

    fn on_response(&mut self, response: WorkerResponse) {
        self.dispatching = false;
        let Some(command) = self.queue.pop_front() else {
            tracing::warn!("dropping worker response with no command in flight");
            return;
        };

        let result = response.into_result().map_err(DbError::from);
        let event = command.open_path().map(|path| match &result {
            Ok(_) => DbEvent::Open {
                path: path.to_string(),
            },
            Err(error) => DbEvent::OpenFailed {
                path: path.to_string(),
                error: error.clone(),
            },
        });

        command.settle(result);
        if let Some(event) = event {
            if let DbEvent::OpenFailed { path, error } = &event {
                tracing::warn!(path = %path, error = %error, "failed to open database");
            }
            self.events.emit(event);
        }
        self.dispatch();
    }

    fn on_crash(&mut self, exit: WorkerExit) {
        // Dropping the handle detaches its event stream.
        self.worker = None;
        self.dispatching = false;

        tracing::error!(
            code = ?exit.code,
            signal = ?exit.signal,
            pending = self.queue.len(),
            "database worker crashed"
        );
        self.events.emit(DbEvent::Crashed {
            code: exit.code,
            signal: exit.signal,
        });

        for command in self.queue.drain(..) {
            command.settle(Err(DbError::SubprocessCrashed {
                code: exit.code,
                signal: exit.signal,
            }));
        }

        self.respawn();
    }

    fn respawn(&mut self) {
        let worker = match self.spawner.spawn() {
            Ok(worker) => worker,
            Err(e) => {
                let error = DbError::spawn_failed(e);
                tracing::error!(error = %error, "failed to respawn database worker");
                self.events.emit(DbEvent::RespawnFailed { error });
                return;
            }
        };
        self.worker = Some(worker);

        // Best effort: the outcome only surfaces as `open`/`open_failed`.
        if let Some(path) = self.last_open_path.clone() {
            let (reopen, _) = Command::new(Operation::Open, Some(json!({ "path": path })));
            self.queue.push_front(reopen);
        }
        self.dispatch();

        tracing::info!("database worker respawned");
        self.events.emit(DbEvent::Respawned);
    }

    async fn kill(
        &mut self,
        inbox: &mut mpsc::UnboundedReceiver<Request>,
        done: Option<oneshot::Sender<()>>,
    ) {
        self.killed.store(true, Ordering::SeqCst);
        tracing::info!(pending = self.queue.len(), "killing database client");

        for command in self.queue.drain(..) {
            command.settle(Err(DbError::Killed));
        }

        if let Some(mut worker) = self.worker.take() {
            // The worker still owes a reply to whatever was in flight.
            let reply_owed = std::mem::take(&mut self.dispatching);
            match worker.process.send(WorkerRequest::bare(Operation::Close)) {
                Ok(()) => {
                    await_close(&mut worker, inbox, self.close_timeout, reply_owed).await;
                }
                Err(e) => tracing::debug!(error = %e, "worker gone before close"),
            }
            worker.process.terminate();
        }

        self.events.emit(DbEvent::Killed);
        if let Some(done) = done {
            let _ = done.send(());
        }
    }
}

/// Wait for the first of: the reply to `close`, worker exit, or the close
/// timeout. Requests arriving meanwhile are refused.
///
/// With `reply_owed`, the first response answers the command that was in
/// flight when `close` was queued behind it, and is skipped.
async fn await_close(
    worker: &mut SpawnedWorker,
    inbox: &mut mpsc::UnboundedReceiver<Request>,
    close_timeout: Duration,
    mut reply_owed: bool,
) {
    let deadline = tokio::time::sleep(close_timeout);
    tokio::pin!(deadline);
    let mut inbox_open = true;

    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!(
                    timeout = ?close_timeout,
                    "worker did not acknowledge close, terminating"
                );
                return;
            }
            event = worker.events.recv() => {
                match event {
                    Some(WorkerEvent::Response(_)) if reply_owed => {
                        tracing::debug!("discarding reply to a command rejected by kill");
                        reply_owed = false;
                        continue;
                    }
                    Some(WorkerEvent::Response(_)) => tracing::debug!("worker acknowledged close"),
                    Some(WorkerEvent::Exited(exit)) => {
                        tracing::debug!(code = ?exit.code, signal = ?exit.signal, "worker exited during close")
                    }
                    None => {}
                }
                return;
            }
            request = inbox.recv(), if inbox_open => match request {
                Some(Request::Command(command)) => command.settle(Err(DbError::Killed)),
                Some(Request::Kill(done)) => {
                    let _ = done.send(());
                }
                None => inbox_open = false,
            },
        }
    }
}

async fn next_worker_event(worker: &mut Option<SpawnedWorker>) -> Option<WorkerEvent> {
    match worker {
        Some(worker) => worker.events.recv().await,
        None => std::future::pending().await,
    }
}
