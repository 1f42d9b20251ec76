//! Worker handles and the factories that create them.
//!
//! A [`WorkerSpawner`] produces a fresh [`SpawnedWorker`] on demand: a
//! [`WorkerProcess`] to send requests to and terminate, plus a stream of
//! [`WorkerEvent`]s (responses, then exactly one exit). The supervisor owns
//! both halves; dropping the event stream detaches it from a dead worker.

use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

use crate::worker::protocol::{WorkerRequest, WorkerResponse};
use crate::worker::{Interrupter, WorkerRuntime};

/// How a worker ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, if the worker exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if any (Unix only).
    pub signal: Option<i32>,
}

impl From<std::process::ExitStatus> for WorkerExit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Something observed from a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A reply to the outstanding request.
    Response(WorkerResponse),
    /// The worker is gone. Always the last event.
    Exited(WorkerExit),
}

/// The request side of a live worker.
pub trait WorkerProcess: Send {
    /// Hand a request to the worker.
    ///
    /// An error means the worker is already gone; its `Exited` event follows.
    fn send(&mut self, request: WorkerRequest) -> io::Result<()>;

    /// Force-terminate the worker. Never fails.
    fn terminate(&mut self);
}

/// A freshly spawned worker.
pub struct SpawnedWorker {
    pub process: Box<dyn WorkerProcess>,
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Factory for worker handles.
pub trait WorkerSpawner: Send + Sync + 'static {
    /// Start a new worker. Called once at construction and once per crash.
    fn spawn(&self) -> io::Result<SpawnedWorker>;
}

// ============================================================================
// Child process worker
// ============================================================================

/// Spawns `tempus-db-worker` child processes speaking NDJSON over stdio.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra command-line arguments for the worker.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&self) -> io::Result<SpawnedWorker> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("worker stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("worker stdout not captured"))?;

        tracing::debug!(program = %self.program.display(), pid = ?child.id(), "spawned worker process");

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(write_requests(stdin, request_rx));
        let reader = tokio::spawn(read_responses(stdout, event_tx.clone()));
        tokio::spawn(monitor_child(child, kill_rx, reader, event_tx));

        Ok(SpawnedWorker {
            process: Box::new(ChildWorker {
                requests: request_tx,
                kill: Some(kill_tx),
            }),
            events: event_rx,
        })
    }
}

struct ChildWorker {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    kill: Option<oneshot::Sender<()>>,
}

impl WorkerProcess for ChildWorker {
    fn send(&mut self, request: WorkerRequest) -> io::Result<()> {
        self.requests
            .send(request)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin is closed"))
    }

    fn terminate(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

async fn write_requests(stdin: ChildStdin, mut requests: mpsc::UnboundedReceiver<WorkerRequest>) {
    let mut writer = BufWriter::new(stdin);
    while let Some(request) = requests.recv().await {
        let line = match serde_json::to_string(&request) {
            Ok(json) => json + "\n",
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize worker request");
                continue;
            }
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "failed to write to worker");
            break;
        }
        if let Err(e) = writer.flush().await {
            tracing::warn!(error = %e, "failed to flush worker stdin");
            break;
        }
    }
}

/// Why the response reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderEnd {
    /// Stdout closed, or nobody listens any more.
    Closed,
    /// The worker wrote a line that is not a response.
    ProtocolError,
}

async fn read_responses(stdout: ChildStdout, events: mpsc::UnboundedSender<WorkerEvent>) -> ReaderEnd {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => return ReaderEnd::Closed,
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WorkerResponse>(&line) {
                    Ok(response) => {
                        if events.send(WorkerEvent::Response(response)).is_err() {
                            return ReaderEnd::Closed;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "worker wrote a malformed response");
                        return ReaderEnd::ProtocolError;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "worker read error");
                return ReaderEnd::Closed;
            }
        }
    }
}

/// Reap the child and report its exit after its last response.
///
/// The child is killed when the handle asks for it (or is dropped) and when
/// its stdout breaks the protocol, so the supervisor sees a crash instead of
/// waiting forever for a reply.
async fn monitor_child(
    mut child: Child,
    mut kill: oneshot::Receiver<()>,
    mut reader: tokio::task::JoinHandle<ReaderEnd>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut reader_done = false;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            // A dropped handle counts as a kill request.
            _ = &mut kill => break force_kill(&mut child).await,
            end = &mut reader, if !reader_done => {
                reader_done = true;
                if matches!(end, Ok(ReaderEnd::ProtocolError)) {
                    break force_kill(&mut child).await;
                }
            }
        }
    };

    // Deliver any final responses before the exit.
    if !reader_done {
        let _ = reader.await;
    }

    let exit = match status {
        Ok(status) => WorkerExit::from(status),
        Err(e) => {
            tracing::warn!(error = %e, "failed to reap worker process");
            WorkerExit::default()
        }
    };
    let _ = events.send(WorkerEvent::Exited(exit));
}

async fn force_kill(child: &mut Child) -> io::Result<std::process::ExitStatus> {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "worker already gone");
    }
    child.wait().await
}

// ============================================================================
// In-process thread worker
// ============================================================================

/// Runs the worker runtime on a dedicated OS thread.
///
/// Exit code is `0` when the request channel closes and `101` if the
/// runtime panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self) -> io::Result<SpawnedWorker> {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<WorkerRequest>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut runtime = WorkerRuntime::new();
        let interrupter = runtime.interrupter();

        std::thread::Builder::new()
            .name("tempus-db-worker".to_string())
            .spawn(move || {
                let responses = event_tx.clone();
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(move || {
                    while let Some(request) = request_rx.blocking_recv() {
                        let response = runtime.handle(request);
                        if responses.send(WorkerEvent::Response(response)).is_err() {
                            break;
                        }
                    }
                }));
                let code = if outcome.is_ok() { 0 } else { 101 };
                let _ = event_tx.send(WorkerEvent::Exited(WorkerExit {
                    code: Some(code),
                    signal: None,
                }));
            })?;

        Ok(SpawnedWorker {
            process: Box::new(ThreadWorker {
                requests: Some(request_tx),
                interrupter,
            }),
            events: event_rx,
        })
    }
}

struct ThreadWorker {
    requests: Option<mpsc::UnboundedSender<WorkerRequest>>,
    interrupter: Interrupter,
}

impl WorkerProcess for ThreadWorker {
    fn send(&mut self, request: WorkerRequest) -> io::Result<()> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker terminated"))?;
        requests
            .send(request)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "worker thread has exited"))
    }

    fn terminate(&mut self) {
        // Abort the running statement; the thread then sees the closed
        // channel and exits.
        self.requests = None;
        self.interrupter.interrupt();
    }
}
