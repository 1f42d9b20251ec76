//! Scriptable worker for supervisor tests.
//!
//! Each spawned worker is handed to the test as a [`MockWorker`], which sees
//! every request the supervisor sends and decides when and how to answer.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempus::db::{SpawnedWorker, WorkerEvent, WorkerExit, WorkerProcess, WorkerSpawner};
use tempus::worker::protocol::{ErrorInfo, WorkerRequest, WorkerResponse};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

pub fn mock_spawner() -> (MockSpawner, MockWorkers) {
    let (spawned_tx, spawned_rx) = mpsc::unbounded_channel();
    let fail = Arc::new(AtomicBool::new(false));
    (
        MockSpawner {
            spawned: spawned_tx,
            fail: fail.clone(),
        },
        MockWorkers {
            spawned: spawned_rx,
            fail,
        },
    )
}

pub struct MockSpawner {
    spawned: mpsc::UnboundedSender<MockWorker>,
    fail: Arc<AtomicBool>,
}

impl WorkerSpawner for MockSpawner {
    fn spawn(&self) -> io::Result<SpawnedWorker> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "mock spawn failure"));
        }

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let terminated = Arc::new(AtomicBool::new(false));

        let _ = self.spawned.send(MockWorker {
            requests: request_rx,
            events: event_tx,
            terminated: terminated.clone(),
        });

        Ok(SpawnedWorker {
            process: Box::new(MockProcess {
                requests: request_tx,
                terminated,
            }),
            events: event_rx,
        })
    }
}

struct MockProcess {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    terminated: Arc<AtomicBool>,
}

impl WorkerProcess for MockProcess {
    fn send(&mut self, request: WorkerRequest) -> io::Result<()> {
        self.requests
            .send(request)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mock worker dropped"))
    }

    fn terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

/// Receives every worker the spawner creates.
pub struct MockWorkers {
    spawned: mpsc::UnboundedReceiver<MockWorker>,
    fail: Arc<AtomicBool>,
}

impl MockWorkers {
    /// The next spawned worker.
    pub async fn next(&mut self) -> MockWorker {
        tokio::time::timeout(WAIT, self.spawned.recv())
            .await
            .expect("timed out waiting for a worker to spawn")
            .expect("spawner dropped")
    }

    /// Whether another worker has been spawned and not yet taken.
    pub fn try_next(&mut self) -> Option<MockWorker> {
        self.spawned.try_recv().ok()
    }

    /// Make every later spawn fail.
    pub fn fail_spawns(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

/// Test-side control of one spawned worker.
pub struct MockWorker {
    requests: mpsc::UnboundedReceiver<WorkerRequest>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    terminated: Arc<AtomicBool>,
}

impl MockWorker {
    /// Wait for the next request from the supervisor.
    pub async fn request(&mut self) -> WorkerRequest {
        tokio::time::timeout(WAIT, self.requests.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("supervisor dropped the worker")
    }

    /// Assert no request arrives within `wait`.
    pub async fn assert_idle(&mut self, wait: Duration) {
        if let Ok(Some(request)) = tokio::time::timeout(wait, self.requests.recv()).await {
            panic!("unexpected request: {:?}", request);
        }
    }

    pub fn reply(&self, result: Value) {
        let _ = self
            .events
            .send(WorkerEvent::Response(WorkerResponse::ok(result)));
    }

    pub fn fail(&self, code: &str, message: &str) {
        let _ = self
            .events
            .send(WorkerEvent::Response(WorkerResponse::err(ErrorInfo::new(
                code, message,
            ))));
    }

    /// Simulate the worker process exiting.
    pub fn exit(&self, code: Option<i32>, signal: Option<i32>) {
        let _ = self
            .events
            .send(WorkerEvent::Exited(WorkerExit { code, signal }));
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Spawn `fut` and let it run up to its first suspension, so calls issued
/// through this helper reach the supervisor in program order.
pub async fn issue<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(fut);
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    handle
}
