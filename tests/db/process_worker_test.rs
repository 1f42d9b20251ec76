//! Client tests against real worker processes.

use std::time::{Duration, Instant};

use serde_json::json;
use tempus::db::{ClientConfig, DbClient, DbError, DbEvent, ProcessSpawner};
use tokio::sync::broadcast;

fn worker_binary() -> ProcessSpawner {
    ProcessSpawner::new(env!("CARGO_BIN_EXE_tempus-db-worker"))
}

async fn next_event(events: &mut broadcast::Receiver<DbEvent>) -> DbEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_worker_process_round_trip() {
    let client = DbClient::new(ClientConfig::default(), worker_binary()).unwrap();
    let mut events = client.subscribe();

    client.open(":memory:").await.unwrap();
    assert!(matches!(next_event(&mut events).await, DbEvent::Open { .. }));

    client
        .execute("create table categories (id integer primary key, name text not null)")
        .await
        .unwrap();
    client
        .prepare("add", "insert into categories (name) values (?)")
        .await
        .unwrap();
    let result = client.run_prepared("add", ["deep work"]).await.unwrap();
    assert_eq!(result.changes, 1);

    client
        .prepare("all", "select id, name from categories")
        .await
        .unwrap();
    let rows = client.execute_prepared("all", ()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("deep work"));

    let started = Instant::now();
    client.kill().await;
    // The worker acknowledges close, so kill does not wait out the timeout.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(
        client.is_open().await,
        Err(DbError::Killed)
    ));
}

#[tokio::test]
async fn test_missing_worker_binary_fails_to_spawn() {
    let spawner = ProcessSpawner::new("/nonexistent/tempus-db-worker");
    let err = DbClient::new(ClientConfig::default(), spawner)
        .err()
        .expect("spawn should fail");
    assert_eq!(err.code(), "DB_SPAWN_FAILED");
}

#[cfg(unix)]
#[tokio::test]
async fn test_worker_exit_code_is_reported_as_crash() {
    let spawner = ProcessSpawner::new("sh").with_args(["-c", "read line; exit 3"]);
    let client = DbClient::new(ClientConfig::default(), spawner).unwrap();
    let mut events = client.subscribe();

    match client.is_open().await {
        Err(DbError::SubprocessCrashed { code, signal }) => {
            assert_eq!(code, Some(3));
            assert_eq!(signal, None);
        }
        other => panic!("expected a crash, got {:?}", other),
    }

    assert!(matches!(
        next_event(&mut events).await,
        DbEvent::Crashed {
            code: Some(3),
            signal: None
        }
    ));
    assert!(matches!(next_event(&mut events).await, DbEvent::Respawned));

    // The replacement crashes the same way, proving it received the command.
    assert!(client.is_open().await.unwrap_err().is_crashed());
    client.kill().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_worker_killed_by_signal_is_reported_as_crash() {
    let spawner = ProcessSpawner::new("sh").with_args(["-c", "read line; kill -9 $$"]);
    let client = DbClient::new(ClientConfig::default(), spawner).unwrap();

    match client.execute("select 1").await {
        Err(DbError::SubprocessCrashed { code, signal }) => {
            assert_eq!(code, None);
            assert_eq!(signal, Some(9));
        }
        other => panic!("expected a crash, got {:?}", other),
    }
    client.kill().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_malformed_response_is_treated_as_crash() {
    let spawner =
        ProcessSpawner::new("sh").with_args(["-c", "read line; echo not-json; read line"]);
    let client = DbClient::new(ClientConfig::default(), spawner).unwrap();
    let mut events = client.subscribe();

    let result = tokio::time::timeout(Duration::from_secs(5), client.is_open())
        .await
        .expect("a malformed reply must not stall the queue");
    match result {
        Err(DbError::SubprocessCrashed { signal, .. }) => assert_eq!(signal, Some(9)),
        other => panic!("expected a crash, got {:?}", other),
    }

    assert!(matches!(next_event(&mut events).await, DbEvent::Crashed { .. }));
    assert!(matches!(next_event(&mut events).await, DbEvent::Respawned));
    client.kill().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_kill_terminates_unresponsive_worker() {
    let spawner = ProcessSpawner::new("sh").with_args(["-c", "while read line; do :; done"]);
    let config = ClientConfig::default().with_close_timeout(Duration::from_millis(200));
    let client = DbClient::new(config, spawner).unwrap();
    let mut events = client.subscribe();

    let started = Instant::now();
    client.kill().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(200), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
    assert!(matches!(next_event(&mut events).await, DbEvent::Killed));
}
