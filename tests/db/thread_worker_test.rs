//! End-to-end client tests with the worker runtime on a thread.

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tempus::db::{ClientConfig, DbClient, DbError, DbEvent, ThreadSpawner};

fn client() -> DbClient {
    DbClient::new(ClientConfig::default(), ThreadSpawner).unwrap()
}

#[tokio::test]
async fn test_open_memory_database() {
    let client = client();
    let mut events = client.subscribe();

    client.open(":memory:").await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        DbEvent::Open { path } => assert_eq!(path, ":memory:"),
        other => panic!("expected open, got {:?}", other),
    }
    assert!(client.is_open().await.unwrap());

    client.kill().await;
}

#[tokio::test]
async fn test_prepare_and_execute() {
    let client = client();
    client.open(":memory:").await.unwrap();

    client.prepare("q1", "select 1 as x").await.unwrap();
    let rows = client.execute_prepared("q1", ()).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["x"], json!(1));

    client.kill().await;
}

#[tokio::test]
async fn test_run_prepared_and_query_back() {
    let client = client();
    client.open(":memory:").await.unwrap();
    client
        .execute("create table timers (id integer primary key, label text not null, seconds integer)")
        .await
        .unwrap();

    client
        .prepare("insert_timer", "insert into timers (label, seconds) values (?, ?)")
        .await
        .unwrap();
    let first = client
        .run_prepared("insert_timer", json!(["focus", 1500]))
        .await
        .unwrap();
    let second = client
        .run_prepared("insert_timer", ("break", 300))
        .await
        .unwrap();
    assert_eq!(first.changes, 1);
    assert_eq!(first.last_insert_rowid, 1);
    assert_eq!(second.last_insert_rowid, 2);

    client
        .prepare("by_label", "select id, seconds from timers where label = :label")
        .await
        .unwrap();
    let rows = client
        .execute_prepared("by_label", json!({ "label": "break" }))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!(2));
    assert_eq!(rows[0]["seconds"], json!(300));

    client.kill().await;
}

#[tokio::test]
async fn test_prepared_statement_registry() {
    let client = client();
    client.open(":memory:").await.unwrap();

    assert!(!client.is_prepared("q").await.unwrap());
    client.prepare("q", "select 2 as y").await.unwrap();
    assert!(client.is_prepared("q").await.unwrap());
    assert!(client.delete_prepared("q").await.unwrap());
    assert!(!client.delete_prepared("q").await.unwrap());

    let err = client.execute_prepared("q", ()).await.unwrap_err();
    assert_eq!(err.code(), "PREPARED_STATEMENT_NOT_FOUND");

    client.kill().await;
}

#[tokio::test]
async fn test_worker_errors_are_forwarded() {
    let client = client();

    let err = client.execute("select 1").await.unwrap_err();
    assert_eq!(err.code(), "DB_NOT_OPEN");

    client.open(":memory:").await.unwrap();
    client
        .execute("create table categories (name text unique)")
        .await
        .unwrap();
    client
        .execute("insert into categories values ('work')")
        .await
        .unwrap();

    match client.execute("insert into categories values ('work')").await {
        Err(DbError::Worker { code, message, .. }) => {
            assert_eq!(code, "SQLITE_CONSTRAINT");
            assert!(message.contains("UNIQUE"), "{}", message);
        }
        other => panic!("expected a constraint error, got {:?}", other),
    }

    let err = client.prepare("bad", "selec 1").await.unwrap_err();
    assert_eq!(err.code(), "SQLITE_ERROR");

    // The worker keeps serving after errors.
    assert!(client.is_open().await.unwrap());
    client.kill().await;
}

#[tokio::test]
async fn test_pragma_close_and_backup() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.db");
    let copy = dir.path().join("copy.db");

    let client = client();
    client.open(source.to_string_lossy()).await.unwrap();
    client
        .execute("create table projects (name text); insert into projects values ('tempus');")
        .await
        .unwrap();

    let rows = client.pragma("user_version").await.unwrap();
    assert_eq!(rows[0]["user_version"], json!(0));

    client.backup(copy.to_string_lossy()).await.unwrap();
    client.close().await.unwrap();
    assert!(!client.is_open().await.unwrap());

    client.open(copy.to_string_lossy()).await.unwrap();
    client
        .prepare("names", "select name from projects")
        .await
        .unwrap();
    let rows = client.execute_prepared("names", ()).await.unwrap();
    assert_eq!(rows[0]["name"], json!("tempus"));

    client.kill().await;
}

#[tokio::test]
async fn test_kill_is_terminal() {
    let client = client();
    let mut events = client.subscribe();
    client.open(":memory:").await.unwrap();

    client.kill().await;
    assert!(client.is_killed());

    let err = client.execute("select 1").await.unwrap_err();
    assert!(err.is_killed());
    assert_eq!(err.code(), "DB_HAS_BEEN_KILLED");

    let mut saw_kill = false;
    while let Ok(event) = events.try_recv() {
        saw_kill |= matches!(event, DbEvent::Killed);
    }
    assert!(saw_kill);
}
