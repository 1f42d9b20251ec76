//! Database initialization: pragmas, integrity check and tables.
//!
//! Runs before the application accepts any domain queries. Every statement
//! goes through the client's generic `pragma`/`execute` operations.

use crate::db::DbClient;

use super::error::{StoreError, StoreResult};

/// Tables created at startup, in dependency order.
pub const SCHEMA: &[(&str, &str)] = &[
    (
        "categories",
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at INTEGER NOT NULL DEFAULT (unixepoch())
        )",
    ),
    (
        "projects",
        "CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id INTEGER NOT NULL REFERENCES categories (id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            created_at INTEGER NOT NULL DEFAULT (unixepoch()),
            UNIQUE (category_id, name)
        )",
    ),
    (
        "timers",
        "CREATE TABLE IF NOT EXISTS timers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
            label TEXT NOT NULL,
            duration_seconds INTEGER NOT NULL CHECK (duration_seconds > 0),
            created_at INTEGER NOT NULL DEFAULT (unixepoch())
        )",
    ),
    (
        "work_sessions",
        "CREATE TABLE IF NOT EXISTS work_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timer_id INTEGER NOT NULL REFERENCES timers (id) ON DELETE CASCADE,
            started_at INTEGER NOT NULL,
            ended_at INTEGER,
            note TEXT,
            CHECK (ended_at IS NULL OR ended_at >= started_at)
        )",
    ),
];

/// Open `path`, configure the connection, verify integrity and create any
/// missing tables. Safe to run on every startup.
pub async fn initialize(client: &DbClient, path: &str) -> StoreResult<()> {
    client.open(path).await?;

    if path != ":memory:" {
        client.pragma("journal_mode = WAL").await?;
    }
    client.pragma("foreign_keys = ON").await?;

    integrity_check(client).await?;

    for (table, ddl) in SCHEMA {
        client.execute(*ddl).await?;
        tracing::debug!(table, "table ready");
    }

    tracing::info!(path, tables = SCHEMA.len(), "database initialized");
    Ok(())
}

/// Run `PRAGMA integrity_check`; anything other than a single `ok` fails.
pub async fn integrity_check(client: &DbClient) -> StoreResult<()> {
    let rows = client.pragma("integrity_check").await?;
    let messages: Vec<String> = rows
        .iter()
        .filter_map(|row| row.values().next())
        .map(|value| value.as_str().map(String::from).unwrap_or_else(|| value.to_string()))
        .collect();

    match messages.as_slice() {
        [only] if only == "ok" => Ok(()),
        [] => Err(StoreError::IntegrityCheck(vec![
            "integrity_check returned no rows".to_string(),
        ])),
        _ => Err(StoreError::IntegrityCheck(messages)),
    }
}
