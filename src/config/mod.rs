//! Configuration module for Tempus.
//!
//! Handles the config file, environment variable expansion and worker
//! binary resolution.

mod settings;

pub use settings::{
    expand_env_vars, DatabaseSettings, LogSettings, Settings, SettingsError, WorkerMode,
    WorkerSettings, WORKER_BINARY,
};
