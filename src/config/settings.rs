//! TOML-based configuration for Tempus.
//!
//! Supports a config file (tempus.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [database]
//! path = "${HOME}/.tempus/tempus.db"
//! close_timeout_ms = 1000
//! event_capacity = 64
//!
//! [worker]
//! mode = "process"          # or "thread"
//! path = "/usr/local/bin/tempus-db-worker"
//!
//! [log]
//! filter = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{
    ClientConfig, ProcessSpawner, ThreadSpawner, WorkerSpawner, DEFAULT_EVENT_CAPACITY,
};

/// Name of the worker binary.
pub const WORKER_BINARY: &str = "tempus-db-worker";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported worker mode: {0}. Supported: process, thread")]
    UnsupportedWorkerMode(String),

    #[error("Worker binary not found. Set worker.path in config or install {0} next to tempus")]
    WorkerNotFound(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Database configuration.
    pub database: DatabaseSettings,

    /// Worker configuration.
    pub worker: WorkerSettings,

    /// Logging configuration.
    pub log: LogSettings,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file (supports ${ENV_VAR} expansion), or `:memory:`.
    pub path: String,

    /// How long shutdown waits for the worker to close the database.
    pub close_timeout_ms: u64,

    /// Lifecycle event channel capacity.
    pub event_capacity: usize,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            close_timeout_ms: 1000,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("tempus").join("tempus.db").to_string_lossy().into_owned())
        .unwrap_or_else(|| "tempus.db".to_string())
}

impl DatabaseSettings {
    /// Get the database path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.path)
    }
}

/// Where the worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// A `tempus-db-worker` child process.
    Process,
    /// A dedicated thread in the host process.
    Thread,
}

impl WorkerMode {
    /// Parse a mode from string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, SettingsError> {
        match s.to_lowercase().as_str() {
            "process" | "subprocess" => Ok(WorkerMode::Process),
            "thread" | "in_process" => Ok(WorkerMode::Thread),
            other => Err(SettingsError::UnsupportedWorkerMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerMode::Process => "process",
            WorkerMode::Thread => "thread",
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// `process` or `thread`.
    pub mode: String,

    /// Path to the worker binary (process mode).
    pub path: Option<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            mode: WorkerMode::Process.as_str().to_string(),
            path: None,
        }
    }
}

impl WorkerSettings {
    pub fn mode(&self) -> Result<WorkerMode, SettingsError> {
        WorkerMode::from_str(&self.mode)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive. `RUST_LOG` wins if set.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TEMPUS_CONFIG`
    /// 2. `./tempus.toml`
    /// 3. `~/.config/tempus/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TEMPUS_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("tempus.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tempus").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        self.worker.mode()?;
        if self.database.path.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "database.path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the client configuration.
    pub fn client_config(&self) -> Result<ClientConfig, SettingsError> {
        Ok(ClientConfig {
            path: self.database.resolved_path()?,
            close_timeout: Duration::from_millis(self.database.close_timeout_ms),
            event_capacity: self.database.event_capacity,
        })
    }

    /// Build the worker factory for the configured mode.
    pub fn spawner(&self) -> Result<Arc<dyn WorkerSpawner>, SettingsError> {
        match self.worker.mode()? {
            WorkerMode::Thread => Ok(Arc::new(ThreadSpawner)),
            WorkerMode::Process => {
                let path = self
                    .worker_path()
                    .ok_or(SettingsError::WorkerNotFound(WORKER_BINARY))?;
                Ok(Arc::new(ProcessSpawner::new(path)))
            }
        }
    }

    /// Get the worker binary path.
    ///
    /// Tries the configured path, then a sibling of the running executable,
    /// then `PATH`.
    pub fn worker_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.worker.path {
            let expanded = expand_env_vars(path).ok()?;
            return Some(PathBuf::from(expanded));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                let sibling = dir.join(WORKER_BINARY);
                if sibling.exists() {
                    return Some(sibling);
                }
            }
        }

        env::var_os("PATH").and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(WORKER_BINARY))
                .find(|candidate| candidate.is_file())
        })
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                // A lone $ stays as-is.
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
