//! Tempus CLI - operate on the timer database through the supervised worker
//!
//! Usage:
//!   tempus init
//!   tempus query <SQL> [--param <VALUE>]...
//!   tempus run <SQL> [--param <VALUE>]...
//!
//! Examples:
//!   tempus --db ./dev.db init
//!   tempus query "select * from projects where category_id = ?" --param 1
//!   tempus pragma "table_info(timers)"
//!   tempus backup ./tempus-backup.db

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tempus::config::{Settings, WorkerMode};
use tempus::db::DbClient;
use tempus::store::{self, StoreResult};

#[derive(Parser)]
#[command(name = "tempus")]
#[command(about = "Tempus - productivity timer database tools")]
#[command(version)]
struct Cli {
    /// Config file (defaults to TEMPUS_CONFIG, ./tempus.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config file
    #[arg(long, global = true)]
    db: Option<String>,

    /// Run the database worker on a thread instead of a child process
    #[arg(long, global = true)]
    in_process: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tables and verify the database
    Init,

    /// Execute SQL that returns no rows
    Exec {
        /// SQL to execute (may contain several statements)
        sql: String,
    },

    /// Run a query and print its rows as JSON lines
    Query {
        /// Query to run
        sql: String,

        /// Positional parameter (parsed as JSON, else taken as text)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Run a statement and print the number of changed rows
    Run {
        /// Statement to run
        sql: String,

        /// Positional parameter (parsed as JSON, else taken as text)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Run a PRAGMA and print its rows
    Pragma {
        /// Pragma body, e.g. "journal_mode"
        command: String,
    },

    /// Copy the database to another file
    Backup {
        /// Destination file
        destination: PathBuf,
    },

    /// Run an integrity check
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Warning: {}; using defaults", e);
        Settings::default()
    });

    tempus::logging::init(&settings.log.filter);

    if let Some(db) = &cli.db {
        settings.database.path = db.clone();
    }
    if cli.in_process {
        settings.worker.mode = WorkerMode::Thread.as_str().to_string();
    }

    let client = match connect(&settings) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let notifier = store::spawn_notifier(&client, |error| {
        eprintln!("Fatal: database worker is unavailable: {}", error);
    });

    let result = run_command(&client, cli.command).await;
    client.kill().await;
    let _ = notifier.await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn connect(settings: &Settings) -> Result<DbClient, Box<dyn std::error::Error>> {
    let config = settings.client_config()?;
    let spawner = settings.spawner()?;
    Ok(DbClient::with_spawner(config, spawner)?)
}

async fn run_command(client: &DbClient, command: Commands) -> StoreResult<()> {
    // `init` opens the database itself.
    if !matches!(command, Commands::Init) {
        client.open(client.path()).await?;
    }

    match command {
        Commands::Init => {
            store::initialize(client, client.path()).await?;
            println!("OK: {} is ready", client.path());
        }
        Commands::Exec { sql } => {
            client.execute(sql).await?;
        }
        Commands::Query { sql, params } => {
            client.prepare("cli_query", sql).await?;
            let rows = client
                .execute_prepared("cli_query", parse_params(&params))
                .await?;
            for row in rows {
                println!("{}", Value::Object(row));
            }
        }
        Commands::Run { sql, params } => {
            client.prepare("cli_run", sql).await?;
            let result = client.run_prepared("cli_run", parse_params(&params)).await?;
            println!(
                "changes: {}, last insert rowid: {}",
                result.changes, result.last_insert_rowid
            );
        }
        Commands::Pragma { command } => {
            for row in client.pragma(command).await? {
                println!("{}", Value::Object(row));
            }
        }
        Commands::Backup { destination } => {
            let destination = destination.to_string_lossy().into_owned();
            client.backup(destination.clone()).await?;
            println!("OK: backed up to {}", destination);
        }
        Commands::Check => {
            store::integrity_check(client).await?;
            println!("OK: {} passed integrity check", client.path());
        }
    }

    Ok(())
}

fn parse_params(params: &[String]) -> Value {
    if params.is_empty() {
        return Value::Null;
    }
    Value::Array(
        params
            .iter()
            .map(|p| serde_json::from_str(p).unwrap_or_else(|_| Value::String(p.clone())))
            .collect(),
    )
}
