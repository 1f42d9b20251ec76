//! The worker runtime: one SQLite connection, one reply per request.
//!
//! The runtime is purely reactive. It performs no queueing or retries and
//! assumes requests arrive one at a time; the supervisor guarantees that.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, DatabaseName, InterruptHandle, Statement};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{RuntimeError, RuntimeResult};
use super::protocol::{
    BackupArgs, ExecuteArgs, NameArgs, OpenArgs, Operation, PragmaArgs, PrepareArgs,
    PreparedArgs, Row, RunResult, WorkerRequest, WorkerResponse,
};

/// Host for a single SQLite connection.
#[derive(Default)]
pub struct WorkerRuntime {
    conn: Option<Connection>,
    /// Prepared statement name -> SQL text. Compiled statements live in the
    /// connection's statement cache.
    prepared: HashMap<String, String>,
    interrupter: Interrupter,
}

/// Aborts whatever statement a [`WorkerRuntime`] is running, from any
/// thread. Follows the runtime across `open` and `close`.
#[derive(Clone, Default)]
pub struct Interrupter {
    handle: Arc<Mutex<Option<InterruptHandle>>>,
}

impl Interrupter {
    /// Interrupt the running statement, if any. It fails with
    /// `SQLITE_INTERRUPT`.
    pub fn interrupt(&self) {
        if let Ok(handle) = self.handle.lock() {
            if let Some(handle) = handle.as_ref() {
                handle.interrupt();
            }
        }
    }

    fn set(&self, handle: Option<InterruptHandle>) {
        if let Ok(mut slot) = self.handle.lock() {
            *slot = handle;
        }
    }
}

impl WorkerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for interrupting this runtime from another thread.
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Decode one request line and produce exactly one response.
    pub fn handle_line(&mut self, line: &str) -> WorkerResponse {
        match serde_json::from_str::<WorkerRequest>(line) {
            Ok(request) => self.handle(request),
            Err(e) => WorkerResponse::err(RuntimeError::InvalidRequest(e.to_string()).into()),
        }
    }

    /// Execute one request.
    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        let operation = request.operation_name;
        match self.dispatch(operation, request.argument) {
            Ok(result) => WorkerResponse::ok(result),
            Err(e) => {
                tracing::debug!(%operation, error = %e, "operation failed");
                WorkerResponse::err(e.into())
            }
        }
    }

    fn dispatch(&mut self, operation: Operation, argument: Option<Value>) -> RuntimeResult<Value> {
        match operation {
            Operation::Open => {
                let args: OpenArgs = decode(argument)?;
                self.open(&args.path)?;
                Ok(Value::Null)
            }
            Operation::Close => {
                self.close()?;
                Ok(Value::Null)
            }
            Operation::IsOpen => Ok(Value::Bool(self.conn.is_some())),
            Operation::Pragma => {
                let args: PragmaArgs = decode(argument)?;
                let rows = self.pragma(&args.command)?;
                Ok(rows_to_value(rows))
            }
            Operation::Backup => {
                let args: BackupArgs = decode(argument)?;
                self.connection()?
                    .backup(DatabaseName::Main, &args.destination, None)?;
                Ok(Value::Null)
            }
            Operation::Prepare => {
                let args: PrepareArgs = decode(argument)?;
                self.prepare(args.name, args.statement)?;
                Ok(Value::Null)
            }
            Operation::IsPrepared => {
                let args: NameArgs = decode(argument)?;
                self.connection()?;
                Ok(Value::Bool(self.prepared.contains_key(&args.name)))
            }
            Operation::DeletePrepared => {
                let args: NameArgs = decode(argument)?;
                self.connection()?;
                Ok(Value::Bool(self.prepared.remove(&args.name).is_some()))
            }
            Operation::ExecutePrepared => {
                let args: PreparedArgs = decode(argument)?;
                let rows = self.execute_prepared(&args.name, args.args.as_ref())?;
                Ok(rows_to_value(rows))
            }
            Operation::RunPrepared => {
                let args: PreparedArgs = decode(argument)?;
                let result = self.run_prepared(&args.name, args.args.as_ref())?;
                Ok(serde_json::to_value(result)?)
            }
            Operation::Execute => {
                let args: ExecuteArgs = decode(argument)?;
                self.connection()?.execute_batch(&args.sql)?;
                Ok(Value::Null)
            }
        }
    }

    fn connection(&self) -> RuntimeResult<&Connection> {
        self.conn.as_ref().ok_or(RuntimeError::NotOpen)
    }

    fn open(&mut self, path: &str) -> RuntimeResult<()> {
        let conn = Connection::open(path)?;
        // Replacing the connection drops the old one and its statement cache.
        self.prepared.clear();
        self.interrupter.set(Some(conn.get_interrupt_handle()));
        self.conn = Some(conn);
        tracing::info!(path, "database opened");
        Ok(())
    }

    fn close(&mut self) -> RuntimeResult<()> {
        self.prepared.clear();
        if let Some(conn) = self.conn.take() {
            if let Err((conn, e)) = conn.close() {
                self.conn = Some(conn);
                return Err(e.into());
            }
            self.interrupter.set(None);
            tracing::info!("database closed");
        }
        Ok(())
    }

    fn pragma(&self, command: &str) -> RuntimeResult<Vec<Row>> {
        let mut stmt = self.connection()?.prepare(&format!("PRAGMA {}", command))?;
        collect_rows(&mut stmt)
    }

    fn prepare(&mut self, name: String, statement: String) -> RuntimeResult<()> {
        // Compile now so syntax errors surface at prepare time.
        self.connection()?.prepare_cached(&statement)?;
        self.prepared.insert(name, statement);
        Ok(())
    }

    fn prepared_sql(&self, name: &str) -> RuntimeResult<&str> {
        self.prepared
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| RuntimeError::UnknownPrepared(name.to_string()))
    }

    fn execute_prepared(&self, name: &str, args: Option<&Value>) -> RuntimeResult<Vec<Row>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(self.prepared_sql(name)?)?;
        bind_args(&mut stmt, args)?;
        collect_rows(&mut stmt)
    }

    fn run_prepared(&self, name: &str, args: Option<&Value>) -> RuntimeResult<RunResult> {
        let conn = self.connection()?;
        let changes = {
            let mut stmt = conn.prepare_cached(self.prepared_sql(name)?)?;
            bind_args(&mut stmt, args)?;
            stmt.raw_execute()?
        };
        Ok(RunResult {
            changes: changes as u64,
            last_insert_rowid: conn.last_insert_rowid(),
        })
    }
}

/// Serve requests from `input` until EOF, writing one response line each.
pub fn serve<R: BufRead, W: Write>(runtime: &mut WorkerRuntime, input: R, mut output: W) -> std::io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = runtime.handle_line(&line);
        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(argument: Option<Value>) -> RuntimeResult<T> {
    let argument =
        argument.ok_or_else(|| RuntimeError::InvalidArgument("missing argument".to_string()))?;
    Ok(serde_json::from_value(argument)?)
}

/// Bind JSON arguments to a statement.
///
/// Arrays bind positionally, objects bind by name (`:name`, `@name` or
/// `$name`), any other non-null value binds as the single parameter.
fn bind_args(stmt: &mut Statement<'_>, args: Option<&Value>) -> RuntimeResult<()> {
    match args {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(values)) => {
            for (i, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, json_to_sql(value))?;
            }
            Ok(())
        }
        Some(Value::Object(named)) => {
            for (key, value) in named {
                let index = named_parameter_index(stmt, key)?.ok_or_else(|| {
                    RuntimeError::InvalidArgument(format!("unknown named parameter: {}", key))
                })?;
                stmt.raw_bind_parameter(index, json_to_sql(value))?;
            }
            Ok(())
        }
        Some(scalar) => {
            stmt.raw_bind_parameter(1, json_to_sql(scalar))?;
            Ok(())
        }
    }
}

fn named_parameter_index(stmt: &Statement<'_>, key: &str) -> RuntimeResult<Option<usize>> {
    for prefix in [":", "@", "$"] {
        if let Some(index) = stmt.parameter_index(&format!("{}{}", prefix, key))? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn collect_rows(stmt: &mut Statement<'_>) -> RuntimeResult<Vec<Row>> {
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, name) in names.iter().enumerate() {
            record.insert(name.clone(), sql_to_json(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(out)
}

fn rows_to_value(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}
