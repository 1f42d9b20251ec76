//! tempus-db-worker - owns the SQLite connection for a Tempus client.
//!
//! Reads one JSON request per line on stdin and writes one JSON response per
//! line on stdout. Exits when stdin closes. Logs go to stderr.

use std::io::{self, BufWriter};
use std::process::ExitCode;

use tempus::worker::{serve, WorkerRuntime};

fn main() -> ExitCode {
    tempus::logging::init("warn");

    let stdin = io::stdin().lock();
    let stdout = BufWriter::new(io::stdout().lock());
    let mut runtime = WorkerRuntime::new();

    match serve(&mut runtime, stdin, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "worker i/o failed");
            ExitCode::FAILURE
        }
    }
}
