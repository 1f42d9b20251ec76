//! Queued units of work.

use serde_json::Value;
use tokio::sync::oneshot;

use super::error::DbResult;
use crate::worker::protocol::{Operation, WorkerRequest};

/// Messages from client handles to the supervisor task.
pub(crate) enum Request {
    Command(Command),
    Kill(oneshot::Sender<()>),
}

/// One pending database operation.
///
/// Settling consumes the command, so it completes at most once.
pub(crate) struct Command {
    operation: Operation,
    argument: Option<Value>,
    reply: oneshot::Sender<DbResult<Value>>,
}

impl Command {
    pub(crate) fn new(
        operation: Operation,
        argument: Option<Value>,
    ) -> (Self, oneshot::Receiver<DbResult<Value>>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                operation,
                argument,
                reply,
            },
            rx,
        )
    }

    pub(crate) fn operation(&self) -> Operation {
        self.operation
    }

    /// The path argument of an `open` command.
    pub(crate) fn open_path(&self) -> Option<&str> {
        if self.operation != Operation::Open {
            return None;
        }
        self.argument.as_ref()?.get("path")?.as_str()
    }

    pub(crate) fn request(&self) -> WorkerRequest {
        WorkerRequest {
            operation_name: self.operation,
            argument: self.argument.clone(),
        }
    }

    /// Deliver the outcome. A caller that stopped waiting is ignored.
    pub(crate) fn settle(self, result: DbResult<Value>) {
        let _ = self.reply.send(result);
    }
}
