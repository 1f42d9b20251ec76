//! Collaborators layered on top of the database client: schema setup and
//! lifecycle notifications.

mod error;
pub mod init;
pub mod notify;

pub use error::{StoreError, StoreResult};
pub use init::{initialize, integrity_check};
pub use notify::spawn_notifier;
