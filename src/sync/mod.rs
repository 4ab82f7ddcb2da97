//! Sync between a local library and a snapshot server.
//!
//! Every book (and the notes collection) carries a small sync record with
//! three states:
//!
//! - `synced`: local and server copies match as far as we know
//! - `localChanges`: edited here since the last push or pull
//! - `serverChanges`: the server holds a newer copy
//!
//! Transfers always move a whole snapshot. Push and pull are explicit;
//! the background poll only refreshes the state flags.

mod coordinator;
mod error;
mod poll;
pub mod remote;
mod tracker;

pub use coordinator::{ReconcileReport, SyncCoordinator};
pub use error::SyncError;
pub use poll::{spawn_reconciliation, PollHandle, DEFAULT_POLL_INTERVAL};
pub use remote::{HttpRemote, RemoteApi, RemoteError};
pub use tracker::{SyncTarget, SyncTracker};
