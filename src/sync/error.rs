//! Sync error types.

use uuid::Uuid;

use super::remote::RemoteError;
use crate::backup::SnapshotError;
use crate::db::StoreError;

/// Errors that can occur during push, pull or reconciliation.
///
/// Every variant leaves the local sync state as it was before the call.
#[derive(Debug)]
pub enum SyncError {
    /// No bearer token is configured
    NotAuthenticated,
    /// The book is not in the local index
    BookNotFound(Uuid),
    /// The server returned a snapshot for a different book
    UnexpectedBook { expected: Uuid, found: Uuid },
    /// Transport or server failure
    Remote(RemoteError),
    /// The downloaded snapshot could not be read or imported
    Snapshot(SnapshotError),
    /// Local storage failure
    Store(StoreError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::NotAuthenticated => {
                write!(f, "Sync not configured. Add sync.server_url and sync.token to config.")
            }
            SyncError::BookNotFound(uuid) => write!(f, "Book not found: {}", uuid),
            SyncError::UnexpectedBook { expected, found } => write!(
                f,
                "Server returned book {} when {} was requested",
                found, expected
            ),
            SyncError::Remote(e) => write!(f, "Remote error: {}", e),
            SyncError::Snapshot(e) => write!(f, "Snapshot error: {}", e),
            SyncError::Store(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        SyncError::Remote(e)
    }
}

impl From<SnapshotError> for SyncError {
    fn from(e: SnapshotError) -> Self {
        SyncError::Snapshot(e)
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Snapshot(SnapshotError::Json(e))
    }
}
