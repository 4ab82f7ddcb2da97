//! Reference snapshot server.

pub mod auth;
pub mod routes;
pub mod storage;

pub use auth::{ApiKeyStore, AuthUser};
pub use routes::{router, AppState};
pub use storage::{ServerStorageError, SnapshotStorage};
