use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{LibraryRepository, StoreError};
use crate::models::SyncMeta;

/// Which sync record a tracker owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTarget {
    Book(Uuid),
    Notes,
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTarget::Book(uuid) => write!(f, "book {}", uuid),
            SyncTarget::Notes => write!(f, "notes"),
        }
    }
}

/// Owns one sync record and writes every transition through to the
/// library database.
///
/// A transition is persisted before it becomes visible, so a failed write
/// leaves the in-memory state unchanged.
#[derive(Debug)]
pub struct SyncTracker {
    target: SyncTarget,
    repo: LibraryRepository,
    meta: Mutex<SyncMeta>,
}

impl SyncTracker {
    pub fn new(target: SyncTarget, repo: LibraryRepository, meta: SyncMeta) -> Self {
        Self {
            target,
            repo,
            meta: Mutex::new(meta),
        }
    }

    pub fn target(&self) -> SyncTarget {
        self.target
    }

    pub async fn current(&self) -> SyncMeta {
        self.meta.lock().await.clone()
    }

    /// Records a local mutation.
    pub async fn touch(&self) -> Result<SyncMeta, StoreError> {
        self.transition(|meta| {
            meta.touch(Utc::now());
            true
        })
        .await
    }

    pub async fn mark_synced(
        &self,
        acknowledged_at: Option<DateTime<Utc>>,
    ) -> Result<SyncMeta, StoreError> {
        self.transition(|meta| {
            meta.mark_synced(acknowledged_at);
            true
        })
        .await
    }

    /// Applies a remote listing timestamp. Returns true if the record changed.
    pub async fn reconcile(&self, remote_updated_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut changed = false;
        self.transition(|meta| {
            changed = meta.reconcile(remote_updated_at);
            changed
        })
        .await?;
        Ok(changed)
    }

    /// Replaces the record wholesale, as an import does.
    pub async fn overwrite(&self, meta: SyncMeta) -> Result<(), StoreError> {
        self.transition(|current| {
            *current = meta;
            true
        })
        .await?;
        Ok(())
    }

    async fn transition<F>(&self, apply: F) -> Result<SyncMeta, StoreError>
    where
        F: FnOnce(&mut SyncMeta) -> bool,
    {
        let mut guard = self.meta.lock().await;
        let mut next = guard.clone();
        if !apply(&mut next) {
            return Ok(next);
        }

        self.persist(&next).await?;
        tracing::debug!("{} is now {}", self.target, next.sync_state);
        *guard = next.clone();
        Ok(next)
    }

    async fn persist(&self, meta: &SyncMeta) -> Result<(), StoreError> {
        match self.target {
            SyncTarget::Book(uuid) => {
                if !self.repo.save_book_sync(uuid, meta).await? {
                    return Err(StoreError::NotFound(format!("Book {}", uuid)));
                }
            }
            SyncTarget::Notes => self.repo.save_notes_meta(meta).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_library;
    use crate::models::{Book, SyncState};
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn setup() -> (LibraryRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = open_library(&temp_dir.path().join("library.db"))
            .await
            .unwrap();
        (LibraryRepository::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_touch_writes_through() {
        let (repo, _dir) = setup().await;
        let book = Book::new("Tracked");
        repo.upsert_book(&book).await.unwrap();

        let tracker = SyncTracker::new(SyncTarget::Book(book.uuid), repo.clone(), book.sync.clone());
        let meta = tracker.touch().await.unwrap();
        assert_eq!(meta.sync_state, SyncState::LocalChanges);

        let stored = repo.get_book_sync(book.uuid).await.unwrap().unwrap();
        assert_eq!(stored, meta);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_state_unchanged() {
        let (repo, _dir) = setup().await;
        let tracker = SyncTracker::new(SyncTarget::Book(Uuid::new_v4()), repo, SyncMeta::default());

        assert!(matches!(tracker.touch().await, Err(StoreError::NotFound(_))));
        assert_eq!(tracker.current().await, SyncMeta::default());
    }

    #[tokio::test]
    async fn test_notes_tracker_reconcile() {
        let (repo, _dir) = setup().await;
        let tracker = SyncTracker::new(SyncTarget::Notes, repo.clone(), SyncMeta::default());

        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(tracker.reconcile(at).await.unwrap());
        assert!(!tracker.reconcile(at).await.unwrap());

        let stored = repo.get_notes_meta().await.unwrap();
        assert_eq!(stored.sync_state, SyncState::ServerChanges);
        assert_eq!(stored.server_updated_at, Some(at));
    }
}
