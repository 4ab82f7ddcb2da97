use std::sync::Arc;
use uuid::Uuid;

use super::error::SyncError;
use super::remote::{BookListing, RemoteApi, SaveBookRequest};
use crate::backup::{BookSnapshot, NotesSnapshot};
use crate::db::StoreError;
use crate::library::Library;
use crate::models::{Book, SyncMeta, SyncState};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Local books that appear in the remote listing
    pub checked: usize,
    /// Books whose sync record changed, with their new state
    pub changed: Vec<(Uuid, SyncState)>,
    /// Books the server has that this device does not
    pub remote_only: Vec<Uuid>,
}

/// Drives whole-snapshot transfer between a [`Library`] and a remote.
pub struct SyncCoordinator<R> {
    library: Arc<Library>,
    remote: R,
    token: Option<String>,
}

impl<R: RemoteApi> SyncCoordinator<R> {
    pub fn new(library: Arc<Library>, remote: R, token: Option<String>) -> Self {
        Self {
            library,
            remote,
            token,
        }
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    fn token(&self) -> Result<&str, SyncError> {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(SyncError::NotAuthenticated),
        }
    }

    async fn local_book(&self, uuid: Uuid) -> Result<Book, SyncError> {
        match self.library.get_book(uuid).await {
            Ok(book) => Ok(book),
            Err(StoreError::NotFound(_)) => Err(SyncError::BookNotFound(uuid)),
            Err(e) => Err(e.into()),
        }
    }

    /// Uploads the full book. On success the book is synced as of the
    /// server's acknowledged timestamp.
    pub async fn push_book(&self, uuid: Uuid) -> Result<SyncMeta, SyncError> {
        let token = self.token()?;
        let book = self.local_book(uuid).await?;

        let snapshot = BookSnapshot::export(&self.library, uuid).await?;
        let request = SaveBookRequest {
            uuid,
            book_title: book.title.clone(),
            kind: book.kind.clone(),
            form: Some(book.form.clone()),
            genre: Some(book.genre.clone()),
            cover: book.cover.clone(),
            description: book.description.clone(),
            book_data: snapshot.to_transport_json()?,
        };

        let ack = self.remote.save_book_data(token, &request).await?;
        if ack.updated_at.is_none() {
            tracing::warn!("Server acknowledged book {} without a timestamp", uuid);
        }

        let meta = self
            .library
            .tracker(uuid)
            .await?
            .mark_synced(ack.updated_at)
            .await?;
        tracing::info!("Pushed book {} ({})", book.title, uuid);
        Ok(meta)
    }

    /// Downloads the server copy and replaces the local one with it.
    pub async fn pull_book(&self, uuid: Uuid) -> Result<Book, SyncError> {
        let token = self.token()?;
        let data = self.remote.get_book_data(token, uuid).await?;

        let mut snapshot = BookSnapshot::from_json(&data.book_data)?;
        if snapshot.book.uuid != uuid {
            return Err(SyncError::UnexpectedBook {
                expected: uuid,
                found: snapshot.book.uuid,
            });
        }
        snapshot.book.sync.mark_synced(Some(data.updated_at));

        let book = snapshot.import(&self.library).await?;
        tracing::info!("Pulled book {} ({})", book.title, uuid);
        Ok(book)
    }

    pub async fn push_notes(&self) -> Result<SyncMeta, SyncError> {
        let token = self.token()?;
        let snapshot = NotesSnapshot::export(&self.library).await?;
        let payload = serde_json::to_string(&snapshot)?;

        let ack = self.remote.save_notes_data(token, &payload).await?;
        let meta = self
            .library
            .notes_tracker()
            .await?
            .mark_synced(ack.updated_at)
            .await?;
        tracing::info!("Pushed {} notes", snapshot.notes.len());
        Ok(meta)
    }

    pub async fn pull_notes(&self) -> Result<SyncMeta, SyncError> {
        let token = self.token()?;
        let data = self.remote.get_notes_data(token).await?;

        let mut snapshot: NotesSnapshot = serde_json::from_str(&data.notes_data)?;
        if data.updated_at.is_some() {
            snapshot.meta.server_updated_at = data.updated_at;
        }

        let meta = snapshot.import(&self.library).await?;
        tracing::info!("Pulled {} notes", snapshot.notes.len());
        Ok(meta)
    }

    /// One poll tick: refreshes sync flags from the remote listing. Never
    /// touches book content.
    pub async fn reconcile(&self) -> Result<ReconcileReport, SyncError> {
        let token = self.token()?;
        let listing = self.remote.get_books_list(token).await?;
        self.apply_listing(&listing).await
    }

    /// Fetches the remote listing for display, reconciling along the way.
    pub async fn list_remote_books(&self) -> Result<Vec<BookListing>, SyncError> {
        let token = self.token()?;
        let listing = self.remote.get_books_list(token).await?;
        self.apply_listing(&listing).await?;
        Ok(listing)
    }

    async fn apply_listing(&self, listing: &[BookListing]) -> Result<ReconcileReport, SyncError> {
        let mut report = ReconcileReport::default();

        for entry in listing {
            if self.library.repository().get_book(entry.uuid).await?.is_none() {
                report.remote_only.push(entry.uuid);
                continue;
            }

            report.checked += 1;
            let tracker = self.library.tracker(entry.uuid).await?;
            if tracker.reconcile(entry.updated_at).await? {
                let state = tracker.current().await.sync_state;
                tracing::debug!("Book {} is now {}", entry.uuid, state);
                report.changed.push((entry.uuid, state));
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sync::remote::{BookData, NotesData, RemoteError, SaveAck};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory server that stamps every save with a fixed clock.
    #[derive(Default)]
    pub(crate) struct MockRemote {
        pub clock: Mutex<Option<DateTime<Utc>>>,
        pub books: Mutex<HashMap<Uuid, BookData>>,
        pub notes: Mutex<Option<NotesData>>,
        pub fail: Mutex<Option<RemoteError>>,
        pub list_calls: AtomicUsize,
    }

    impl MockRemote {
        pub fn at(clock: DateTime<Utc>) -> Self {
            let remote = Self::default();
            *remote.clock.lock().unwrap() = Some(clock);
            remote
        }

        fn check(&self) -> Result<(), RemoteError> {
            match self.fail.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn now(&self) -> DateTime<Utc> {
            self.clock.lock().unwrap().unwrap_or_else(Utc::now)
        }
    }

    impl RemoteApi for MockRemote {
        async fn save_book_data(
            &self,
            _token: &str,
            request: &SaveBookRequest,
        ) -> Result<SaveAck, RemoteError> {
            self.check()?;
            let updated_at = self.now();
            self.books.lock().unwrap().insert(
                request.uuid,
                BookData {
                    uuid: request.uuid,
                    book_title: request.book_title.clone(),
                    book_data: request.book_data.clone(),
                    updated_at,
                },
            );
            Ok(SaveAck {
                updated_at: Some(updated_at),
            })
        }

        async fn get_book_data(&self, _token: &str, uuid: Uuid) -> Result<BookData, RemoteError> {
            self.check()?;
            self.books
                .lock()
                .unwrap()
                .get(&uuid)
                .cloned()
                .ok_or(RemoteError::Status {
                    status: 404,
                    message: "Book not found".into(),
                })
        }

        async fn get_books_list(&self, _token: &str) -> Result<Vec<BookListing>, RemoteError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(self
                .books
                .lock()
                .unwrap()
                .values()
                .map(|b| BookListing {
                    uuid: b.uuid,
                    book_title: b.book_title.clone(),
                    kind: None,
                    form: None,
                    genre: None,
                    description: None,
                    updated_at: b.updated_at,
                })
                .collect())
        }

        async fn save_notes_data(&self, _token: &str, notes_data: &str) -> Result<SaveAck, RemoteError> {
            self.check()?;
            let updated_at = self.now();
            *self.notes.lock().unwrap() = Some(NotesData {
                notes_data: notes_data.to_string(),
                updated_at: Some(updated_at),
            });
            Ok(SaveAck {
                updated_at: Some(updated_at),
            })
        }

        async fn get_notes_data(&self, _token: &str) -> Result<NotesData, RemoteError> {
            self.check()?;
            self.notes.lock().unwrap().clone().ok_or(RemoteError::MissingData)
        }
    }

    fn server_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap()
    }

    async fn setup(remote: MockRemote) -> (SyncCoordinator<MockRemote>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let library = Arc::new(Library::open(temp_dir.path()).await.unwrap());
        (
            SyncCoordinator::new(library, remote, Some("secret".into())),
            temp_dir,
        )
    }

    async fn dirty_book(coord: &SyncCoordinator<MockRemote>) -> Uuid {
        let book = coord
            .library()
            .create_book(Book::new("Pushed"))
            .await
            .unwrap();
        let session = coord.library().session(book.uuid).await.unwrap();
        session.create_scene("Only scene", None).await.unwrap();
        book.uuid
    }

    #[tokio::test]
    async fn test_push_marks_synced_at_server_time() {
        let (coord, _dir) = setup(MockRemote::at(server_time())).await;
        let uuid = dirty_book(&coord).await;

        let meta = coord.push_book(uuid).await.unwrap();
        assert_eq!(meta, SyncMeta::synced_at(server_time()));

        let stored = coord.library().get_book(uuid).await.unwrap();
        assert_eq!(stored.sync, SyncMeta::synced_at(server_time()));

        // The uploaded snapshot carries no local sync fields
        let sent = coord.remote.books.lock().unwrap()[&uuid].book_data.clone();
        assert!(!sent.contains("syncState"));
    }

    #[tokio::test]
    async fn test_failed_push_leaves_state_unchanged() {
        let remote = MockRemote::at(server_time());
        *remote.fail.lock().unwrap() = Some(RemoteError::Http("connection refused".into()));
        let (coord, _dir) = setup(remote).await;
        let uuid = dirty_book(&coord).await;
        let before = coord.library().get_book(uuid).await.unwrap().sync;

        let result = coord.push_book(uuid).await;
        assert!(matches!(result, Err(SyncError::Remote(RemoteError::Http(_)))));

        let after = coord.library().get_book(uuid).await.unwrap().sync;
        assert_eq!(after, before);
        assert_eq!(after.sync_state, SyncState::LocalChanges);
    }

    #[tokio::test]
    async fn test_push_requires_token_and_known_book() {
        let temp_dir = TempDir::new().unwrap();
        let library = Arc::new(Library::open(temp_dir.path()).await.unwrap());
        let anonymous = SyncCoordinator::new(Arc::clone(&library), MockRemote::default(), None);
        assert!(!anonymous.is_authenticated());
        assert!(matches!(
            anonymous.push_book(Uuid::new_v4()).await,
            Err(SyncError::NotAuthenticated)
        ));

        let coord = SyncCoordinator::new(library, MockRemote::default(), Some("t".into()));
        let missing = Uuid::new_v4();
        assert!(matches!(
            coord.push_book(missing).await,
            Err(SyncError::BookNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_pull_replaces_local_copy() {
        let (source, _a) = setup(MockRemote::at(server_time())).await;
        let uuid = dirty_book(&source).await;
        source.push_book(uuid).await.unwrap();

        // A second device sharing the same server
        let books = source.remote.books.lock().unwrap().clone();
        let remote = MockRemote::at(server_time());
        *remote.books.lock().unwrap() = books;
        let (target, _b) = setup(remote).await;

        let book = target.pull_book(uuid).await.unwrap();
        assert_eq!(book.title, "Pushed");
        assert_eq!(book.sync, SyncMeta::synced_at(server_time()));

        let session = target.library().session(uuid).await.unwrap();
        assert_eq!(session.list_scenes().await.unwrap()[0].title, "Only scene");
    }

    #[tokio::test]
    async fn test_failed_pull_import_leaves_state_unchanged() {
        let (coord, _dir) = setup(MockRemote::at(server_time())).await;
        let uuid = dirty_book(&coord).await;
        let before = coord.library().get_book(uuid).await.unwrap();

        // Server copy that cannot be imported: two scenes share an id
        let mut broken = BookSnapshot::export(coord.library(), uuid).await.unwrap();
        broken.book.title = "Server title".into();
        let duplicate = broken.scenes[0].clone();
        broken.scenes.push(duplicate);
        coord.remote.books.lock().unwrap().insert(
            uuid,
            BookData {
                uuid,
                book_title: "Server title".into(),
                book_data: broken.to_transport_json().unwrap(),
                updated_at: server_time(),
            },
        );

        let result = coord.pull_book(uuid).await;
        assert!(matches!(result, Err(SyncError::Snapshot(_))));

        let after = coord.library().get_book(uuid).await.unwrap();
        assert_eq!(after.title, "Pushed");
        assert_eq!(after.sync, before.sync);
        assert_eq!(after.sync.sync_state, SyncState::LocalChanges);
        let tracker = coord.library().tracker(uuid).await.unwrap();
        assert_eq!(tracker.current().await, before.sync);
    }

    #[tokio::test]
    async fn test_pull_unknown_book_is_remote_error() {
        let (coord, _dir) = setup(MockRemote::default()).await;
        let result = coord.pull_book(Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(SyncError::Remote(RemoteError::Status { status: 404, .. }))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_flags_newer_server_copy() {
        let (coord, _dir) = setup(MockRemote::at(server_time())).await;
        let uuid = dirty_book(&coord).await;
        coord.push_book(uuid).await.unwrap();

        // Another device pushed later
        coord
            .remote
            .books
            .lock()
            .unwrap()
            .get_mut(&uuid)
            .unwrap()
            .updated_at = server_time() + Duration::hours(1);
        let stranger = Uuid::new_v4();
        coord.remote.books.lock().unwrap().insert(
            stranger,
            BookData {
                uuid: stranger,
                book_title: "Elsewhere".into(),
                book_data: "{}".into(),
                updated_at: server_time(),
            },
        );

        let report = coord.reconcile().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.changed, vec![(uuid, SyncState::ServerChanges)]);
        assert_eq!(report.remote_only, vec![stranger]);

        // Content is untouched
        let session = coord.library().session(uuid).await.unwrap();
        assert_eq!(session.list_scenes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_local_changes_when_server_older() {
        let (coord, _dir) = setup(MockRemote::at(server_time())).await;
        let uuid = dirty_book(&coord).await;
        coord.push_book(uuid).await.unwrap();

        // Local edit after the push
        let tracker = coord.library().tracker(uuid).await.unwrap();
        tracker.touch().await.unwrap();

        let report = coord.reconcile().await.unwrap();
        assert!(report.changed.is_empty());
        assert_eq!(tracker.current().await.sync_state, SyncState::LocalChanges);
    }

    #[tokio::test]
    async fn test_notes_push_then_pull() {
        let (coord, _dir) = setup(MockRemote::at(server_time())).await;
        coord
            .library()
            .create_note(&crate::models::Note::new("Plot hole"))
            .await
            .unwrap();

        assert_eq!(
            coord.push_notes().await.unwrap(),
            SyncMeta::synced_at(server_time())
        );

        let note = coord.library().list_notes().await.unwrap().remove(0);
        coord.library().delete_note(note.uuid).await.unwrap();

        let meta = coord.pull_notes().await.unwrap();
        assert_eq!(meta, SyncMeta::synced_at(server_time()));
        assert_eq!(coord.library().list_notes().await.unwrap()[0].title, "Plot hole");
    }
}
