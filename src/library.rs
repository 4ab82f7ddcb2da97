//! Books, their stores and every structural mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OnceCell};
use uuid::Uuid;

use crate::db::{open_book_store, open_library, BookStore, LibraryRepository, StoreError};
use crate::models::{Book, Chapter, Note, NoteGroup, Scene, SceneBody};
use crate::ordering::{MovedScene, OrderingEngine};
use crate::sync::{SyncTarget, SyncTracker};

/// Top-level handle on a data directory.
///
/// Owns the sync trackers and one session per opened book.
pub struct Library {
    data_dir: PathBuf,
    repo: LibraryRepository,
    sessions: Mutex<HashMap<Uuid, Arc<BookSession>>>,
    trackers: Mutex<HashMap<Uuid, Arc<SyncTracker>>>,
    notes_tracker: OnceCell<Arc<SyncTracker>>,
}

impl Library {
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let pool = open_library(&data_dir.join("library.db")).await?;
        tracing::debug!("Opened library at {}", data_dir.display());

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            repo: LibraryRepository::new(pool),
            sessions: Mutex::new(HashMap::new()),
            trackers: Mutex::new(HashMap::new()),
            notes_tracker: OnceCell::new(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn repository(&self) -> &LibraryRepository {
        &self.repo
    }

    pub fn book_store_path(&self, uuid: Uuid) -> PathBuf {
        self.data_dir.join("books").join(format!("{}.db", uuid))
    }

    // ------------------------------------------------------------------
    // Books
    // ------------------------------------------------------------------

    pub async fn list_books(&self) -> Result<Vec<Book>, StoreError> {
        self.repo.list_books().await
    }

    /// Looks up a book in the index. Sync fields reflect the tracker.
    pub async fn get_book(&self, uuid: Uuid) -> Result<Book, StoreError> {
        self.repo
            .get_book(uuid)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Book {}", uuid)))
    }

    /// Registers a new book and creates its store. The book starts with
    /// local changes since the server has never seen it.
    pub async fn create_book(&self, book: Book) -> Result<Book, StoreError> {
        self.repo.upsert_book(&book).await?;
        let session = self.session(book.uuid).await?;
        session.tracker().touch().await?;

        let book = self.get_book(book.uuid).await?;
        session.store().put_book(&book).await?;
        tracing::info!("Created book {} ({})", book.title, book.uuid);
        Ok(book)
    }

    /// Rewrites a book's descriptive fields. Sync fields are owned by the
    /// tracker and ignored here.
    pub async fn update_book(&self, book: &Book) -> Result<Book, StoreError> {
        let tracker = self.tracker(book.uuid).await?;
        let session = self.session(book.uuid).await?;
        let _writer = session.exclusive().await;

        let mut updated = book.clone();
        updated.sync = tracker.current().await;
        self.repo.upsert_book(&updated).await?;
        tracker.touch().await?;

        let updated = self.get_book(book.uuid).await?;
        session.store().put_book(&updated).await?;
        Ok(updated)
    }

    /// Removes a book, its store and its tracker. Returns false if the
    /// book was unknown.
    pub async fn delete_book(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let session = self.sessions.lock().await.remove(&uuid);
        if let Some(session) = session {
            let _writer = session.exclusive().await;
            session.store().pool().close().await;
        }
        self.trackers.lock().await.remove(&uuid);

        let existed = self.repo.delete_book(uuid).await?;

        let path = self.book_store_path(uuid);
        for suffix in ["", "-wal", "-shm"] {
            let file = PathBuf::from(format!("{}{}", path.display(), suffix));
            if file.exists() {
                std::fs::remove_file(&file).map_err(|e| StoreError::Io(file.clone(), e))?;
            }
        }

        if existed {
            tracing::info!("Deleted book {}", uuid);
        }
        Ok(existed)
    }

    /// Returns the sync tracker of a book, loading it on first access.
    pub async fn tracker(&self, uuid: Uuid) -> Result<Arc<SyncTracker>, StoreError> {
        let mut trackers = self.trackers.lock().await;
        if let Some(tracker) = trackers.get(&uuid) {
            return Ok(Arc::clone(tracker));
        }

        let meta = self
            .repo
            .get_book_sync(uuid)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Book {}", uuid)))?;
        let tracker = Arc::new(SyncTracker::new(
            SyncTarget::Book(uuid),
            self.repo.clone(),
            meta,
        ));
        trackers.insert(uuid, Arc::clone(&tracker));
        Ok(tracker)
    }

    pub async fn notes_tracker(&self) -> Result<Arc<SyncTracker>, StoreError> {
        let tracker = self
            .notes_tracker
            .get_or_try_init(|| async {
                let meta = self.repo.get_notes_meta().await?;
                Ok::<_, StoreError>(Arc::new(SyncTracker::new(
                    SyncTarget::Notes,
                    self.repo.clone(),
                    meta,
                )))
            })
            .await?;
        Ok(Arc::clone(tracker))
    }

    /// Opens a book's store, creating it on first access.
    pub async fn session(&self, uuid: Uuid) -> Result<Arc<BookSession>, StoreError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&uuid) {
            return Ok(Arc::clone(session));
        }

        let book = self.get_book(uuid).await?;
        let tracker = self.tracker(uuid).await?;

        let pool = open_book_store(&self.book_store_path(uuid)).await?;
        let store = BookStore::new(pool);
        if store.get_book().await?.is_none() {
            store.put_book(&book).await?;
        }

        let session = Arc::new(BookSession {
            uuid,
            store,
            tracker,
            writer: Mutex::new(()),
        });
        sessions.insert(uuid, Arc::clone(&session));
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    pub async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        self.repo.list_notes().await
    }

    pub async fn list_note_groups(&self) -> Result<Vec<NoteGroup>, StoreError> {
        self.repo.list_note_groups().await
    }

    pub async fn create_note(&self, note: &Note) -> Result<Note, StoreError> {
        let created = self.repo.create_note(note).await?;
        self.notes_tracker().await?.touch().await?;
        Ok(created)
    }

    pub async fn create_note_group(&self, group: &NoteGroup) -> Result<NoteGroup, StoreError> {
        let created = self.repo.create_note_group(group).await?;
        self.notes_tracker().await?.touch().await?;
        Ok(created)
    }

    pub async fn update_note(&self, note: &Note) -> Result<Note, StoreError> {
        if !self.repo.update_note(note).await? {
            return Err(StoreError::NotFound(format!("Note {}", note.uuid)));
        }
        self.notes_tracker().await?.touch().await?;
        self.repo
            .get_note(note.uuid)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Note {}", note.uuid)))
    }

    pub async fn delete_note(&self, uuid: Uuid) -> Result<(), StoreError> {
        if !self.repo.delete_note(uuid).await? {
            return Err(StoreError::NotFound(format!("Note {}", uuid)));
        }
        self.notes_tracker().await?.touch().await?;
        Ok(())
    }
}

/// Fields of a scene that may be edited together.
#[derive(Debug, Clone, Default)]
pub struct SceneChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    /// `Some(None)` detaches the scene from its chapter.
    pub chapter_id: Option<Option<i64>>,
    pub order: Option<i64>,
}

/// An opened book. Structural mutations take the writer lock, so two
/// reorderings of the same book never interleave.
pub struct BookSession {
    uuid: Uuid,
    store: BookStore,
    tracker: Arc<SyncTracker>,
    writer: Mutex<()>,
}

impl BookSession {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn store(&self) -> &BookStore {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<SyncTracker> {
        &self.tracker
    }

    /// Waits for exclusive write access to this book.
    pub(crate) async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    fn engine(&self) -> OrderingEngine<'_> {
        OrderingEngine::new(&self.store)
    }

    /// Chapterless placement always exists.
    async fn has_chapter(&self, chapter_id: Option<i64>) -> Result<bool, StoreError> {
        match chapter_id {
            Some(id) => Ok(self.store.get_chapter(id).await?.is_some()),
            None => Ok(true),
        }
    }

    async fn chapter_only_mode(&self) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get_book()
            .await?
            .map(|b| b.chapter_only_mode)
            .unwrap_or(false))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn list_scenes(&self) -> Result<Vec<Scene>, StoreError> {
        self.store.list_scenes().await
    }

    pub async fn list_chapters(&self) -> Result<Vec<Chapter>, StoreError> {
        self.store.list_chapters().await
    }

    pub async fn get_scene(&self, id: i64) -> Result<Option<Scene>, StoreError> {
        self.store.get_scene(id).await
    }

    pub async fn get_body(&self, scene_id: i64) -> Result<Option<SceneBody>, StoreError> {
        self.store.get_body(scene_id).await
    }

    // ------------------------------------------------------------------
    // Scenes
    // ------------------------------------------------------------------

    /// Creates a scene at the end of its chapter (or of the chapterless
    /// scenes). Fails with `NotFound` if the chapter is unknown.
    pub async fn create_scene(
        &self,
        title: &str,
        chapter_id: Option<i64>,
    ) -> Result<Scene, StoreError> {
        let _writer = self.exclusive().await;

        if !self.has_chapter(chapter_id).await? {
            return Err(StoreError::NotFound(format!("Chapter {:?}", chapter_id)));
        }
        let scene = self.store.insert_scene(title, chapter_id, 0).await?;
        self.engine()
            .recalculate(Some(MovedScene {
                id: scene.id,
                new_chapter_id: chapter_id,
            }))
            .await?;
        self.tracker.touch().await?;

        self.store
            .get_scene(scene.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Scene {}", scene.id)))
    }

    /// Applies `changes` to a scene. Returns `None` if the scene is unknown.
    pub async fn update_scene(
        &self,
        id: i64,
        changes: SceneChanges,
    ) -> Result<Option<Scene>, StoreError> {
        let _writer = self.exclusive().await;

        let Some(mut scene) = self.store.get_scene(id).await? else {
            return Ok(None);
        };

        let chapter_changed = changes
            .chapter_id
            .is_some_and(|chapter_id| chapter_id != scene.chapter_id);
        let order_changed = changes.order.is_some_and(|order| order != scene.order);
        if chapter_changed && !self.has_chapter(changes.chapter_id.flatten()).await? {
            return Err(StoreError::NotFound(format!(
                "Chapter {:?}",
                changes.chapter_id.flatten()
            )));
        }

        if let Some(title) = changes.title {
            scene.title = title;
        }
        if let Some(order) = changes.order {
            scene.order = order;
        }
        let new_chapter = changes.chapter_id.unwrap_or(scene.chapter_id);

        // A chapter change is placed by the engine, not written directly
        self.store.update_scene(&scene).await?;
        if let Some(body) = changes.body {
            self.store.set_body(id, &body).await?;
        }

        if chapter_changed {
            self.engine()
                .recalculate(Some(MovedScene {
                    id,
                    new_chapter_id: new_chapter,
                }))
                .await?;
        } else if order_changed {
            self.engine().recalculate(None).await?;
        }
        self.tracker.touch().await?;

        self.store.get_scene(id).await
    }

    /// Moves a scene into `chapter_id` (or out of any chapter), appending
    /// it to the end of the destination. Unknown scenes and chapters are
    /// left alone.
    pub async fn move_scene(&self, id: i64, chapter_id: Option<i64>) -> Result<bool, StoreError> {
        let _writer = self.exclusive().await;

        if self.store.get_scene(id).await?.is_none() || !self.has_chapter(chapter_id).await? {
            return Ok(false);
        }
        self.engine()
            .recalculate(Some(MovedScene {
                id,
                new_chapter_id: chapter_id,
            }))
            .await?;
        self.tracker.touch().await?;
        Ok(true)
    }

    /// Writes a raw order value, then renormalizes.
    pub async fn set_scene_order(&self, id: i64, order: i64) -> Result<bool, StoreError> {
        let _writer = self.exclusive().await;

        if !self.store.set_scene_order(id, order).await? {
            return Ok(false);
        }
        self.engine().recalculate(None).await?;
        self.tracker.touch().await?;
        Ok(true)
    }

    /// Exchanges two scenes' orders and renormalizes. Returns whether the
    /// swap was written.
    pub async fn swap_scenes(&self, a: i64, b: i64) -> Result<bool, StoreError> {
        let _writer = self.exclusive().await;

        let swapped = self.store.swap_scene_orders(a, b).await?;
        let repaired = self.engine().recalculate(None).await?;
        if swapped || repaired > 0 {
            self.tracker.touch().await?;
        }
        Ok(swapped)
    }

    pub async fn delete_scene(&self, id: i64) -> Result<bool, StoreError> {
        let _writer = self.exclusive().await;

        if !self.store.delete_scene(id).await? {
            return Ok(false);
        }
        self.engine().recalculate(None).await?;
        self.tracker.touch().await?;
        Ok(true)
    }

    /// Full renumbering with no moved scene.
    pub async fn recalculate_global_order(&self) -> Result<usize, StoreError> {
        let _writer = self.exclusive().await;

        let written = self.engine().recalculate(None).await?;
        if written > 0 {
            self.tracker.touch().await?;
        }
        Ok(written)
    }

    // ------------------------------------------------------------------
    // Chapters
    // ------------------------------------------------------------------

    /// Appends a chapter. In chapter-only mode the chapter also gets its
    /// content scene.
    pub async fn create_chapter(&self, title: &str) -> Result<Chapter, StoreError> {
        let _writer = self.exclusive().await;

        let order = self.store.max_chapter_order().await? + 1;
        let chapter = self.store.insert_chapter(title, order).await?;

        let mut moved = None;
        if self.chapter_only_mode().await? {
            let content = self.store.insert_scene(title, Some(chapter.id), 0).await?;
            self.store
                .set_chapter_content_scene(chapter.id, Some(content.id))
                .await?;
            moved = Some(MovedScene {
                id: content.id,
                new_chapter_id: Some(chapter.id),
            });
        }

        self.engine().normalize_chapters().await?;
        self.engine().recalculate(moved).await?;
        self.tracker.touch().await?;

        self.store
            .get_chapter(chapter.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Chapter {}", chapter.id)))
    }

    /// Renames a chapter and its content scene.
    pub async fn rename_chapter(&self, id: i64, title: &str) -> Result<bool, StoreError> {
        let _writer = self.exclusive().await;

        let Some(chapter) = self.store.get_chapter(id).await? else {
            return Ok(false);
        };
        self.store.rename_chapter(id, title).await?;

        if let Some(content_id) = chapter.content_scene_id {
            if let Some(mut scene) = self.store.get_scene(content_id).await? {
                scene.title = title.to_string();
                self.store.update_scene(&scene).await?;
            }
        }
        self.tracker.touch().await?;
        Ok(true)
    }

    /// Writes a raw chapter order, then renumbers chapters and scenes.
    pub async fn set_chapter_order(&self, id: i64, order: i64) -> Result<bool, StoreError> {
        let _writer = self.exclusive().await;

        if self.store.get_chapter(id).await?.is_none() {
            return Ok(false);
        }
        self.store.apply_chapter_orders(&[(id, order)]).await?;
        self.renormalize().await?;
        Ok(true)
    }

    /// Moves chapter `active_id` to the position held by `over_id`.
    pub async fn reorder_chapters(&self, active_id: i64, over_id: i64) -> Result<bool, StoreError> {
        let _writer = self.exclusive().await;

        let mut chapters = self.store.list_chapters().await?;
        let from = chapters.iter().position(|c| c.id == active_id);
        let to = chapters.iter().position(|c| c.id == over_id);
        let (Some(from), Some(to)) = (from, to) else {
            return Ok(false);
        };
        if from == to {
            return Ok(false);
        }

        let active = chapters.remove(from);
        chapters.insert(to, active);

        let orders: Vec<(i64, i64)> = chapters.iter().zip(1..).map(|(c, o)| (c.id, o)).collect();
        self.store.apply_chapter_orders(&orders).await?;
        self.renormalize().await?;
        Ok(true)
    }

    /// Deletes a chapter. Member scenes become chapterless; the content
    /// scene is deleted with it.
    pub async fn delete_chapter(&self, id: i64) -> Result<bool, StoreError> {
        let _writer = self.exclusive().await;

        if self.store.delete_chapter_detaching(id).await?.is_none() {
            return Ok(false);
        }
        self.renormalize().await?;
        Ok(true)
    }

    async fn renormalize(&self) -> Result<(), StoreError> {
        self.engine().normalize_chapters().await?;
        self.engine().recalculate(None).await?;
        self.tracker.touch().await?;
        Ok(())
    }
}
