use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{decode_sync, decode_ts, encode_ts, upsert_book_row, BookRow, StoreError};
use crate::models::{Book, Note, NoteGroup, SyncMeta};

/// The book index and the free-standing notes collection.
#[derive(Debug, Clone)]
pub struct LibraryRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SyncRow {
    local_updated_at: Option<String>,
    server_updated_at: Option<String>,
    sync_state: String,
}

#[derive(sqlx::FromRow)]
struct NoteRow {
    id: i64,
    uuid: String,
    title: String,
    tags: String,
    body: String,
    sort_order: Option<i64>,
    note_group_uuid: Option<String>,
    book_uuid: Option<String>,
    updated_at: Option<String>,
}

#[derive(sqlx::FromRow)]
struct NoteGroupRow {
    id: i64,
    uuid: String,
    title: String,
    sort_order: Option<i64>,
    parent_uuid: Option<String>,
    kind_code: Option<String>,
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::InvalidData(format!("{} '{}': {}", field, raw, e)))
}

fn parse_opt_uuid(field: &str, raw: Option<String>) -> Result<Option<Uuid>, StoreError> {
    raw.map(|r| parse_uuid(field, &r)).transpose()
}

impl NoteRow {
    fn into_note(self) -> Result<Note, StoreError> {
        Ok(Note {
            id: Some(self.id),
            uuid: parse_uuid("note uuid", &self.uuid)?,
            title: self.title,
            tags: self.tags,
            body: self.body,
            order: self.sort_order,
            note_group_uuid: parse_opt_uuid("note group uuid", self.note_group_uuid)?,
            book_uuid: parse_opt_uuid("note book uuid", self.book_uuid)?,
            updated_at: decode_ts(self.updated_at),
        })
    }
}

impl NoteGroupRow {
    fn into_group(self) -> Result<NoteGroup, StoreError> {
        Ok(NoteGroup {
            id: Some(self.id),
            uuid: parse_uuid("note group uuid", &self.uuid)?,
            title: self.title,
            order: self.sort_order,
            parent_uuid: parse_opt_uuid("note group parent", self.parent_uuid)?,
            kind_code: self.kind_code,
        })
    }
}

async fn insert_note(conn: &mut SqliteConnection, note: &Note) -> Result<i64, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO notes (uuid, title, tags, body, sort_order, note_group_uuid, book_uuid, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(note.uuid.to_string())
    .bind(&note.title)
    .bind(&note.tags)
    .bind(&note.body)
    .bind(note.order)
    .bind(note.note_group_uuid.map(|u| u.to_string()))
    .bind(note.book_uuid.map(|u| u.to_string()))
    .bind(encode_ts(note.updated_at))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn insert_group(conn: &mut SqliteConnection, group: &NoteGroup) -> Result<i64, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO note_groups (uuid, title, sort_order, parent_uuid, kind_code)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(group.uuid.to_string())
    .bind(&group.title)
    .bind(group.order)
    .bind(group.parent_uuid.map(|u| u.to_string()))
    .bind(&group.kind_code)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn write_notes_meta(conn: &mut SqliteConnection, meta: &SyncMeta) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO notes_meta (id, local_updated_at, server_updated_at, sync_state)
        VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            local_updated_at = excluded.local_updated_at,
            server_updated_at = excluded.server_updated_at,
            sync_state = excluded.sync_state
        "#,
    )
    .bind(encode_ts(meta.local_updated_at))
    .bind(encode_ts(meta.server_updated_at))
    .bind(meta.sync_state.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl LibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Book index
    // ------------------------------------------------------------------

    pub async fn get_book(&self, uuid: Uuid) -> Result<Option<Book>, StoreError> {
        let row: Option<BookRow> = sqlx::query_as("SELECT * FROM books WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(BookRow::into_book).transpose()
    }

    pub async fn list_books(&self) -> Result<Vec<Book>, StoreError> {
        let rows: Vec<BookRow> = sqlx::query_as("SELECT * FROM books ORDER BY title, uuid")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(BookRow::into_book).collect()
    }

    /// Creates the index entry or overwrites every field of an existing one.
    pub async fn upsert_book(&self, book: &Book) -> Result<(), StoreError> {
        upsert_book_row(&self.pool, "books", book).await
    }

    /// Persists only the sync fields. Returns false if the book is unknown.
    pub async fn save_book_sync(&self, uuid: Uuid, meta: &SyncMeta) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE books SET local_updated_at = ?, server_updated_at = ?, sync_state = ? WHERE uuid = ?",
        )
        .bind(encode_ts(meta.local_updated_at))
        .bind(encode_ts(meta.server_updated_at))
        .bind(meta.sync_state.to_string())
        .bind(uuid.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_book_sync(&self, uuid: Uuid) -> Result<Option<SyncMeta>, StoreError> {
        let row: Option<SyncRow> = sqlx::query_as(
            "SELECT local_updated_at, server_updated_at, sync_state FROM books WHERE uuid = ?",
        )
        .bind(uuid.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| decode_sync(r.local_updated_at, r.server_updated_at, &r.sync_state)))
    }

    pub async fn delete_book(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM books WHERE uuid = ?")
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// The notes sync record; a fresh library reads as synced.
    pub async fn get_notes_meta(&self) -> Result<SyncMeta, StoreError> {
        let row: Option<SyncRow> = sqlx::query_as(
            "SELECT local_updated_at, server_updated_at, sync_state FROM notes_meta WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| decode_sync(r.local_updated_at, r.server_updated_at, &r.sync_state))
            .unwrap_or_default())
    }

    pub async fn save_notes_meta(&self, meta: &SyncMeta) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        write_notes_meta(&mut conn, meta).await
    }

    pub async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        let rows: Vec<NoteRow> = sqlx::query_as("SELECT * FROM notes ORDER BY sort_order, id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(NoteRow::into_note).collect()
    }

    pub async fn get_note(&self, uuid: Uuid) -> Result<Option<Note>, StoreError> {
        let row: Option<NoteRow> = sqlx::query_as("SELECT * FROM notes WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(NoteRow::into_note).transpose()
    }

    pub async fn list_note_groups(&self) -> Result<Vec<NoteGroup>, StoreError> {
        let rows: Vec<NoteGroupRow> =
            sqlx::query_as("SELECT * FROM note_groups ORDER BY sort_order, id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(NoteGroupRow::into_group).collect()
    }

    pub async fn create_note(&self, note: &Note) -> Result<Note, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let id = insert_note(&mut conn, note).await?;
        Ok(Note {
            id: Some(id),
            ..note.clone()
        })
    }

    pub async fn create_note_group(&self, group: &NoteGroup) -> Result<NoteGroup, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let id = insert_group(&mut conn, group).await?;
        Ok(NoteGroup {
            id: Some(id),
            ..group.clone()
        })
    }

    /// Rewrites title, tags and body. Returns false if the note is unknown.
    pub async fn update_note(&self, note: &Note) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notes SET title = ?, tags = ?, body = ?, sort_order = ?,
                note_group_uuid = ?, updated_at = ?
            WHERE uuid = ?
            "#,
        )
        .bind(&note.title)
        .bind(&note.tags)
        .bind(&note.body)
        .bind(note.order)
        .bind(note.note_group_uuid.map(|u| u.to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(note.uuid.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_note(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM notes WHERE uuid = ?")
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replaces the whole notes collection and its sync record in one
    /// transaction.
    pub async fn replace_notes(
        &self,
        notes: &[Note],
        groups: &[NoteGroup],
        meta: &SyncMeta,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM notes").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM note_groups")
            .execute(&mut *tx)
            .await?;

        for group in groups {
            insert_group(&mut tx, group).await?;
        }
        for note in notes {
            insert_note(&mut tx, note).await?;
        }
        write_notes_meta(&mut tx, meta).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_library;
    use crate::models::SyncState;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct TestContext {
        repo: LibraryRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = open_library(&temp_dir.path().join("library.db"))
            .await
            .unwrap();
        TestContext {
            repo: LibraryRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_book() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let mut book = Book::new("Nightfall").with_author("R. Vale");
        repo.upsert_book(&book).await.unwrap();

        let fetched = repo.get_book(book.uuid).await.unwrap().unwrap();
        assert_eq!(fetched, book);

        book.title = "Nightfall, Revised".to_string();
        repo.upsert_book(&book).await.unwrap();

        let books = repo.list_books().await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Nightfall, Revised");
    }

    #[tokio::test]
    async fn test_get_missing_book_returns_none() {
        let ctx = setup_repo().await;
        assert!(ctx.repo.get_book(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_book_sync() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let book = Book::new("Nightfall");
        repo.upsert_book(&book).await.unwrap();

        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut meta = SyncMeta::default();
        meta.touch(at);
        assert!(repo.save_book_sync(book.uuid, &meta).await.unwrap());

        let stored = repo.get_book_sync(book.uuid).await.unwrap().unwrap();
        assert_eq!(stored.sync_state, SyncState::LocalChanges);
        assert_eq!(stored.local_updated_at, Some(at));

        assert!(!repo.save_book_sync(Uuid::new_v4(), &meta).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_book() {
        let ctx = setup_repo().await;
        let book = Book::new("Gone");
        ctx.repo.upsert_book(&book).await.unwrap();

        assert!(ctx.repo.delete_book(book.uuid).await.unwrap());
        assert!(ctx.repo.get_book(book.uuid).await.unwrap().is_none());
        assert!(!ctx.repo.delete_book(book.uuid).await.unwrap());
    }

    #[tokio::test]
    async fn test_notes_meta_defaults_then_persists() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        assert_eq!(repo.get_notes_meta().await.unwrap(), SyncMeta::default());

        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        repo.save_notes_meta(&SyncMeta::synced_at(at)).await.unwrap();
        assert_eq!(
            repo.get_notes_meta().await.unwrap(),
            SyncMeta::synced_at(at)
        );
    }

    #[tokio::test]
    async fn test_note_crud() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let group = repo
            .create_note_group(&NoteGroup::new("Ideas"))
            .await
            .unwrap();
        let note = repo
            .create_note(&Note::new("Villain").with_tags("cast").with_group(group.uuid))
            .await
            .unwrap();
        assert!(note.id.is_some());

        let mut edited = note.clone();
        edited.body = "Motive: revenge".to_string();
        assert!(repo.update_note(&edited).await.unwrap());

        let fetched = repo.get_note(note.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.body, "Motive: revenge");
        assert_eq!(fetched.note_group_uuid, Some(group.uuid));

        assert!(repo.delete_note(note.uuid).await.unwrap());
        assert!(repo.list_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_notes() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create_note(&Note::new("Old")).await.unwrap();

        let group = NoteGroup::new("World");
        let notes = vec![Note::new("Map").with_group(group.uuid), Note::new("Calendar")];
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap();
        repo.replace_notes(&notes, &[group.clone()], &SyncMeta::synced_at(at))
            .await
            .unwrap();

        let titles: Vec<String> = repo
            .list_notes()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["Map", "Calendar"]);
        assert_eq!(repo.list_note_groups().await.unwrap()[0].uuid, group.uuid);
        assert_eq!(
            repo.get_notes_meta().await.unwrap().sync_state,
            SyncState::Synced
        );
    }
}
