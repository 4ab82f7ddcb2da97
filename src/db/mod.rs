//! SQLite storage.
//!
//! Two kinds of database live under the data directory:
//! ```text
//! <DATA_DIR>/
//!   library.db          book index, notes, notes sync record
//!   books/
//!     <book_uuid>.db    chapters, scenes, bodies, schema collections
//! ```

mod book_store;
mod library_repo;

pub use book_store::{AuxCollection, BookStore, StoreContents};
pub use library_repo::LibraryRepository;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Sqlite};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Book, SyncMeta};

/// Errors raised by the storage layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to create directory '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Invalid JSON record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

async fn connect(path: &Path) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Opens (creating if missing) the library database and runs its migrations.
pub async fn open_library(path: &Path) -> Result<SqlitePool, StoreError> {
    let pool = connect(path).await?;
    sqlx::migrate!("./migrations/library").run(&pool).await?;
    Ok(pool)
}

/// Opens (creating if missing) one book's store and runs its migrations.
pub async fn open_book_store(path: &Path) -> Result<SqlitePool, StoreError> {
    let pool = connect(path).await?;
    sqlx::migrate!("./migrations/book").run(&pool).await?;
    Ok(pool)
}

pub(crate) fn encode_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339())
}

pub(crate) fn decode_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!("Ignoring unparseable timestamp '{}': {}", raw, e);
            None
        }
    }
}

pub(crate) fn decode_sync(
    local_updated_at: Option<String>,
    server_updated_at: Option<String>,
    sync_state: &str,
) -> SyncMeta {
    SyncMeta {
        local_updated_at: decode_ts(local_updated_at),
        server_updated_at: decode_ts(server_updated_at),
        sync_state: sync_state.parse().unwrap_or_default(),
    }
}

/// Row shape shared by the library `books` index and a store's `book` table.
#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    uuid: String,
    title: String,
    author: String,
    form: String,
    genre: String,
    kind: Option<String>,
    cover: Option<String>,
    description: Option<String>,
    configuration_uuid: String,
    configuration_title: String,
    chapter_only_mode: i64,
    local_updated_at: Option<String>,
    server_updated_at: Option<String>,
    sync_state: String,
}

impl BookRow {
    pub(crate) fn into_book(self) -> Result<Book, StoreError> {
        let uuid = Uuid::parse_str(&self.uuid)
            .map_err(|e| StoreError::InvalidData(format!("book uuid '{}': {}", self.uuid, e)))?;

        Ok(Book {
            uuid,
            title: self.title,
            author: self.author,
            form: self.form,
            genre: self.genre,
            kind: self.kind,
            cover: self.cover,
            description: self.description,
            configuration_uuid: self.configuration_uuid,
            configuration_title: self.configuration_title,
            chapter_only_mode: self.chapter_only_mode != 0,
            sync: decode_sync(
                self.local_updated_at,
                self.server_updated_at,
                &self.sync_state,
            ),
        })
    }
}

/// Inserts or replaces a book row in `table` (`books` or `book`).
pub(crate) async fn upsert_book_row<'e, E>(
    executor: E,
    table: &str,
    book: &Book,
) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"
        INSERT INTO {table} (uuid, title, author, form, genre, kind, cover, description,
            configuration_uuid, configuration_title, chapter_only_mode,
            local_updated_at, server_updated_at, sync_state)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            title = excluded.title,
            author = excluded.author,
            form = excluded.form,
            genre = excluded.genre,
            kind = excluded.kind,
            cover = excluded.cover,
            description = excluded.description,
            configuration_uuid = excluded.configuration_uuid,
            configuration_title = excluded.configuration_title,
            chapter_only_mode = excluded.chapter_only_mode,
            local_updated_at = excluded.local_updated_at,
            server_updated_at = excluded.server_updated_at,
            sync_state = excluded.sync_state
        "#
    );

    sqlx::query(&sql)
        .bind(book.uuid.to_string())
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.form)
        .bind(&book.genre)
        .bind(&book.kind)
        .bind(&book.cover)
        .bind(&book.description)
        .bind(&book.configuration_uuid)
        .bind(&book.configuration_title)
        .bind(i64::from(book.chapter_only_mode))
        .bind(encode_ts(book.sync.local_updated_at))
        .bind(encode_ts(book.sync.server_updated_at))
        .bind(book.sync.sync_state.to_string())
        .execute(executor)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .unwrap();
        tables.into_iter().map(|t| t.0).collect()
    }

    #[tokio::test]
    async fn test_open_library_creates_tables() {
        let temp_dir = tempdir().unwrap();
        let pool = open_library(&temp_dir.path().join("library.db"))
            .await
            .unwrap();

        let names = table_names(&pool).await;
        assert!(names.contains(&"books".to_string()));
        assert!(names.contains(&"notes".to_string()));
        assert!(names.contains(&"note_groups".to_string()));
        assert!(names.contains(&"notes_meta".to_string()));
    }

    #[tokio::test]
    async fn test_open_book_store_creates_nested_dirs_and_tables() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("books").join("abc.db");
        let pool = open_book_store(&path).await.unwrap();

        assert!(path.exists());
        let names = table_names(&pool).await;
        for table in ["book", "chapters", "scenes", "scene_bodies", "aux_records"] {
            assert!(names.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        assert_eq!(decode_ts(encode_ts(Some(now))), Some(now));
        assert_eq!(decode_ts(None), None);
        assert_eq!(decode_ts(Some("yesterday".into())), None);
    }

    #[test]
    fn test_decode_sync_falls_back_to_synced() {
        let meta = decode_sync(None, None, "garbage");
        assert_eq!(meta, SyncMeta::default());
    }
}
