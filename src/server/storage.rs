//! Server-side snapshot storage.
//!
//! Snapshots are kept per user as JSON files:
//! ```text
//! <DATA_DIR>/
//!   <user_id>/
//!     books/
//!       <book_uuid>.json
//!     notes.json
//! ```
//!
//! Writes go through a temp file and a rename so a reader never sees a
//! half-written snapshot.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::sync::remote::{BookData, BookListing, NotesData, SaveBookRequest};

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// A stored file is not valid JSON.
    JsonError(PathBuf, serde_json::Error),
    /// Invalid user ID (e.g., contains path separators).
    InvalidUserId(String),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            ServerStorageError::JsonError(path, e) => {
                write!(f, "Corrupt snapshot {}: {}", path.display(), e)
            }
            ServerStorageError::InvalidUserId(id) => write!(f, "Invalid user ID: {}", id),
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::IoError(_, e) => Some(e),
            ServerStorageError::JsonError(_, e) => Some(e),
            _ => None,
        }
    }
}

/// A book snapshot as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBook {
    #[serde(flatten)]
    pub request: SaveBookRequest,
    pub updated_at: DateTime<Utc>,
}

impl StoredBook {
    pub fn listing(&self) -> BookListing {
        BookListing {
            uuid: self.request.uuid,
            book_title: self.request.book_title.clone(),
            kind: self.request.kind.clone(),
            form: self.request.form.clone(),
            genre: self.request.genre.clone(),
            description: self.request.description.clone(),
            updated_at: self.updated_at,
        }
    }

    pub fn data(&self) -> BookData {
        BookData {
            uuid: self.request.uuid,
            book_title: self.request.book_title.clone(),
            book_data: self.request.book_data.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Per-user snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotStorage {
    data_dir: PathBuf,
}

impl SnapshotStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Validates a user ID to prevent path traversal attacks.
    fn validate_user_id(user_id: &str) -> Result<(), ServerStorageError> {
        if user_id.is_empty()
            || user_id.contains('/')
            || user_id.contains('\\')
            || user_id.contains("..")
            || user_id.starts_with('.')
        {
            return Err(ServerStorageError::InvalidUserId(user_id.to_string()));
        }
        Ok(())
    }

    fn books_dir(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(user_id).join("books")
    }

    fn book_path(&self, user_id: &str, uuid: Uuid) -> PathBuf {
        self.books_dir(user_id).join(format!("{}.json", uuid))
    }

    fn notes_path(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(user_id).join("notes.json")
    }

    /// Stores a book snapshot and returns its new server timestamp.
    ///
    /// Timestamps of one book strictly increase across saves.
    pub fn save_book(
        &self,
        user_id: &str,
        request: SaveBookRequest,
    ) -> Result<DateTime<Utc>, ServerStorageError> {
        let previous = self.load_book(user_id, request.uuid)?;
        let updated_at = next_timestamp(previous.map(|b| b.updated_at));

        let path = self.book_path(user_id, request.uuid);
        write_json(&path, &StoredBook { request, updated_at })?;
        Ok(updated_at)
    }

    pub fn load_book(
        &self,
        user_id: &str,
        uuid: Uuid,
    ) -> Result<Option<StoredBook>, ServerStorageError> {
        Self::validate_user_id(user_id)?;
        read_json(&self.book_path(user_id, uuid))
    }

    pub fn list_books(&self, user_id: &str) -> Result<Vec<StoredBook>, ServerStorageError> {
        Self::validate_user_id(user_id)?;
        let dir = self.books_dir(user_id);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ServerStorageError::IoError(dir, e)),
        };

        let mut books = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| ServerStorageError::IoError(dir.clone(), e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(book) = read_json::<StoredBook>(&path)? {
                books.push(book);
            }
        }
        books.sort_by(|a, b| a.request.book_title.cmp(&b.request.book_title));
        Ok(books)
    }

    pub fn save_notes(
        &self,
        user_id: &str,
        notes_data: String,
    ) -> Result<DateTime<Utc>, ServerStorageError> {
        let previous = self.load_notes(user_id)?;
        let updated_at = next_timestamp(previous.and_then(|n| n.updated_at));

        write_json(
            &self.notes_path(user_id),
            &NotesData {
                notes_data,
                updated_at: Some(updated_at),
            },
        )?;
        Ok(updated_at)
    }

    pub fn load_notes(&self, user_id: &str) -> Result<Option<NotesData>, ServerStorageError> {
        Self::validate_user_id(user_id)?;
        read_json(&self.notes_path(user_id))
    }
}

fn next_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if prev >= now => prev + Duration::milliseconds(1),
        _ => now,
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, ServerStorageError> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| ServerStorageError::JsonError(path.to_path_buf(), e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ServerStorageError::IoError(path.to_path_buf(), e)),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ServerStorageError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| ServerStorageError::IoError(dir.to_path_buf(), e))?;
    }

    let bytes = serde_json::to_vec(value)
        .map_err(|e| ServerStorageError::JsonError(path.to_path_buf(), e))?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, bytes).map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
    fs::rename(&temp_path, path).map_err(|e| ServerStorageError::IoError(path.to_path_buf(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (SnapshotStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = SnapshotStorage::new(temp_dir.path());
        (storage, temp_dir)
    }

    fn request(title: &str) -> SaveBookRequest {
        SaveBookRequest {
            uuid: Uuid::new_v4(),
            book_title: title.to_string(),
            kind: None,
            form: None,
            genre: Some("mystery".into()),
            cover: None,
            description: None,
            book_data: r#"{"book":{}}"#.to_string(),
        }
    }

    #[test]
    fn test_validate_user_id() {
        assert!(SnapshotStorage::validate_user_id("writer1").is_ok());
        assert!(SnapshotStorage::validate_user_id("").is_err());
        assert!(SnapshotStorage::validate_user_id("../evil").is_err());
        assert!(SnapshotStorage::validate_user_id("foo/bar").is_err());
        assert!(SnapshotStorage::validate_user_id(".hidden").is_err());
    }

    #[test]
    fn test_load_nonexistent_returns_none() {
        let (storage, _temp) = setup();
        assert!(storage.load_book("u1", Uuid::new_v4()).unwrap().is_none());
        assert!(storage.load_notes("u1").unwrap().is_none());
        assert!(storage.list_books("u1").unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load_book() {
        let (storage, _temp) = setup();
        let req = request("Harbor");

        let at = storage.save_book("u1", req.clone()).unwrap();
        let stored = storage.load_book("u1", req.uuid).unwrap().unwrap();
        assert_eq!(stored.updated_at, at);
        assert_eq!(stored.data().book_data, req.book_data);
        assert_eq!(stored.listing().genre.as_deref(), Some("mystery"));
    }

    #[test]
    fn test_resave_advances_timestamp() {
        let (storage, _temp) = setup();
        let req = request("Harbor");

        let first = storage.save_book("u1", req.clone()).unwrap();
        let second = storage.save_book("u1", req).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_users_are_isolated() {
        let (storage, _temp) = setup();
        storage.save_book("u1", request("Mine")).unwrap();
        storage.save_notes("u1", "{}".into()).unwrap();

        assert!(storage.list_books("u2").unwrap().is_empty());
        assert!(storage.load_notes("u2").unwrap().is_none());
        assert_eq!(storage.list_books("u1").unwrap().len(), 1);
    }
}
