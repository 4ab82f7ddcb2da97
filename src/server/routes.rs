//! HTTP routes of the snapshot server.
//!
//! - `GET /health`: health check (no auth)
//! - `POST /books`, `GET /books`, `GET /books/{uuid}`: book snapshots
//! - `POST /user/notes-data`, `GET /user/notes-data`: the notes collection

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::auth::{auth_middleware, ApiKeyStore, AuthUser};
use super::storage::{ServerStorageError, SnapshotStorage};
use crate::sync::remote::{
    ApiResponse, BookData, BookListing, NotesData, SaveAck, SaveBookRequest, SaveNotesRequest,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub storage: SnapshotStorage,
}

/// Error responses, rendered in the standard envelope.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Storage(ServerStorageError),
}

impl From<ServerStorageError> for ApiError {
    fn from(e: ServerStorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::Storage(ServerStorageError::InvalidUserId(id)) => {
                (StatusCode::BAD_REQUEST, format!("Invalid user ID: {}", id))
            }
            ApiError::Storage(e) => {
                tracing::error!("Storage failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage failure".to_string())
            }
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn save_book(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SaveBookRequest>,
) -> ApiResult<SaveAck> {
    let uuid = request.uuid;
    let updated_at = state.storage.save_book(&user.user_id, request)?;
    tracing::info!("{} saved book {}", user.user_id, uuid);
    Ok(Json(ApiResponse::ok(SaveAck {
        updated_at: Some(updated_at),
    })))
}

async fn list_books(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<BookListing>> {
    let books = state.storage.list_books(&user.user_id)?;
    Ok(Json(ApiResponse::ok(
        books.iter().map(|b| b.listing()).collect(),
    )))
}

async fn get_book(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(uuid): Path<Uuid>,
) -> ApiResult<BookData> {
    let book = state
        .storage
        .load_book(&user.user_id, uuid)?
        .ok_or_else(|| ApiError::NotFound(format!("Book {}", uuid)))?;
    Ok(Json(ApiResponse::ok(book.data())))
}

async fn save_notes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SaveNotesRequest>,
) -> ApiResult<SaveAck> {
    let updated_at = state.storage.save_notes(&user.user_id, request.notes_data)?;
    tracing::info!("{} saved notes", user.user_id);
    Ok(Json(ApiResponse::ok(SaveAck {
        updated_at: Some(updated_at),
    })))
}

async fn get_notes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<NotesData> {
    let notes = state
        .storage
        .load_notes(&user.user_id)?
        .ok_or_else(|| ApiError::NotFound("Notes".to_string()))?;
    Ok(Json(ApiResponse::ok(notes)))
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/books", get(list_books).post(save_book))
        .route("/books/{uuid}", get(get_book))
        .route("/user/notes-data", get(get_notes).post(save_notes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Library;
    use crate::models::{Book, SyncMeta, SyncState};
    use crate::server::auth::ApiKeyEntry;
    use crate::sync::{HttpRemote, RemoteApi, RemoteError, SyncCoordinator};
    use std::net::SocketAddr;
    use tempfile::TempDir;

    /// Starts a server on an ephemeral port with keys `alice-key` and `bob-key`.
    async fn spawn_server() -> (SocketAddr, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let state = AppState {
            api_keys: Arc::new(ApiKeyStore::from_entries([
                ApiKeyEntry {
                    key: "alice-key".into(),
                    user_id: "alice".into(),
                },
                ApiKeyEntry {
                    key: "bob-key".into(),
                    user_id: "bob".into(),
                },
            ])),
            storage: SnapshotStorage::new(temp_dir.path()),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        (addr, temp_dir)
    }

    fn request(uuid: Uuid) -> SaveBookRequest {
        SaveBookRequest {
            uuid,
            book_title: "Wire".into(),
            kind: None,
            form: None,
            genre: None,
            cover: None,
            description: None,
            book_data: "{}".into(),
        }
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (addr, _dir) = spawn_server().await;
        let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_rejects_unknown_key() {
        let (addr, _dir) = spawn_server().await;
        let remote = HttpRemote::new(format!("http://{}", addr));

        let result = remote.get_books_list("wrong").await;
        assert_eq!(
            result,
            Err(RemoteError::Status {
                status: 401,
                message: "Invalid API key".into()
            })
        );
    }

    #[tokio::test]
    async fn test_save_list_get_book() {
        let (addr, _dir) = spawn_server().await;
        let remote = HttpRemote::new(format!("http://{}", addr));
        let uuid = Uuid::new_v4();

        let ack = remote.save_book_data("alice-key", &request(uuid)).await.unwrap();
        let updated_at = ack.updated_at.unwrap();

        let listing = remote.get_books_list("alice-key").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].uuid, uuid);
        assert_eq!(listing[0].updated_at, updated_at);

        let data = remote.get_book_data("alice-key", uuid).await.unwrap();
        assert_eq!(data.book_data, "{}");

        // Other users see nothing
        assert!(remote.get_books_list("bob-key").await.unwrap().is_empty());
        assert!(matches!(
            remote.get_book_data("bob-key", uuid).await,
            Err(RemoteError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_notes_round_trip() {
        let (addr, _dir) = spawn_server().await;
        let remote = HttpRemote::new(format!("http://{}", addr));

        assert!(remote.get_notes_data("alice-key").await.is_err());

        let ack = remote.save_notes_data("alice-key", r#"{"notes":[]}"#).await.unwrap();
        let notes = remote.get_notes_data("alice-key").await.unwrap();
        assert_eq!(notes.notes_data, r#"{"notes":[]}"#);
        assert_eq!(notes.updated_at, ack.updated_at);
    }

    #[tokio::test]
    async fn test_two_devices_push_and_pull_over_http() {
        let (addr, _dir) = spawn_server().await;
        let url = format!("http://{}", addr);

        let laptop_dir = TempDir::new().unwrap();
        let laptop = SyncCoordinator::new(
            Arc::new(Library::open(laptop_dir.path()).await.unwrap()),
            HttpRemote::new(url.clone()),
            Some("alice-key".into()),
        );
        let book = laptop
            .library()
            .create_book(Book::new("Shared"))
            .await
            .unwrap();
        let session = laptop.library().session(book.uuid).await.unwrap();
        let chapter = session.create_chapter("One").await.unwrap();
        session.create_scene("First", Some(chapter.id)).await.unwrap();

        let pushed = laptop.push_book(book.uuid).await.unwrap();
        assert_eq!(pushed.sync_state, SyncState::Synced);

        let desk_dir = TempDir::new().unwrap();
        let desk = SyncCoordinator::new(
            Arc::new(Library::open(desk_dir.path()).await.unwrap()),
            HttpRemote::new(url),
            Some("alice-key".into()),
        );
        let listing = desk.list_remote_books().await.unwrap();
        assert_eq!(listing.len(), 1);

        let pulled = desk.pull_book(book.uuid).await.unwrap();
        assert_eq!(
            pulled.sync,
            SyncMeta::synced_at(pushed.server_updated_at.unwrap())
        );
        let desk_session = desk.library().session(book.uuid).await.unwrap();
        let scenes = desk_session.list_scenes().await.unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].chapter_id, Some(desk_session.list_chapters().await.unwrap()[0].id));

        // Laptop edits and pushes again; the desk sees newer server changes
        session.create_scene("Second", None).await.unwrap();
        laptop.push_book(book.uuid).await.unwrap();
        let report = desk.reconcile().await.unwrap();
        assert_eq!(report.changed, vec![(book.uuid, SyncState::ServerChanges)]);
    }
}
