//! Remote snapshot service.
//!
//! [`RemoteApi`] is the seam between the coordinator and the network;
//! [`HttpRemote`] talks to a server over HTTP with a bearer token.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use uuid::Uuid;

/// Errors returned by a remote service.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// Request could not be sent or the response could not be read
    Http(String),
    /// Server answered with a non-success status
    Status { status: u16, message: String },
    /// Server answered `success: false`
    Rejected(String),
    /// Server answered without the expected payload
    MissingData,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Http(e) => write!(f, "HTTP error: {}", e),
            RemoteError::Status { status, message } => {
                write!(f, "Server returned status {}: {}", status, message)
            }
            RemoteError::Rejected(message) => write!(f, "Server rejected request: {}", message),
            RemoteError::MissingData => write!(f, "Server response carried no data"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Envelope wrapping every response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBookRequest {
    pub uuid: Uuid,
    pub book_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Serialized book snapshot without local sync fields.
    pub book_data: String,
}

/// Acknowledgement of a save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAck {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookData {
    pub uuid: Uuid,
    #[serde(default)]
    pub book_title: String,
    pub book_data: String,
    pub updated_at: DateTime<Utc>,
}

/// One entry of the server's book listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookListing {
    pub uuid: Uuid,
    #[serde(default)]
    pub book_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesData {
    pub notes_data: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveNotesRequest {
    pub notes_data: String,
}

/// Operations the coordinator needs from a snapshot server.
pub trait RemoteApi: Send + Sync {
    fn save_book_data(
        &self,
        token: &str,
        request: &SaveBookRequest,
    ) -> impl Future<Output = Result<SaveAck, RemoteError>> + Send;

    fn get_book_data(
        &self,
        token: &str,
        uuid: Uuid,
    ) -> impl Future<Output = Result<BookData, RemoteError>> + Send;

    fn get_books_list(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Vec<BookListing>, RemoteError>> + Send;

    fn save_notes_data(
        &self,
        token: &str,
        notes_data: &str,
    ) -> impl Future<Output = Result<SaveAck, RemoteError>> + Send;

    fn get_notes_data(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<NotesData, RemoteError>> + Send;
}

/// [`RemoteApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request and unwraps the response envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        token: &str,
    ) -> Result<Option<T>, RemoteError> {
        let response = request
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiResponse<serde_json::Value>>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| status.to_string());
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        if !body.success {
            return Err(RemoteError::Rejected(
                body.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(body.data)
    }
}

impl RemoteApi for HttpRemote {
    async fn save_book_data(
        &self,
        token: &str,
        request: &SaveBookRequest,
    ) -> Result<SaveAck, RemoteError> {
        let builder = self.client.post(self.url("/books")).json(request);
        Ok(self.send(builder, token).await?.unwrap_or_default())
    }

    async fn get_book_data(&self, token: &str, uuid: Uuid) -> Result<BookData, RemoteError> {
        let builder = self.client.get(self.url(&format!("/books/{}", uuid)));
        self.send(builder, token).await?.ok_or(RemoteError::MissingData)
    }

    async fn get_books_list(&self, token: &str) -> Result<Vec<BookListing>, RemoteError> {
        let builder = self.client.get(self.url("/books"));
        Ok(self.send(builder, token).await?.unwrap_or_default())
    }

    async fn save_notes_data(&self, token: &str, notes_data: &str) -> Result<SaveAck, RemoteError> {
        let builder = self
            .client
            .post(self.url("/user/notes-data"))
            .json(&SaveNotesRequest {
                notes_data: notes_data.to_string(),
            });
        Ok(self.send(builder, token).await?.unwrap_or_default())
    }

    async fn get_notes_data(&self, token: &str) -> Result<NotesData, RemoteError> {
        let builder = self.client.get(self.url("/user/notes-data"));
        self.send(builder, token).await?.ok_or(RemoteError::MissingData)
    }
}
