//! Uniform result envelope over book session operations, for callers that
//! want a serializable outcome instead of a `Result`.

use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;

use crate::library::{BookSession, SceneChanges};
use crate::models::{Chapter, Scene};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ServiceResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

impl<T, E: Display> From<Result<T, E>> for ServiceResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => ServiceResult::ok(data),
            Err(e) => ServiceResult::failure(e.to_string()),
        }
    }
}

/// Turns a "was anything found" flag into a result.
fn found(result: Result<bool, impl Display>, what: &str, id: i64) -> ServiceResult<()> {
    match result {
        Ok(true) => ServiceResult::ok(()),
        Ok(false) => ServiceResult::failure(format!("{} {} not found", what, id)),
        Err(e) => ServiceResult::failure(e.to_string()),
    }
}

/// Scene and chapter operations of one book.
pub struct SceneService {
    session: Arc<BookSession>,
}

impl SceneService {
    pub fn new(session: Arc<BookSession>) -> Self {
        Self { session }
    }

    pub async fn create_scene(&self, title: &str, chapter_id: Option<i64>) -> ServiceResult<Scene> {
        self.session.create_scene(title, chapter_id).await.into()
    }

    pub async fn update_scene(&self, id: i64, changes: SceneChanges) -> ServiceResult<Scene> {
        match self.session.update_scene(id, changes).await {
            Ok(Some(scene)) => ServiceResult::ok(scene),
            Ok(None) => ServiceResult::failure(format!("Scene {} not found", id)),
            Err(e) => ServiceResult::failure(e.to_string()),
        }
    }

    pub async fn delete_scene(&self, id: i64) -> ServiceResult<()> {
        found(self.session.delete_scene(id).await, "Scene", id)
    }

    pub async fn update_scene_order(&self, id: i64, order: i64) -> ServiceResult<()> {
        found(self.session.set_scene_order(id, order).await, "Scene", id)
    }

    /// Swaps two scenes. Equal orders are not an error.
    pub async fn reorder_scenes(&self, a: i64, b: i64) -> ServiceResult<bool> {
        self.session.swap_scenes(a, b).await.into()
    }

    pub async fn add_scene_to_chapter(&self, id: i64, chapter_id: i64) -> ServiceResult<()> {
        found(self.session.move_scene(id, Some(chapter_id)).await, "Scene", id)
    }

    pub async fn remove_scene_from_chapter(&self, id: i64) -> ServiceResult<()> {
        found(self.session.move_scene(id, None).await, "Scene", id)
    }

    pub async fn recalculate_global_order(&self) -> ServiceResult<usize> {
        self.session.recalculate_global_order().await.into()
    }

    pub async fn create_chapter(&self, title: &str) -> ServiceResult<Chapter> {
        self.session.create_chapter(title).await.into()
    }

    pub async fn update_chapter(&self, id: i64, title: &str) -> ServiceResult<()> {
        found(self.session.rename_chapter(id, title).await, "Chapter", id)
    }

    pub async fn update_chapter_order(&self, id: i64, order: i64) -> ServiceResult<()> {
        found(self.session.set_chapter_order(id, order).await, "Chapter", id)
    }

    pub async fn reorder_chapters(&self, active_id: i64, over_id: i64) -> ServiceResult<()> {
        found(
            self.session.reorder_chapters(active_id, over_id).await,
            "Chapter",
            active_id,
        )
    }

    pub async fn delete_chapter(&self, id: i64) -> ServiceResult<()> {
        found(self.session.delete_chapter(id).await, "Chapter", id)
    }
}
