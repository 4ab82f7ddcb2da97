//! Global scene ordering.
//!
//! Every scene of a book has a position in one sequence `1..=N`: scenes of
//! the first chapter, then the second chapter, and so on, with chapterless
//! scenes last. Relative order inside a group is preserved.

use std::collections::HashMap;

use crate::db::{BookStore, StoreError};
use crate::models::{Chapter, Scene};

/// A scene being placed into a (possibly different) chapter. It is
/// appended to the end of its destination group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovedScene {
    pub id: i64,
    pub new_chapter_id: Option<i64>,
}

/// A row whose order or chapter must change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneUpdate {
    pub id: i64,
    pub order: i64,
    pub chapter_id: Option<i64>,
}

/// Computes the updates that normalize `scenes`.
///
/// `scenes` must be in current order (ties by id). Scenes whose chapter is
/// unknown sort after every known chapter.
pub fn plan(scenes: &[Scene], chapters: &[Chapter], moved: Option<MovedScene>) -> Vec<SceneUpdate> {
    let mut working: Vec<(i64, Option<i64>)> = scenes.iter().map(|s| (s.id, s.chapter_id)).collect();

    if let Some(moved) = moved {
        if let Some(pos) = working.iter().position(|(id, _)| *id == moved.id) {
            working.remove(pos);
            working.push((moved.id, moved.new_chapter_id));
        }
    }

    let chapter_rank: HashMap<i64, i64> = chapters.iter().map(|c| (c.id, c.order)).collect();

    // Stable sort keeps the original relative order inside each group
    // and puts the moved scene last in its own.
    working.sort_by_key(|(_, chapter_id)| match chapter_id {
        Some(cid) => (0, chapter_rank.get(cid).copied().unwrap_or(i64::MAX), *cid),
        None => (1, 0, 0),
    });

    let current: HashMap<i64, (i64, Option<i64>)> =
        scenes.iter().map(|s| (s.id, (s.order, s.chapter_id))).collect();

    working
        .into_iter()
        .zip(1..)
        .filter_map(|((id, chapter_id), order)| {
            let unchanged = current.get(&id) == Some(&(order, chapter_id));
            (!unchanged).then_some(SceneUpdate {
                id,
                order,
                chapter_id,
            })
        })
        .collect()
}

/// Applies [`plan`] against a book store.
pub struct OrderingEngine<'a> {
    store: &'a BookStore,
}

impl<'a> OrderingEngine<'a> {
    pub fn new(store: &'a BookStore) -> Self {
        Self { store }
    }

    /// Rewrites scene orders so they are exactly `1..=N`. Returns the
    /// number of rows written.
    pub async fn recalculate(&self, moved: Option<MovedScene>) -> Result<usize, StoreError> {
        let scenes = self.store.list_scenes().await?;
        let chapters = self.store.list_chapters().await?;

        let updates = plan(&scenes, &chapters, moved);
        self.store.apply_scene_updates(&updates).await?;

        if !updates.is_empty() {
            tracing::debug!("Reordered {} of {} scenes", updates.len(), scenes.len());
        }
        Ok(updates.len())
    }

    /// Renumbers chapters to `1..=M`, keeping their relative order.
    pub async fn normalize_chapters(&self) -> Result<(), StoreError> {
        let chapters = self.store.list_chapters().await?;
        let updates: Vec<(i64, i64)> = chapters
            .iter()
            .zip(1..)
            .filter(|(c, order)| c.order != *order)
            .map(|(c, order)| (c.id, order))
            .collect();
        self.store.apply_chapter_orders(&updates).await
    }
}
