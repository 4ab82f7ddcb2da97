//! Whole-book and whole-notes snapshots.
//!
//! A snapshot is the unit of transfer between client and server and the
//! format of local backups. Import is destructive: the book store is
//! rewritten in a single transaction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{AuxCollection, StoreContents, StoreError};
use crate::library::Library;
use crate::models::{Book, Chapter, Note, NoteGroup, Scene, SceneBody, SyncMeta};
use crate::ordering::OrderingEngine;

/// Book fields that never leave the device.
const LOCAL_SYNC_FIELDS: [&str; 3] = ["localUpdatedAt", "serverUpdatedAt", "syncState"];

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot has no book uuid")]
    MissingIdentity,

    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Full content of one book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub book: Book,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub scene_bodies: Vec<SceneBody>,
    #[serde(default)]
    pub block_instances: Vec<Value>,
    #[serde(default)]
    pub block_parameter_instances: Vec<Value>,
    #[serde(default)]
    pub block_instance_relations: Vec<Value>,
    #[serde(default)]
    pub book_configurations: Vec<Value>,
    #[serde(default)]
    pub blocks: Vec<Value>,
    #[serde(default)]
    pub block_parameter_groups: Vec<Value>,
    #[serde(default)]
    pub block_parameters: Vec<Value>,
    #[serde(default)]
    pub block_parameter_possible_values: Vec<Value>,
    #[serde(default)]
    pub blocks_relations: Vec<Value>,
    #[serde(default)]
    pub block_tabs: Vec<Value>,
    #[serde(default)]
    pub block_instance_scene_links: Vec<Value>,
    #[serde(default)]
    pub block_instance_groups: Vec<Value>,
    #[serde(default)]
    pub knowledge_base_pages: Vec<Value>,
}

impl BookSnapshot {
    /// An empty snapshot of `book`.
    pub fn new(book: Book) -> Self {
        Self {
            book,
            chapters: Vec::new(),
            scenes: Vec::new(),
            scene_bodies: Vec::new(),
            block_instances: Vec::new(),
            block_parameter_instances: Vec::new(),
            block_instance_relations: Vec::new(),
            book_configurations: Vec::new(),
            blocks: Vec::new(),
            block_parameter_groups: Vec::new(),
            block_parameters: Vec::new(),
            block_parameter_possible_values: Vec::new(),
            blocks_relations: Vec::new(),
            block_tabs: Vec::new(),
            block_instance_scene_links: Vec::new(),
            block_instance_groups: Vec::new(),
            knowledge_base_pages: Vec::new(),
        }
    }

    pub fn collection(&self, collection: AuxCollection) -> &Vec<Value> {
        match collection {
            AuxCollection::BlockInstances => &self.block_instances,
            AuxCollection::BlockParameterInstances => &self.block_parameter_instances,
            AuxCollection::BlockInstanceRelations => &self.block_instance_relations,
            AuxCollection::BookConfigurations => &self.book_configurations,
            AuxCollection::Blocks => &self.blocks,
            AuxCollection::BlockParameterGroups => &self.block_parameter_groups,
            AuxCollection::BlockParameters => &self.block_parameters,
            AuxCollection::BlockParameterPossibleValues => &self.block_parameter_possible_values,
            AuxCollection::BlocksRelations => &self.blocks_relations,
            AuxCollection::BlockTabs => &self.block_tabs,
            AuxCollection::BlockInstanceSceneLinks => &self.block_instance_scene_links,
            AuxCollection::BlockInstanceGroups => &self.block_instance_groups,
            AuxCollection::KnowledgeBasePages => &self.knowledge_base_pages,
        }
    }

    pub fn collection_mut(&mut self, collection: AuxCollection) -> &mut Vec<Value> {
        match collection {
            AuxCollection::BlockInstances => &mut self.block_instances,
            AuxCollection::BlockParameterInstances => &mut self.block_parameter_instances,
            AuxCollection::BlockInstanceRelations => &mut self.block_instance_relations,
            AuxCollection::BookConfigurations => &mut self.book_configurations,
            AuxCollection::Blocks => &mut self.blocks,
            AuxCollection::BlockParameterGroups => &mut self.block_parameter_groups,
            AuxCollection::BlockParameters => &mut self.block_parameters,
            AuxCollection::BlockParameterPossibleValues => {
                &mut self.block_parameter_possible_values
            }
            AuxCollection::BlocksRelations => &mut self.blocks_relations,
            AuxCollection::BlockTabs => &mut self.block_tabs,
            AuxCollection::BlockInstanceSceneLinks => &mut self.block_instance_scene_links,
            AuxCollection::BlockInstanceGroups => &mut self.block_instance_groups,
            AuxCollection::KnowledgeBasePages => &mut self.knowledge_base_pages,
        }
    }

    /// Parses a snapshot, rejecting documents without a book uuid before
    /// anything else is looked at.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_str(json)?;

        let uuid = value
            .get("book")
            .and_then(|book| book.get("uuid"))
            .and_then(Value::as_str)
            .ok_or(SnapshotError::MissingIdentity)?;
        Uuid::parse_str(uuid).map_err(|_| SnapshotError::MissingIdentity)?;

        Ok(serde_json::from_value(value)?)
    }

    /// Serializes for upload, without the book's local sync fields.
    pub fn to_transport_json(&self) -> Result<String, SnapshotError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(book) = value.get_mut("book").and_then(Value::as_object_mut) {
            for field in LOCAL_SYNC_FIELDS {
                book.remove(field);
            }
        }
        Ok(serde_json::to_string(&value)?)
    }

    /// Gathers every record of a book.
    pub async fn export(library: &Library, uuid: Uuid) -> Result<Self, SnapshotError> {
        let book = library.get_book(uuid).await?;
        let session = library.session(uuid).await?;
        let _writer = session.exclusive().await;
        let store = session.store();

        let mut snapshot = BookSnapshot::new(book);
        snapshot.chapters = store.list_chapters().await?;
        snapshot.scenes = store.list_scenes().await?;
        snapshot.scene_bodies = store.list_bodies().await?;
        for collection in AuxCollection::ALL {
            *snapshot.collection_mut(collection) = store.list_aux(collection).await?;
        }

        tracing::debug!(
            "Exported book {} ({} chapters, {} scenes)",
            uuid,
            snapshot.chapters.len(),
            snapshot.scenes.len()
        );
        Ok(snapshot)
    }

    /// Replaces the local copy of the book with this snapshot.
    ///
    /// Chapters receive fresh keys and scene references are rewritten to
    /// match. The book's sync fields are taken from the snapshot, and only
    /// once the new contents are committed. A failed import leaves the
    /// index and the tracker as they were.
    pub async fn import(&self, library: &Library) -> Result<Book, SnapshotError> {
        let uuid = self.book.uuid;

        // A book must be indexed before its store can be opened
        let known = library.repository().get_book(uuid).await?.is_some();
        if !known {
            library.repository().upsert_book(&self.book).await?;
        }

        let (chapters, scenes) = match self.replace_store(library).await {
            Ok(counts) => counts,
            Err(e) => {
                if !known {
                    library.delete_book(uuid).await?;
                }
                tracing::warn!("Import of book {} failed: {}", uuid, e);
                return Err(e);
            }
        };

        library.repository().upsert_book(&self.book).await?;
        library.tracker(uuid).await?.overwrite(self.book.sync.clone()).await?;

        tracing::info!(
            "Imported book {} ({} chapters, {} scenes)",
            uuid,
            chapters,
            scenes
        );
        Ok(library.get_book(uuid).await?)
    }

    /// Rewrites the book store and renumbers scenes, so scenes that lost
    /// their chapter end up last.
    async fn replace_store(&self, library: &Library) -> Result<(usize, usize), SnapshotError> {
        let session = library.session(self.book.uuid).await?;
        let _writer = session.exclusive().await;

        let (chapters, scenes) = remap_chapters(&self.chapters, &self.scenes);
        let aux: Vec<(AuxCollection, Vec<Value>)> = AuxCollection::ALL
            .iter()
            .map(|c| (*c, self.collection(*c).clone()))
            .collect();

        session
            .store()
            .replace_contents(&StoreContents {
                book: &self.book,
                chapters: &chapters,
                scenes: &scenes,
                bodies: &self.scene_bodies,
                aux: &aux,
            })
            .await?;
        OrderingEngine::new(session.store()).recalculate(None).await?;

        Ok((chapters.len(), scenes.len()))
    }
}

/// Assigns chapters fresh keys `1..=M` and rewrites scene references.
///
/// Chapters that carry a uuid are matched by their recorded id. Older
/// documents without chapter uuids referenced chapters by order, so those
/// are matched by order. Unresolvable references become chapterless.
fn remap_chapters(chapters: &[Chapter], scenes: &[Scene]) -> (Vec<Chapter>, Vec<Scene>) {
    let mut by_id: HashMap<i64, i64> = HashMap::new();
    let mut by_order: HashMap<i64, i64> = HashMap::new();

    let fresh: Vec<Chapter> = chapters
        .iter()
        .zip(1..)
        .map(|(chapter, new_id)| {
            match chapter.uuid {
                Some(_) => {
                    by_id.entry(chapter.id).or_insert(new_id);
                }
                None => {
                    if by_order.contains_key(&chapter.order) {
                        tracing::warn!(
                            "Duplicate chapter order {} in snapshot; '{}' cannot be referenced",
                            chapter.order,
                            chapter.title
                        );
                    } else {
                        by_order.insert(chapter.order, new_id);
                    }
                }
            }
            Chapter {
                id: new_id,
                uuid: Some(chapter.uuid.unwrap_or_else(Uuid::new_v4)),
                ..chapter.clone()
            }
        })
        .collect();

    let remapped = scenes
        .iter()
        .map(|scene| {
            let chapter_id = scene.chapter_id.and_then(|old| {
                let resolved = by_id.get(&old).or_else(|| by_order.get(&old)).copied();
                if resolved.is_none() {
                    tracing::warn!(
                        "Scene {} references unknown chapter {}; importing as chapterless",
                        scene.id,
                        old
                    );
                }
                resolved
            });
            Scene {
                chapter_id,
                ..scene.clone()
            }
        })
        .collect();

    (fresh, remapped)
}

/// The free-standing notes collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotesSnapshot {
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub groups: Vec<NoteGroup>,
    #[serde(default)]
    pub meta: SyncMeta,
}

impl NotesSnapshot {
    pub async fn export(library: &Library) -> Result<Self, SnapshotError> {
        Ok(Self {
            notes: library.list_notes().await?,
            groups: library.list_note_groups().await?,
            meta: library.notes_tracker().await?.current().await,
        })
    }

    /// Replaces the notes collection. The record ends up synced as of the
    /// snapshot's server timestamp.
    pub async fn import(&self, library: &Library) -> Result<SyncMeta, SnapshotError> {
        let mut meta = self.meta.clone();
        meta.mark_synced(self.meta.server_updated_at);

        library
            .repository()
            .replace_notes(&self.notes, &self.groups, &meta)
            .await?;
        library.notes_tracker().await?.overwrite(meta.clone()).await?;

        tracing::info!("Imported {} notes", self.notes.len());
        Ok(meta)
    }
}
