use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{upsert_book_row, BookRow, StoreError};
use crate::models::{symbol_counts, Book, Chapter, Scene, SceneBody};
use crate::ordering::SceneUpdate;

/// Schema and instance collections a book carries opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuxCollection {
    BlockInstances,
    BlockParameterInstances,
    BlockInstanceRelations,
    BookConfigurations,
    Blocks,
    BlockParameterGroups,
    BlockParameters,
    BlockParameterPossibleValues,
    BlocksRelations,
    BlockTabs,
    BlockInstanceSceneLinks,
    BlockInstanceGroups,
    KnowledgeBasePages,
}

impl AuxCollection {
    pub const ALL: [AuxCollection; 13] = [
        AuxCollection::BlockInstances,
        AuxCollection::BlockParameterInstances,
        AuxCollection::BlockInstanceRelations,
        AuxCollection::BookConfigurations,
        AuxCollection::Blocks,
        AuxCollection::BlockParameterGroups,
        AuxCollection::BlockParameters,
        AuxCollection::BlockParameterPossibleValues,
        AuxCollection::BlocksRelations,
        AuxCollection::BlockTabs,
        AuxCollection::BlockInstanceSceneLinks,
        AuxCollection::BlockInstanceGroups,
        AuxCollection::KnowledgeBasePages,
    ];

    /// Key used both in the `aux_records` table and in snapshot documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuxCollection::BlockInstances => "blockInstances",
            AuxCollection::BlockParameterInstances => "blockParameterInstances",
            AuxCollection::BlockInstanceRelations => "blockInstanceRelations",
            AuxCollection::BookConfigurations => "bookConfigurations",
            AuxCollection::Blocks => "blocks",
            AuxCollection::BlockParameterGroups => "blockParameterGroups",
            AuxCollection::BlockParameters => "blockParameters",
            AuxCollection::BlockParameterPossibleValues => "blockParameterPossibleValues",
            AuxCollection::BlocksRelations => "blocksRelations",
            AuxCollection::BlockTabs => "blockTabs",
            AuxCollection::BlockInstanceSceneLinks => "blockInstanceSceneLinks",
            AuxCollection::BlockInstanceGroups => "blockInstanceGroups",
            AuxCollection::KnowledgeBasePages => "knowledgeBasePages",
        }
    }
}

impl fmt::Display for AuxCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuxCollection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuxCollection::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown collection '{}'", s))
    }
}

/// Everything a book store holds, in the shape a full replacement needs.
///
/// Chapter and scene ids are written as given.
pub struct StoreContents<'a> {
    pub book: &'a Book,
    pub chapters: &'a [Chapter],
    pub scenes: &'a [Scene],
    pub bodies: &'a [SceneBody],
    pub aux: &'a [(AuxCollection, Vec<Value>)],
}

/// One book's content database.
#[derive(Debug, Clone)]
pub struct BookStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ChapterRow {
    id: i64,
    uuid: String,
    title: String,
    sort_order: i64,
    content_scene_id: Option<i64>,
}

impl ChapterRow {
    fn into_chapter(self) -> Chapter {
        let uuid = match Uuid::parse_str(&self.uuid) {
            Ok(u) => Some(u),
            Err(e) => {
                tracing::warn!("Chapter {} has invalid uuid '{}': {}", self.id, self.uuid, e);
                None
            }
        };
        Chapter {
            id: self.id,
            uuid,
            title: self.title,
            order: self.sort_order,
            content_scene_id: self.content_scene_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SceneRow {
    id: i64,
    chapter_id: Option<i64>,
    title: String,
    sort_order: i64,
    symbols_with_spaces: Option<i64>,
    symbols_without_spaces: Option<i64>,
}

impl From<SceneRow> for Scene {
    fn from(row: SceneRow) -> Self {
        Scene {
            id: row.id,
            chapter_id: row.chapter_id,
            order: row.sort_order,
            title: row.title,
            total_symbol_count_with_spaces: row.symbols_with_spaces,
            total_symbol_count_wo_spaces: row.symbols_without_spaces,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BodyRow {
    id: i64,
    scene_id: i64,
    body: String,
}

impl From<BodyRow> for SceneBody {
    fn from(row: BodyRow) -> Self {
        SceneBody {
            id: Some(row.id),
            scene_id: row.scene_id,
            body: row.body,
        }
    }
}

/// Removes a scene, its body and the schema links that point at it.
async fn remove_scene(conn: &mut SqliteConnection, id: i64) -> Result<bool, StoreError> {
    sqlx::query("DELETE FROM scene_bodies WHERE scene_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "DELETE FROM aux_records WHERE collection = ? AND json_extract(payload, '$.sceneId') = ?",
    )
    .bind(AuxCollection::BlockInstanceSceneLinks.as_str())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query("DELETE FROM scenes WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

impl BookStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get_book(&self) -> Result<Option<Book>, StoreError> {
        let row: Option<BookRow> = sqlx::query_as("SELECT * FROM book LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(BookRow::into_book).transpose()
    }

    pub async fn put_book(&self, book: &Book) -> Result<(), StoreError> {
        upsert_book_row(&self.pool, "book", book).await
    }

    // ------------------------------------------------------------------
    // Chapters
    // ------------------------------------------------------------------

    pub async fn list_chapters(&self) -> Result<Vec<Chapter>, StoreError> {
        let rows: Vec<ChapterRow> = sqlx::query_as("SELECT * FROM chapters ORDER BY sort_order, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ChapterRow::into_chapter).collect())
    }

    pub async fn get_chapter(&self, id: i64) -> Result<Option<Chapter>, StoreError> {
        let row: Option<ChapterRow> = sqlx::query_as("SELECT * FROM chapters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ChapterRow::into_chapter))
    }

    pub async fn max_chapter_order(&self) -> Result<i64, StoreError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(sort_order) FROM chapters")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    pub async fn insert_chapter(&self, title: &str, order: i64) -> Result<Chapter, StoreError> {
        let uuid = Uuid::new_v4();
        let result = sqlx::query("INSERT INTO chapters (uuid, title, sort_order) VALUES (?, ?, ?)")
            .bind(uuid.to_string())
            .bind(title)
            .bind(order)
            .execute(&self.pool)
            .await?;

        Ok(Chapter {
            id: result.last_insert_rowid(),
            uuid: Some(uuid),
            title: title.to_string(),
            order,
            content_scene_id: None,
        })
    }

    pub async fn rename_chapter(&self, id: i64, title: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE chapters SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_chapter_content_scene(
        &self,
        id: i64,
        scene_id: Option<i64>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE chapters SET content_scene_id = ? WHERE id = ?")
            .bind(scene_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Writes `(chapter id, order)` pairs in one transaction.
    pub async fn apply_chapter_orders(&self, orders: &[(i64, i64)]) -> Result<(), StoreError> {
        if orders.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (id, order) in orders {
            sqlx::query("UPDATE chapters SET sort_order = ? WHERE id = ?")
                .bind(order)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes a chapter together with its content scene. Other member
    /// scenes become chapterless. Returns the removed chapter, if any.
    pub async fn delete_chapter_detaching(&self, id: i64) -> Result<Option<Chapter>, StoreError> {
        let Some(chapter) = self.get_chapter(id).await? else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;

        if let Some(content_scene) = chapter.content_scene_id {
            remove_scene(&mut tx, content_scene).await?;
        }

        sqlx::query("UPDATE scenes SET chapter_id = NULL WHERE chapter_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM chapters WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(chapter))
    }

    // ------------------------------------------------------------------
    // Scenes
    // ------------------------------------------------------------------

    /// All scenes in current global order, ties broken by id.
    pub async fn list_scenes(&self) -> Result<Vec<Scene>, StoreError> {
        let rows: Vec<SceneRow> = sqlx::query_as("SELECT * FROM scenes ORDER BY sort_order, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Scene::from).collect())
    }

    pub async fn get_scene(&self, id: i64) -> Result<Option<Scene>, StoreError> {
        let row: Option<SceneRow> = sqlx::query_as("SELECT * FROM scenes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Scene::from))
    }

    /// Inserts a scene with an empty body.
    pub async fn insert_scene(
        &self,
        title: &str,
        chapter_id: Option<i64>,
        order: i64,
    ) -> Result<Scene, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO scenes (chapter_id, title, sort_order, symbols_with_spaces, symbols_without_spaces)
            VALUES (?, ?, ?, 0, 0)
            "#,
        )
        .bind(chapter_id)
        .bind(title)
        .bind(order)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        sqlx::query("INSERT INTO scene_bodies (scene_id, body) VALUES (?, '')")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Scene {
            id,
            chapter_id,
            order,
            title: title.to_string(),
            total_symbol_count_with_spaces: Some(0),
            total_symbol_count_wo_spaces: Some(0),
        })
    }

    /// Writes title, chapter and order of an existing scene.
    pub async fn update_scene(&self, scene: &Scene) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE scenes SET title = ?, chapter_id = ?, sort_order = ? WHERE id = ?")
                .bind(&scene.title)
                .bind(scene.chapter_id)
                .bind(scene.order)
                .bind(scene.id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_scene_order(&self, id: i64, order: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE scenes SET sort_order = ? WHERE id = ?")
            .bind(order)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_body(&self, scene_id: i64) -> Result<Option<SceneBody>, StoreError> {
        let row: Option<BodyRow> =
            sqlx::query_as("SELECT * FROM scene_bodies WHERE scene_id = ? ORDER BY id LIMIT 1")
                .bind(scene_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(SceneBody::from))
    }

    /// Replaces a scene's body and refreshes its symbol counts.
    pub async fn set_body(&self, scene_id: i64, body: &str) -> Result<(), StoreError> {
        let (with_spaces, without_spaces) = symbol_counts(body);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE scene_bodies SET body = ? WHERE scene_id = ?")
            .bind(body)
            .bind(scene_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            sqlx::query("INSERT INTO scene_bodies (scene_id, body) VALUES (?, ?)")
                .bind(scene_id)
                .bind(body)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "UPDATE scenes SET symbols_with_spaces = ?, symbols_without_spaces = ? WHERE id = ?",
        )
        .bind(with_spaces)
        .bind(without_spaces)
        .bind(scene_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Exchanges the orders of two scenes. Returns false without writing
    /// if either scene is missing or both already share an order.
    pub async fn swap_scene_orders(&self, a: i64, b: i64) -> Result<bool, StoreError> {
        let (Some(first), Some(second)) = (self.get_scene(a).await?, self.get_scene(b).await?)
        else {
            return Ok(false);
        };
        if first.order == second.order {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        for (id, order) in [(first.id, second.order), (second.id, first.order)] {
            sqlx::query("UPDATE scenes SET sort_order = ? WHERE id = ?")
                .bind(order)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Applies an ordering plan in one transaction.
    pub async fn apply_scene_updates(&self, updates: &[SceneUpdate]) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for update in updates {
            sqlx::query("UPDATE scenes SET sort_order = ?, chapter_id = ? WHERE id = ?")
                .bind(update.order)
                .bind(update.chapter_id)
                .bind(update.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_scene(&self, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = remove_scene(&mut tx, id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn list_bodies(&self) -> Result<Vec<SceneBody>, StoreError> {
        let rows: Vec<BodyRow> = sqlx::query_as("SELECT * FROM scene_bodies ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SceneBody::from).collect())
    }

    // ------------------------------------------------------------------
    // Schema collections
    // ------------------------------------------------------------------

    pub async fn list_aux(&self, collection: AuxCollection) -> Result<Vec<Value>, StoreError> {
        let payloads: Vec<String> =
            sqlx::query_scalar("SELECT payload FROM aux_records WHERE collection = ? ORDER BY id")
                .bind(collection.as_str())
                .fetch_all(&self.pool)
                .await?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(StoreError::from))
            .collect()
    }

    pub async fn insert_aux(&self, collection: AuxCollection, record: &Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO aux_records (collection, payload) VALUES (?, ?)")
            .bind(collection.as_str())
            .bind(serde_json::to_string(record)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Wholesale replacement
    // ------------------------------------------------------------------

    /// Replaces everything in the store in one transaction. On error the
    /// previous content is left intact.
    pub async fn replace_contents(&self, contents: &StoreContents<'_>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for table in ["book", "chapters", "scenes", "scene_bodies", "aux_records"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            "DELETE FROM sqlite_sequence WHERE name IN ('chapters', 'scenes', 'scene_bodies', 'aux_records')",
        )
        .execute(&mut *tx)
        .await?;

        upsert_book_row(&mut *tx, "book", contents.book).await?;

        for chapter in contents.chapters {
            let uuid = chapter.uuid.unwrap_or_else(Uuid::new_v4);
            sqlx::query(
                "INSERT INTO chapters (id, uuid, title, sort_order, content_scene_id) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(chapter.id)
            .bind(uuid.to_string())
            .bind(&chapter.title)
            .bind(chapter.order)
            .bind(chapter.content_scene_id)
            .execute(&mut *tx)
            .await?;
        }

        for scene in contents.scenes {
            sqlx::query(
                r#"
                INSERT INTO scenes (id, chapter_id, title, sort_order, symbols_with_spaces, symbols_without_spaces)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(scene.id)
            .bind(scene.chapter_id)
            .bind(&scene.title)
            .bind(scene.order)
            .bind(scene.total_symbol_count_with_spaces)
            .bind(scene.total_symbol_count_wo_spaces)
            .execute(&mut *tx)
            .await?;
        }

        for body in contents.bodies {
            sqlx::query("INSERT INTO scene_bodies (id, scene_id, body) VALUES (?, ?, ?)")
                .bind(body.id)
                .bind(body.scene_id)
                .bind(&body.body)
                .execute(&mut *tx)
                .await?;
        }

        for (collection, records) in contents.aux {
            for record in records {
                sqlx::query("INSERT INTO aux_records (collection, payload) VALUES (?, ?)")
                    .bind(collection.as_str())
                    .bind(serde_json::to_string(record)?)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_book_store;
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        store: BookStore,
        _temp_dir: TempDir,
    }

    async fn setup_store() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = open_book_store(&temp_dir.path().join("book.db"))
            .await
            .unwrap();
        TestContext {
            store: BookStore::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[test]
    fn test_aux_collection_names_round_trip() {
        for collection in AuxCollection::ALL {
            assert_eq!(collection.as_str().parse::<AuxCollection>().unwrap(), collection);
        }
        assert!("recipes".parse::<AuxCollection>().is_err());
    }

    #[tokio::test]
    async fn test_put_and_get_book() {
        let ctx = setup_store().await;
        assert!(ctx.store.get_book().await.unwrap().is_none());

        let book = Book::new("Harbor").with_chapter_only_mode(true);
        ctx.store.put_book(&book).await.unwrap();
        assert_eq!(ctx.store.get_book().await.unwrap(), Some(book));
    }

    #[tokio::test]
    async fn test_insert_scene_creates_empty_body() {
        let ctx = setup_store().await;
        let scene = ctx.store.insert_scene("Opening", None, 0).await.unwrap();

        let body = ctx.store.get_body(scene.id).await.unwrap().unwrap();
        assert_eq!(body.body, "");
        assert_eq!(ctx.store.list_scenes().await.unwrap(), vec![scene]);
    }

    #[tokio::test]
    async fn test_set_body_updates_counts() {
        let ctx = setup_store().await;
        let scene = ctx.store.insert_scene("Opening", None, 1).await.unwrap();

        ctx.store.set_body(scene.id, "It was dark").await.unwrap();

        let stored = ctx.store.get_scene(scene.id).await.unwrap().unwrap();
        assert_eq!(stored.total_symbol_count_with_spaces, Some(11));
        assert_eq!(stored.total_symbol_count_wo_spaces, Some(9));
        assert_eq!(ctx.store.list_bodies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_swap_scene_orders() {
        let ctx = setup_store().await;
        let a = ctx.store.insert_scene("A", None, 1).await.unwrap();
        let b = ctx.store.insert_scene("B", None, 2).await.unwrap();

        assert!(ctx.store.swap_scene_orders(a.id, b.id).await.unwrap());
        assert_eq!(ctx.store.get_scene(a.id).await.unwrap().unwrap().order, 2);
        assert_eq!(ctx.store.get_scene(b.id).await.unwrap().unwrap().order, 1);

        assert!(!ctx.store.swap_scene_orders(a.id, 999).await.unwrap());
    }

    #[tokio::test]
    async fn test_swap_with_equal_orders_is_noop() {
        let ctx = setup_store().await;
        let a = ctx.store.insert_scene("A", None, 3).await.unwrap();
        let b = ctx.store.insert_scene("B", None, 3).await.unwrap();
        assert!(!ctx.store.swap_scene_orders(a.id, b.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_scene_removes_body_and_links() {
        let ctx = setup_store().await;
        let keep = ctx.store.insert_scene("Keep", None, 1).await.unwrap();
        let doomed = ctx.store.insert_scene("Doomed", None, 2).await.unwrap();

        let links = AuxCollection::BlockInstanceSceneLinks;
        ctx.store
            .insert_aux(links, &json!({"id": 1, "sceneId": doomed.id, "blockInstanceUuid": "x"}))
            .await
            .unwrap();
        ctx.store
            .insert_aux(links, &json!({"id": 2, "sceneId": keep.id, "blockInstanceUuid": "y"}))
            .await
            .unwrap();

        assert!(ctx.store.delete_scene(doomed.id).await.unwrap());

        assert!(ctx.store.get_body(doomed.id).await.unwrap().is_none());
        let remaining = ctx.store.list_aux(links).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["sceneId"], json!(keep.id));

        assert!(!ctx.store.delete_scene(doomed.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_chapter_detaches_members_and_drops_content_scene() {
        let ctx = setup_store().await;
        let chapter = ctx.store.insert_chapter("One", 1).await.unwrap();
        let content = ctx.store.insert_scene("One", Some(chapter.id), 1).await.unwrap();
        let member = ctx.store.insert_scene("Member", Some(chapter.id), 2).await.unwrap();
        ctx.store
            .set_chapter_content_scene(chapter.id, Some(content.id))
            .await
            .unwrap();

        let removed = ctx.store.delete_chapter_detaching(chapter.id).await.unwrap();
        assert_eq!(removed.map(|c| c.id), Some(chapter.id));

        assert!(ctx.store.get_scene(content.id).await.unwrap().is_none());
        let member = ctx.store.get_scene(member.id).await.unwrap().unwrap();
        assert_eq!(member.chapter_id, None);
        assert!(ctx.store.list_chapters().await.unwrap().is_empty());

        assert!(ctx.store.delete_chapter_detaching(chapter.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_orders() {
        let ctx = setup_store().await;
        let one = ctx.store.insert_chapter("One", 5).await.unwrap();
        let two = ctx.store.insert_chapter("Two", 9).await.unwrap();
        ctx.store
            .apply_chapter_orders(&[(one.id, 2), (two.id, 1)])
            .await
            .unwrap();
        assert_eq!(ctx.store.max_chapter_order().await.unwrap(), 2);

        let titles: Vec<String> = ctx
            .store
            .list_chapters()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Two", "One"]);

        let scene = ctx.store.insert_scene("S", None, 0).await.unwrap();
        ctx.store
            .apply_scene_updates(&[SceneUpdate {
                id: scene.id,
                order: 1,
                chapter_id: Some(one.id),
            }])
            .await
            .unwrap();
        let scene = ctx.store.get_scene(scene.id).await.unwrap().unwrap();
        assert_eq!((scene.order, scene.chapter_id), (1, Some(one.id)));
    }

    #[tokio::test]
    async fn test_replace_contents_rewrites_everything() {
        let ctx = setup_store().await;
        ctx.store.insert_chapter("Stale", 1).await.unwrap();
        ctx.store.insert_scene("Stale", None, 1).await.unwrap();

        let book = Book::new("Fresh");
        let chapters = vec![Chapter {
            id: 1,
            uuid: None,
            title: "Fresh chapter".into(),
            order: 1,
            content_scene_id: None,
        }];
        let scenes = vec![Scene {
            id: 40,
            chapter_id: Some(1),
            order: 1,
            title: "Fresh scene".into(),
            total_symbol_count_with_spaces: None,
            total_symbol_count_wo_spaces: None,
        }];
        let bodies = vec![SceneBody {
            id: Some(7),
            scene_id: 40,
            body: "text".into(),
        }];
        let aux = vec![(AuxCollection::Blocks, vec![json!({"uuid": "b1"})])];

        ctx.store
            .replace_contents(&StoreContents {
                book: &book,
                chapters: &chapters,
                scenes: &scenes,
                bodies: &bodies,
                aux: &aux,
            })
            .await
            .unwrap();

        assert_eq!(ctx.store.get_book().await.unwrap(), Some(book));
        let stored_chapters = ctx.store.list_chapters().await.unwrap();
        assert_eq!(stored_chapters.len(), 1);
        assert!(stored_chapters[0].uuid.is_some());
        assert_eq!(ctx.store.list_scenes().await.unwrap(), scenes);
        assert_eq!(ctx.store.get_body(40).await.unwrap().unwrap().body, "text");
        assert_eq!(
            ctx.store.list_aux(AuxCollection::Blocks).await.unwrap(),
            vec![json!({"uuid": "b1"})]
        );
    }
}
