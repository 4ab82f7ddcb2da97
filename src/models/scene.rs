use serde::{Deserialize, Serialize};

/// Scene metadata. The body lives in [`SceneBody`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: i64,
    /// `None` means the scene is chapterless.
    #[serde(default)]
    pub chapter_id: Option<i64>,
    /// Position in the global sequence shared by every scene of the book.
    #[serde(default)]
    pub order: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_symbol_count_with_spaces: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_symbol_count_wo_spaces: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SceneBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub scene_id: i64,
    #[serde(default)]
    pub body: String,
}

/// Character counts of a scene body: `(with_spaces, without_spaces)`.
pub fn symbol_counts(body: &str) -> (i64, i64) {
    let with_spaces = body.chars().count();
    let without_spaces = body.chars().filter(|c| !c.is_whitespace()).count();
    (with_spaces as i64, without_spaces as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_counts() {
        assert_eq!(symbol_counts(""), (0, 0));
        assert_eq!(symbol_counts("a b\tc\n"), (6, 3));
        assert_eq!(symbol_counts("ночь"), (4, 4));
    }

    #[test]
    fn test_scene_null_chapter_is_chapterless() {
        let scene: Scene =
            serde_json::from_str(r#"{"id": 4, "chapterId": null, "order": 2, "title": "Dawn"}"#)
                .unwrap();
        assert_eq!(scene.chapter_id, None);
        assert_eq!(scene.order, 2);
    }
}
