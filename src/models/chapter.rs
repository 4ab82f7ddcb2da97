use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Store-assigned surrogate key; differs between stores.
    #[serde(default)]
    pub id: i64,
    /// Stable identity used to remap scene references on import.
    /// Absent in documents written before chapters carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_scene_id: Option<i64>,
}
