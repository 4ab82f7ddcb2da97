use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::sync_state::SyncMeta;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub uuid: Uuid,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub form: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub configuration_uuid: String,
    #[serde(default)]
    pub configuration_title: String,
    /// Every chapter owns exactly one content scene.
    #[serde(default, with = "int_flag")]
    pub chapter_only_mode: bool,
    #[serde(flatten)]
    pub sync: SyncMeta,
}

impl Book {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            author: String::new(),
            form: String::new(),
            genre: String::new(),
            kind: None,
            cover: None,
            description: None,
            configuration_uuid: String::new(),
            configuration_title: String::new(),
            chapter_only_mode: false,
            sync: SyncMeta::default(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_configuration(
        mut self,
        uuid: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        self.configuration_uuid = uuid.into();
        self.configuration_title = title.into();
        self
    }

    pub fn with_chapter_only_mode(mut self, enabled: bool) -> Self {
        self.chapter_only_mode = enabled;
        self
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", "=".repeat(self.title.chars().count()))?;
        writeln!(f, "UUID: {}", self.uuid)?;
        if !self.author.is_empty() {
            writeln!(f, "Author: {}", self.author)?;
        }
        if !self.genre.is_empty() {
            writeln!(f, "Genre: {}", self.genre)?;
        }
        if let Some(description) = &self.description {
            writeln!(f, "\n{}\n", description)?;
        }
        write!(f, "Sync: {}", self.sync.sync_state)?;
        if let Some(local) = self.sync.local_updated_at {
            write!(f, " (local {})", local.to_rfc3339())?;
        }
        if let Some(server) = self.sync.server_updated_at {
            write!(f, " (server {})", server.to_rfc3339())?;
        }
        Ok(())
    }
}

/// Snapshots written by older clients store flags as `0`/`1`.
mod int_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        })
    }
}
