mod backup;
mod book;
mod chapter;
mod config_cmd;
mod note;
mod scene;
mod sync_cmd;

use clap::ValueEnum;
use scriptorium::service::ServiceResult;
use uuid::Uuid;

pub use backup::BackupCommand;
pub use book::BookCommand;
pub use chapter::ChapterCommand;
pub use config_cmd::ConfigCommand;
pub use note::NoteCommand;
pub use scene::SceneCommand;
pub use sync_cmd::SyncCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Parses a book UUID argument.
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
    Uuid::parse_str(value).map_err(|_| format!("Invalid UUID: {}", value).into())
}

/// Prints a one-line outcome and turns a failure into an error.
pub(crate) fn report<T>(
    result: ServiceResult<T>,
    done: &str,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    if result.success {
        println!("✓ {}", done);
        Ok(result.data)
    } else {
        let message = result
            .message
            .unwrap_or_else(|| "unknown failure".to_string());
        println!("✗ {}", message);
        Err(message.into())
    }
}

/// Cuts `text` to `width` characters, marking the cut with "...".
pub(crate) fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}
