use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::parse_uuid;
use scriptorium::backup::{BookSnapshot, NotesSnapshot};
use scriptorium::library::Library;

#[derive(Args)]
pub struct BackupCommand {
    #[command(subcommand)]
    pub command: BackupSubcommand,
}

#[derive(Subcommand)]
pub enum BackupSubcommand {
    /// Write a book (or the notes) to a JSON snapshot file
    Export {
        /// Book UUID
        #[arg(required_unless_present = "notes")]
        uuid: Option<String>,

        /// Export the notes collection instead of a book
        #[arg(long, conflicts_with = "uuid")]
        notes: bool,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Replace a book (or the notes) with the contents of a snapshot file
    Import {
        /// Snapshot file
        file: PathBuf,

        /// The file holds the notes collection
        #[arg(long)]
        notes: bool,
    },
}

impl BackupCommand {
    pub async fn run(&self, library: &Library) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            BackupSubcommand::Export {
                uuid,
                notes,
                output,
            } => {
                let json = if *notes {
                    serde_json::to_string_pretty(&NotesSnapshot::export(library).await?)?
                } else {
                    let uuid = parse_uuid(uuid.as_deref().unwrap_or_default())?;
                    serde_json::to_string_pretty(&BookSnapshot::export(library, uuid).await?)?
                };

                match output {
                    Some(path) => {
                        std::fs::write(path, json)?;
                        println!("✓ Snapshot written to {}", path.display());
                    }
                    None => println!("{}", json),
                }
                Ok(())
            }

            BackupSubcommand::Import { file, notes } => {
                let json = std::fs::read_to_string(file)?;

                if *notes {
                    let snapshot: NotesSnapshot = serde_json::from_str(&json)?;
                    snapshot.import(library).await?;
                    println!("✓ Imported {} note(s)", snapshot.notes.len());
                } else {
                    let snapshot = BookSnapshot::from_json(&json)?;
                    let book = snapshot.import(library).await?;
                    println!(
                        "✓ Imported '{}' ({} chapter(s), {} scene(s))",
                        book.title,
                        snapshot.chapters.len(),
                        snapshot.scenes.len()
                    );
                }
                Ok(())
            }
        }
    }
}
