use clap::{Args, Subcommand};

use super::{parse_uuid, truncate, OutputFormat};
use scriptorium::library::Library;
use scriptorium::models::{Note, NoteGroup};

#[derive(Args)]
pub struct NoteCommand {
    #[command(subcommand)]
    pub command: NoteSubcommand,
}

#[derive(Subcommand)]
pub enum NoteSubcommand {
    /// Add a note
    Add {
        /// Note title
        title: String,

        /// Note text
        #[arg(long)]
        body: Option<String>,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,

        /// Note group UUID
        #[arg(long)]
        group: Option<String>,

        /// Attach the note to a book
        #[arg(long)]
        book: Option<String>,
    },

    /// Add a note group
    AddGroup {
        /// Group title
        title: String,
    },

    /// List notes
    List {
        /// Only notes attached to this book
        #[arg(long)]
        book: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a note
    Delete {
        /// Note UUID
        uuid: String,
    },
}

impl NoteCommand {
    pub async fn run(&self, library: &Library) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            NoteSubcommand::Add {
                title,
                body,
                tags,
                group,
                book,
            } => {
                if title.trim().is_empty() {
                    return Err("Note title cannot be empty".into());
                }

                let mut note = Note::new(title.trim());
                if let Some(body) = body {
                    note = note.with_body(body);
                }
                if let Some(tags) = tags {
                    note = note.with_tags(tags);
                }
                if let Some(group) = group {
                    note = note.with_group(parse_uuid(group)?);
                }
                if let Some(book) = book {
                    let uuid = parse_uuid(book)?;
                    library.get_book(uuid).await?;
                    note = note.with_book(uuid);
                }

                let created = library.create_note(&note).await?;
                println!("Created note: {}", created);
                println!("  UUID: {}", created.uuid);
                Ok(())
            }

            NoteSubcommand::AddGroup { title } => {
                let group = library.create_note_group(&NoteGroup::new(title)).await?;
                println!("Created note group: {}", group.title);
                println!("  UUID: {}", group.uuid);
                Ok(())
            }

            NoteSubcommand::List { book, format } => {
                let mut notes = library.list_notes().await?;
                if let Some(book) = book {
                    let uuid = parse_uuid(book)?;
                    notes.retain(|n| n.book_uuid == Some(uuid));
                }

                if notes.is_empty() {
                    println!("No notes found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&notes)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<36}  {:<30}  TAGS", "UUID", "TITLE");
                        println!("{}", "-".repeat(80));
                        for note in &notes {
                            println!(
                                "{:<36}  {:<30}  {}",
                                note.uuid,
                                truncate(&note.title, 30),
                                note.tags
                            );
                        }
                        println!("\nTotal: {} note(s)", notes.len());
                    }
                }
                Ok(())
            }

            NoteSubcommand::Delete { uuid } => {
                library.delete_note(parse_uuid(uuid)?).await?;
                println!("Deleted note {}", uuid);
                Ok(())
            }
        }
    }
}
