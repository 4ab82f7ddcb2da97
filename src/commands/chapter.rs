use clap::{Args, Subcommand};

use super::{parse_uuid, report, truncate, OutputFormat};
use scriptorium::library::Library;
use scriptorium::service::SceneService;

#[derive(Args)]
pub struct ChapterCommand {
    /// Book UUID
    #[arg(long, short)]
    pub book: String,

    #[command(subcommand)]
    pub command: ChapterSubcommand,
}

#[derive(Subcommand)]
pub enum ChapterSubcommand {
    /// Add a chapter at the end of the book
    Add {
        /// Chapter title
        title: String,
    },

    /// List chapters in reading order
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Rename a chapter
    Rename {
        /// Chapter ID
        id: i64,

        /// New title
        title: String,
    },

    /// Set a chapter's order value
    Order {
        /// Chapter ID
        id: i64,

        /// New order value
        order: i64,
    },

    /// Move a chapter to the position of another chapter
    Reorder {
        /// Chapter being moved
        active: i64,

        /// Chapter whose position it takes
        over: i64,
    },

    /// Delete a chapter, keeping its scenes as chapterless scenes
    Delete {
        /// Chapter ID
        id: i64,
    },
}

impl ChapterCommand {
    pub async fn run(&self, library: &Library) -> Result<(), Box<dyn std::error::Error>> {
        let session = library.session(parse_uuid(&self.book)?).await?;
        let service = SceneService::new(session.clone());

        match &self.command {
            ChapterSubcommand::Add { title } => {
                if let Some(chapter) = report(service.create_chapter(title).await, "Chapter added")? {
                    println!("  {} (id {})", chapter.title, chapter.id);
                }
            }

            ChapterSubcommand::List { format } => {
                let chapters = session.list_chapters().await?;
                if chapters.is_empty() {
                    println!("No chapters found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&chapters)?);
                    }
                    OutputFormat::Text => {
                        println!("{:>5}  {:>5}  TITLE", "ID", "ORDER");
                        println!("{}", "-".repeat(50));
                        for chapter in &chapters {
                            println!(
                                "{:>5}  {:>5}  {}",
                                chapter.id,
                                chapter.order,
                                truncate(&chapter.title, 36)
                            );
                        }
                        println!("\nTotal: {} chapter(s)", chapters.len());
                    }
                }
            }

            ChapterSubcommand::Rename { id, title } => {
                report(service.update_chapter(*id, title).await, "Chapter renamed")?;
            }

            ChapterSubcommand::Order { id, order } => {
                report(
                    service.update_chapter_order(*id, *order).await,
                    "Chapter order set",
                )?;
            }

            ChapterSubcommand::Reorder { active, over } => {
                report(
                    service.reorder_chapters(*active, *over).await,
                    "Chapters reordered",
                )?;
            }

            ChapterSubcommand::Delete { id } => {
                report(service.delete_chapter(*id).await, "Chapter deleted")?;
            }
        }
        Ok(())
    }
}
