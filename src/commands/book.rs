use clap::{Args, Subcommand};
use std::io::{self, Write};

use super::{parse_uuid, truncate, OutputFormat};
use scriptorium::library::Library;
use scriptorium::models::Book;

#[derive(Args)]
pub struct BookCommand {
    #[command(subcommand)]
    pub command: BookSubcommand,
}

#[derive(Subcommand)]
pub enum BookSubcommand {
    /// Create a new book
    Create {
        /// Title of the book
        title: String,

        /// Author name
        #[arg(long)]
        author: Option<String>,

        /// Genre
        #[arg(long)]
        genre: Option<String>,

        /// Short description
        #[arg(long)]
        description: Option<String>,

        /// Every chapter gets exactly one content scene
        #[arg(long)]
        chapter_only: bool,
    },

    /// List all books
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a book's details
    Show {
        /// Book UUID
        uuid: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a book and its store
    Delete {
        /// Book UUID
        uuid: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl BookCommand {
    pub async fn run(&self, library: &Library) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            BookSubcommand::Create {
                title,
                author,
                genre,
                description,
                chapter_only,
            } => {
                if title.trim().is_empty() {
                    return Err("Book title cannot be empty".into());
                }

                let mut book = Book::new(title.trim()).with_chapter_only_mode(*chapter_only);
                if let Some(author) = author {
                    book = book.with_author(author);
                }
                if let Some(genre) = genre {
                    book = book.with_genre(genre);
                }
                if let Some(description) = description {
                    book = book.with_description(description);
                }

                let created = library.create_book(book).await?;
                println!("Created book:");
                println!("{}", created);
                Ok(())
            }

            BookSubcommand::List { format } => {
                let books = library.list_books().await?;
                if books.is_empty() {
                    println!("No books found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&books)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<36}  {:<30}  SYNC", "UUID", "TITLE");
                        println!("{}", "-".repeat(82));
                        for book in &books {
                            println!(
                                "{:<36}  {:<30}  {}",
                                book.uuid,
                                truncate(&book.title, 30),
                                book.sync.sync_state
                            );
                        }
                        println!("\nTotal: {} book(s)", books.len());
                    }
                }
                Ok(())
            }

            BookSubcommand::Show { uuid, format } => {
                let uuid = parse_uuid(uuid)?;
                let book = library.get_book(uuid).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&book)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", book);
                        let session = library.session(uuid).await?;
                        let chapters = session.list_chapters().await?;
                        let scenes = session.list_scenes().await?;
                        println!("Chapters: {}", chapters.len());
                        println!("Scenes:   {}", scenes.len());
                    }
                }
                Ok(())
            }

            BookSubcommand::Delete { uuid, force } => {
                let uuid = parse_uuid(uuid)?;
                let book = library.get_book(uuid).await?;

                if !force {
                    print!("Delete book '{}' and all its scenes? [y/N] ", book.title);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                library.delete_book(uuid).await?;
                println!("Deleted book: {}", book.title);
                Ok(())
            }
        }
    }
}
