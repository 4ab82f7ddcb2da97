use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::{parse_uuid, report, truncate, OutputFormat};
use scriptorium::library::{Library, SceneChanges};
use scriptorium::service::SceneService;

#[derive(Args)]
pub struct SceneCommand {
    /// Book UUID
    #[arg(long, short)]
    pub book: String,

    #[command(subcommand)]
    pub command: SceneSubcommand,
}

#[derive(Subcommand)]
pub enum SceneSubcommand {
    /// Add a scene at the end of a chapter (or of the chapterless scenes)
    Add {
        /// Scene title
        title: String,

        /// Chapter ID
        #[arg(long)]
        chapter: Option<i64>,
    },

    /// List scenes in reading order
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a scene with its body text
    Show {
        /// Scene ID
        id: i64,
    },

    /// Edit a scene's title or body
    Edit {
        /// Scene ID
        id: i64,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New body text
        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,

        /// Read the new body text from a file
        #[arg(long)]
        body_file: Option<PathBuf>,
    },

    /// Move a scene into a chapter, or out of its chapter
    Move {
        /// Scene ID
        id: i64,

        /// Target chapter ID
        #[arg(long, conflicts_with = "detach", required_unless_present = "detach")]
        chapter: Option<i64>,

        /// Make the scene chapterless
        #[arg(long)]
        detach: bool,
    },

    /// Set a scene's order value
    Order {
        /// Scene ID
        id: i64,

        /// New order value
        order: i64,
    },

    /// Swap the order of two scenes
    Swap {
        /// First scene ID
        a: i64,

        /// Second scene ID
        b: i64,
    },

    /// Delete a scene and its body
    Delete {
        /// Scene ID
        id: i64,
    },

    /// Renumber every scene into reading order
    Recalculate,
}

impl SceneCommand {
    pub async fn run(&self, library: &Library) -> Result<(), Box<dyn std::error::Error>> {
        let session = library.session(parse_uuid(&self.book)?).await?;
        let service = SceneService::new(session.clone());

        match &self.command {
            SceneSubcommand::Add { title, chapter } => {
                if let Some(scene) =
                    report(service.create_scene(title, *chapter).await, "Scene added")?
                {
                    println!("  {} (id {}, order {})", scene.title, scene.id, scene.order);
                }
            }

            SceneSubcommand::List { format } => {
                let scenes = session.list_scenes().await?;
                if scenes.is_empty() {
                    println!("No scenes found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&scenes)?);
                    }
                    OutputFormat::Text => {
                        println!(
                            "{:>5}  {:>5}  {:>7}  {:<30}  WORDS",
                            "ID", "ORDER", "CHAPTER", "TITLE"
                        );
                        println!("{}", "-".repeat(64));
                        for scene in &scenes {
                            let chapter = scene
                                .chapter_id
                                .map(|id| id.to_string())
                                .unwrap_or_else(|| "-".to_string());
                            println!(
                                "{:>5}  {:>5}  {:>7}  {:<30}  {}",
                                scene.id,
                                scene.order,
                                chapter,
                                truncate(&scene.title, 30),
                                scene.total_symbol_count_wo_spaces.unwrap_or(0)
                            );
                        }
                        println!("\nTotal: {} scene(s)", scenes.len());
                    }
                }
            }

            SceneSubcommand::Show { id } => {
                let scene = session
                    .get_scene(*id)
                    .await?
                    .ok_or_else(|| format!("Scene not found: {}", id))?;
                let body = session.get_body(*id).await?.map(|b| b.body).unwrap_or_default();

                println!("{}", scene.title);
                println!("{}", "=".repeat(scene.title.chars().count()));
                println!("Order: {}", scene.order);
                if let Some(chapter_id) = scene.chapter_id {
                    println!("Chapter: {}", chapter_id);
                }
                println!();
                println!("{}", body);
            }

            SceneSubcommand::Edit {
                id,
                title,
                body,
                body_file,
            } => {
                let body = match body_file {
                    Some(path) => Some(std::fs::read_to_string(path)?),
                    None => body.clone(),
                };
                if title.is_none() && body.is_none() {
                    return Err("Nothing to update. Provide --title, --body or --body-file.".into());
                }

                let changes = SceneChanges {
                    title: title.clone(),
                    body,
                    ..Default::default()
                };
                report(service.update_scene(*id, changes).await, "Scene updated")?;
            }

            SceneSubcommand::Move { id, chapter, detach } => {
                if *detach {
                    report(
                        service.remove_scene_from_chapter(*id).await,
                        "Scene is now chapterless",
                    )?;
                } else if let Some(chapter) = chapter {
                    report(
                        service.add_scene_to_chapter(*id, *chapter).await,
                        "Scene moved",
                    )?;
                }
            }

            SceneSubcommand::Order { id, order } => {
                report(service.update_scene_order(*id, *order).await, "Scene order set")?;
            }

            SceneSubcommand::Swap { a, b } => {
                report(service.reorder_scenes(*a, *b).await, "Scenes swapped")?;
            }

            SceneSubcommand::Delete { id } => {
                report(service.delete_scene(*id).await, "Scene deleted")?;
            }

            SceneSubcommand::Recalculate => {
                if let Some(changed) =
                    report(service.recalculate_global_order().await, "Order recalculated")?
                {
                    println!("  {} scene(s) renumbered", changed);
                }
            }
        }
        Ok(())
    }
}
