use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    BackupCommand, BookCommand, ChapterCommand, ConfigCommand, NoteCommand, SceneCommand,
    SyncCommand,
};
use scriptorium::config::Config;
use scriptorium::library::Library;

#[derive(Parser)]
#[command(name = "scriptorium")]
#[command(version)]
#[command(about = "Local-first book authoring store", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage books
    Book(BookCommand),

    /// Manage the chapters of a book
    Chapter(ChapterCommand),

    /// Manage the scenes of a book
    Scene(SceneCommand),

    /// Manage notes
    Note(NoteCommand),

    /// Export and import JSON snapshots
    Backup(BackupCommand),

    /// Exchange snapshots with the sync server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scriptorium=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let library = Arc::new(Library::open(&config.data_dir.value).await?);

    match command {
        Commands::Book(cmd) => cmd.run(&library).await?,
        Commands::Chapter(cmd) => cmd.run(&library).await?,
        Commands::Scene(cmd) => cmd.run(&library).await?,
        Commands::Note(cmd) => cmd.run(&library).await?,
        Commands::Backup(cmd) => cmd.run(&library).await?,
        Commands::Sync(cmd) => cmd.run(library, &config).await?,
        Commands::Config(cmd) => cmd.run(&config)?,
    }

    Ok(())
}
