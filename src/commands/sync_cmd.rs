//! Sync CLI commands for exchanging snapshots with the server.

use clap::{Args, Subcommand};
use std::sync::Arc;

use super::parse_uuid;
use scriptorium::config::Config;
use scriptorium::library::Library;
use scriptorium::sync::{spawn_reconciliation, HttpRemote, SyncCoordinator, SyncError};

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: SyncSubcommand,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and the sync state of every book
    Status,

    /// Upload a book (or the notes) to the server
    Push {
        /// Book UUID
        #[arg(required_unless_present = "notes")]
        uuid: Option<String>,

        /// Push the notes collection
        #[arg(long, conflicts_with = "uuid")]
        notes: bool,
    },

    /// Replace a local book (or the notes) with the server copy
    Pull {
        /// Book UUID
        #[arg(required_unless_present = "notes")]
        uuid: Option<String>,

        /// Pull the notes collection
        #[arg(long, conflicts_with = "uuid")]
        notes: bool,
    },

    /// Compare every local book with the server once
    Poll,

    /// Keep comparing with the server at the configured interval
    Watch,
}

impl SyncCommand {
    pub async fn run(&self, library: Arc<Library>, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            SyncSubcommand::Status => self.status(&library, config).await,
            SyncSubcommand::Push { uuid, notes } => {
                let coordinator = coordinator(library, config)?;
                if *notes {
                    let meta = coordinator.push_notes().await?;
                    println!("✓ Notes pushed ({})", meta.sync_state);
                } else {
                    let uuid = book_uuid(uuid.as_deref())?;
                    let meta = coordinator.push_book(uuid).await?;
                    println!("✓ Book {} pushed ({})", uuid, meta.sync_state);
                }
                Ok(())
            }
            SyncSubcommand::Pull { uuid, notes } => {
                let coordinator = coordinator(library, config)?;
                if *notes {
                    coordinator.pull_notes().await?;
                    println!("✓ Notes pulled");
                } else {
                    let uuid = book_uuid(uuid.as_deref())?;
                    let book = coordinator.pull_book(uuid).await?;
                    println!("✓ Pulled '{}'", book.title);
                }
                Ok(())
            }
            SyncSubcommand::Poll => {
                let coordinator = coordinator(library, config)?;
                let report = coordinator.reconcile().await?;
                println!("Checked {} book(s)", report.checked);
                for (uuid, state) in &report.changed {
                    println!("  {} → {}", uuid, state);
                }
                for uuid in &report.remote_only {
                    println!("  {} (only on server)", uuid);
                }
                if report.changed.is_empty() {
                    println!("No changes.");
                }
                Ok(())
            }
            SyncSubcommand::Watch => {
                let coordinator = coordinator(library, config)?;
                let interval = config.sync.poll_interval();
                let handle = spawn_reconciliation(Arc::new(coordinator), interval)
                    .ok_or(SyncCommandError::Sync(SyncError::NotAuthenticated))?;

                println!(
                    "Reconciling every {}s. Press Ctrl-C to stop.",
                    interval.as_secs()
                );
                tokio::signal::ctrl_c()
                    .await
                    .map_err(|e| SyncCommandError::Signal(e.to_string()))?;
                handle.stop();
                println!("Stopped.");
                Ok(())
            }
        }
    }

    async fn status(&self, library: &Library, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        match (&config.sync.server_url, &config.sync.token) {
            (Some(server_url), token) => {
                println!("Server:   {}", server_url);
                match token {
                    Some(token) => {
                        let prefix: String = token.chars().take(8).collect();
                        println!("Token:    {}...", prefix)
                    }
                    None => println!("Token:    (none, sync disabled)"),
                }
                println!("Interval: {}s", config.sync.poll_interval().as_secs());
            }
            (None, _) => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    server_url: \"http://localhost:8080\"");
                println!("    token: \"your-api-key\"");
                println!();
                println!("Or set environment variables:");
                println!("  SCRIPTORIUM_SYNC_URL");
                println!("  SCRIPTORIUM_SYNC_TOKEN");
            }
        }

        println!();
        let books = library.list_books().await.map_err(SyncError::from)?;
        for book in &books {
            println!("  {:<14} {}", book.sync.sync_state.to_string(), book.title);
        }
        let notes = library
            .notes_tracker()
            .await
            .map_err(SyncError::from)?
            .current()
            .await;
        println!("  {:<14} (notes)", notes.sync_state.to_string());
        Ok(())
    }
}

fn coordinator(
    library: Arc<Library>,
    config: &Config,
) -> Result<SyncCoordinator<HttpRemote>, SyncCommandError> {
    let server_url = config
        .sync
        .server_url
        .as_ref()
        .ok_or(SyncCommandError::NotConfigured)?;
    Ok(SyncCoordinator::new(
        library,
        HttpRemote::new(server_url.clone()),
        config.sync.token.clone(),
    ))
}

fn book_uuid(value: Option<&str>) -> Result<uuid::Uuid, SyncCommandError> {
    let value = value.unwrap_or_default();
    parse_uuid(value).map_err(|_| SyncCommandError::InvalidBook(value.to_string()))
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    NotConfigured,
    InvalidBook(String),
    Signal(String),
    Sync(SyncError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::NotConfigured => {
                write!(f, "Sync is not configured (no server_url). See `sync status`.")
            }
            SyncCommandError::InvalidBook(value) => write!(f, "Invalid book UUID: {}", value),
            SyncCommandError::Signal(e) => write!(f, "Failed to wait for Ctrl-C: {}", e),
            SyncCommandError::Sync(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Sync(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::Sync(e)
    }
}
