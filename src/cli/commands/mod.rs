//! CLI command definitions and dispatch.
//!
//! Each group of subcommands lives in its own submodule:
//! - `sync`: the full pipeline, the dry-run plan, and the quarantine pass
//! - `library`: statistics, completeness report, export, filename tidy
//! - `lyrics`: lyrics backfill on its own
//! - `sources`: managing configured playlist sources

mod library;
mod lyrics;
mod sources;
mod sync;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::warn;

use crate::config::{self, Config};
use crate::control::SyncControl;
use crate::download::ytdlp::YtDlpFetcher;
use crate::lyrics::LrclibClient;
use crate::observer::TracingObserver;
use crate::playlist::LocalListSource;
use crate::sync::Collaborators;

pub use library::{cmd_export, cmd_report, cmd_stats, cmd_tidy};
pub use lyrics::cmd_lyrics;
pub use sources::{cmd_sources_add, cmd_sources_list, cmd_sources_remove};
pub use sync::{cmd_plan, cmd_reconcile, cmd_sync};

/// Playlist Keeper CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: <config dir>/playlist-keeper/config.toml)
    #[arg(long, global = true, env = "PLAYLIST_KEEPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Refresh sources, download missing tracks, fetch lyrics, quarantine orphans
    Sync,
    /// Show what a sync would download, without changing anything
    Plan,
    /// Move orphans into quarantine and recover wanted files from it
    Reconcile,
    /// Library size and playlist duplication statistics
    Stats,
    /// Per-playlist completeness
    Report,
    /// Copy playlists' files into the export folder
    Export {
        /// Playlist names to export (default: all)
        playlists: Vec<String>,
    },
    /// Look up lyrics for library files that have none
    Lyrics {
        /// Also retry songs that previously had no lyrics
        #[arg(long)]
        retry_failed: bool,
    },
    /// Fix artifact prefixes and unsafe characters in library filenames
    Tidy,
    /// Manage playlist sources
    Sources {
        #[command(subcommand)]
        action: SourcesCommand,
    },
}

#[derive(Subcommand)]
pub enum SourcesCommand {
    /// List configured sources
    List,
    /// Add a source (a path to a track list file)
    Add { id: String },
    /// Remove a source
    Remove { id: String },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let (config, config_path) = load_config(cli);

    match &cli.command {
        Commands::Sync => cmd_sync(&rt, config, config_path),
        Commands::Plan => cmd_plan(&rt, config),
        Commands::Reconcile => cmd_reconcile(&rt, config),
        Commands::Stats => cmd_stats(&rt, config),
        Commands::Report => cmd_report(&rt, config),
        Commands::Export { playlists } => cmd_export(&rt, config, playlists),
        Commands::Lyrics { retry_failed } => cmd_lyrics(&rt, config, *retry_failed),
        Commands::Tidy => cmd_tidy(&config),
        Commands::Sources { action } => match action {
            SourcesCommand::List => cmd_sources_list(&config),
            SourcesCommand::Add { id } => cmd_sources_add(config, config_path, id),
            SourcesCommand::Remove { id } => cmd_sources_remove(config, config_path, id),
        },
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Config from `--config` or the default location, with the path it came from.
fn load_config(cli: &Cli) -> (Config, Option<PathBuf>) {
    let path = cli.config.clone().or_else(config::config_path);
    let config = match &path {
        Some(path) => config::load_from(path),
        None => {
            warn!(target: "cli", "Could not determine config directory, using defaults");
            Config::default()
        }
    };
    (config, path)
}

/// Production collaborators, owned so commands can lend them to the engine.
pub(crate) struct LiveCollaborators {
    source: LocalListSource,
    fetcher: YtDlpFetcher,
    captions: LrclibClient,
    observer: TracingObserver,
}

impl LiveCollaborators {
    pub(crate) fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            source: LocalListSource,
            fetcher: YtDlpFetcher::from_config(&config.download),
            captions: LrclibClient::new()?,
            observer: TracingObserver,
        })
    }

    pub(crate) fn fetcher(&self) -> &YtDlpFetcher {
        &self.fetcher
    }

    pub(crate) fn as_collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            source: &self.source,
            fetcher: &self.fetcher,
            captions: &self.captions,
            observer: &self.observer,
        }
    }
}

/// Trip `control` on Ctrl-C; on Unix, SIGUSR1 toggles pause.
///
/// Must be called inside the runtime.
pub(crate) fn install_signal_handlers(control: &SyncControl) {
    let cancel = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, stopping at the next checkpoint...");
            cancel.cancel();
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let pause = control.clone();
        match signal(SignalKind::user_defined1()) {
            Ok(mut toggles) => {
                tokio::spawn(async move {
                    while toggles.recv().await.is_some() {
                        if pause.is_paused() {
                            eprintln!("Resuming");
                            pause.resume();
                        } else {
                            eprintln!("Paused at the next checkpoint; send SIGUSR1 again to resume");
                            pause.pause();
                        }
                    }
                });
            }
            Err(e) => warn!(target: "cli", error = %e, "Pause toggle unavailable"),
        }
    }
}

/// Print installation instructions for the fetch tool
pub(crate) fn print_fetch_tool_install_instructions(program: &str) {
    eprintln!("Error: {program} not found.");
    eprintln!("Install yt-dlp (and ffmpeg for transcoding):");
    eprintln!("  Windows: winget install yt-dlp.yt-dlp Gyan.FFmpeg");
    eprintln!("  macOS:   brew install yt-dlp ffmpeg");
    eprintln!("  Linux:   pipx install yt-dlp && apt install ffmpeg");
    eprintln!("Or point download.fetch_tool in the config file at it.");
}
