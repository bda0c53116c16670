//! Playlist Keeper - keeps a local music library in step with playlists.
//!
//! Playlists name the songs that should be in the library. A sync run
//! downloads what is missing, fetches synced lyrics, and moves files no
//! playlist wants into a quarantine folder where they can be recovered.

pub mod cli;
pub mod config;
pub mod control;
pub mod download;
pub mod error;
pub mod library;
pub mod lyrics;
pub mod normalize;
pub mod observer;
pub mod organizer;
pub mod planner;
pub mod playlist;
pub mod reconcile;
pub mod scanner;
pub mod stats;
pub mod sync;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log target roots used across the crate.
const LOG_TARGETS: &[&str] = &[
    "playlist_keeper",
    "cli",
    "download",
    "library",
    "lyrics",
    "organizer",
    "playlist",
    "sync",
];

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        filter = filter.add_directive(format!("{target}={level}").parse()?);
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    cli::run_command(&args)
}
