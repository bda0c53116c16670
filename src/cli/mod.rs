//! Command-line interface for playlist-keeper.
//!
//! This module provides CLI commands for syncing playlists into the
//! library, inspecting it, and managing playlist sources.

mod commands;

pub use commands::{Cli, run_command};
