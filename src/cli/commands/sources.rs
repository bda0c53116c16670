//! Playlist source management commands.

use std::path::{Path, PathBuf};

use crate::config::{self, Config, SourceConfig};

fn require_path(config_path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    config_path.ok_or_else(|| anyhow::anyhow!("No config file location; pass --config"))
}

/// List configured sources
pub fn cmd_sources_list(config: &Config) -> anyhow::Result<()> {
    if config.sources.is_empty() {
        println!("No sources configured. Add one with `sources add <path>`.");
        return Ok(());
    }
    for source in &config.sources {
        let name = source.name.as_deref().unwrap_or("(not synced yet)");
        let synced = source
            .last_synced
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!("{:<40} {:<30} last synced {}", source.id, name, synced);
    }
    Ok(())
}

/// Add a source, ignoring duplicates
pub fn cmd_sources_add(mut config: Config, config_path: Option<PathBuf>, id: &str) -> anyhow::Result<()> {
    let path = require_path(config_path)?;
    if !add_source(&mut config, id) {
        println!("Source already configured: {}", id);
        return Ok(());
    }
    if !Path::new(id).exists() {
        eprintln!("Warning: {} does not exist yet", id);
    }
    config::save_to(&config, &path)?;
    println!("Added source {}", id);
    Ok(())
}

/// Remove a source
pub fn cmd_sources_remove(mut config: Config, config_path: Option<PathBuf>, id: &str) -> anyhow::Result<()> {
    let path = require_path(config_path)?;
    if !remove_source(&mut config, id) {
        anyhow::bail!("No source with id {}", id);
    }
    config::save_to(&config, &path)?;
    println!("Removed source {}", id);
    Ok(())
}

fn add_source(config: &mut Config, id: &str) -> bool {
    if config.sources.iter().any(|s| s.id == id) {
        return false;
    }
    config.sources.push(SourceConfig::new(id));
    true
}

fn remove_source(config: &mut Config, id: &str) -> bool {
    let before = config.sources.len();
    config.sources.retain(|s| s.id != id);
    config.sources.len() != before
}
