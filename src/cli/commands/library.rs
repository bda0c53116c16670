//! Library inspection and maintenance commands.

use tokio::runtime::Runtime;

use crate::config::Config;
use crate::organizer;
use crate::planner;
use crate::stats::{self, mib};
use crate::sync::load_state;

/// Print library size and playlist duplication statistics
pub fn cmd_stats(rt: &Runtime, config: Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let (playlists, index) = load_state(&config).await?;
        let stats = stats::compute(&index, &playlists);

        println!("Library Statistics");
        println!("==================");
        println!("Files:            {}", stats.total_files);
        println!("Size:             {:.1} MiB", mib(stats.total_bytes));
        println!();
        println!("Playlist entries: {}", stats.total_entries);
        println!("Unique entries:   {}", stats.unique_entries);
        println!("Duplicates:       {}", stats.duplicates);
        println!(
            "Shared files save {:.1} MiB ({:.1} MiB with one copy per entry)",
            mib(stats.savings_bytes),
            mib(stats.potential_bytes())
        );

        if !stats.recent.is_empty() {
            println!();
            println!("Recently added:");
            for file in &stats.recent {
                println!("  {}  {}", file.date, file.name);
            }
        }
        anyhow::Ok(())
    })
}

/// Print per-playlist completeness
pub fn cmd_report(rt: &Runtime, config: Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let (playlists, index) = load_state(&config).await?;
        for entry in planner::completeness(&playlists, &index) {
            let mark = if entry.is_complete() { "✓" } else { "✗" };
            println!(
                "{} {:<40} {:>4}/{:<4}",
                mark,
                entry.playlist,
                entry.total - entry.missing,
                entry.total
            );
        }
        anyhow::Ok(())
    })
}

/// Copy playlists' files into the export folder
pub fn cmd_export(rt: &Runtime, config: Config, selected: &[String]) -> anyhow::Result<()> {
    rt.block_on(async {
        let (playlists, index) = load_state(&config).await?;
        for name in selected {
            if !playlists.iter().any(|p| &p.name == name) {
                eprintln!("Warning: no playlist named {:?}", name);
            }
        }

        let export_path = &config.library.export_path;
        let results = organizer::export_playlists(&playlists, &index, export_path, selected)?;
        for result in &results {
            println!("{}: copied {}/{}", result.playlist, result.copied, result.total);
        }
        println!("Exported {} playlists to {:?}", results.len(), export_path);
        anyhow::Ok(())
    })
}

/// Fix artifact prefixes and unsafe characters in library filenames
pub fn cmd_tidy(config: &Config) -> anyhow::Result<()> {
    let summary = organizer::tidy_filenames(&config.library.library_path)?;
    println!(
        "Renamed {} files, removed {} artifact copies.",
        summary.renamed, summary.removed
    );
    Ok(())
}
