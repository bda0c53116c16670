//! Sync, dry-run plan, and quarantine commands.

use std::path::PathBuf;
use tokio::runtime::Runtime;

use super::{LiveCollaborators, install_signal_handlers, print_fetch_tool_install_instructions};
use crate::config::Config;
use crate::control::SyncControl;
use crate::stats::mib;
use crate::sync::{SyncEngine, SyncReport};

/// Run the full pipeline
pub fn cmd_sync(rt: &Runtime, config: Config, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let live = LiveCollaborators::new(&config)?;
    if !live.fetcher().is_available() {
        print_fetch_tool_install_instructions(&config.download.fetch_tool);
        anyhow::bail!("{} is not available", config.download.fetch_tool);
    }

    rt.block_on(async {
        let control = SyncControl::new();
        install_signal_handlers(&control);

        let mut engine = SyncEngine::new(config, live.as_collaborators(), control);
        if let Some(path) = config_path {
            engine = engine.with_config_path(path);
        }

        match engine.run().await {
            Ok(report) => {
                print_report(&report);
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                println!("Sync cancelled. Partial downloads are cleaned up on the next run.");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::from(e)),
        }
    })
}

fn print_report(report: &SyncReport) {
    println!();
    println!("Sync Summary");
    println!("============");
    if report.tidy.renamed + report.tidy.removed > 0 {
        println!(
            "Tidied:      {} renamed, {} duplicates removed",
            report.tidy.renamed, report.tidy.removed
        );
    }
    println!(
        "Sources:     {} refreshed, {} up to date, {} failed",
        report.refresh.refreshed, report.refresh.skipped, report.refresh.failed
    );
    for diff in &report.refresh.reports {
        println!("  {}: +{} -{}", diff.playlist, diff.added.len(), diff.removed.len());
    }
    println!(
        "Downloads:   {} of {} planned ({} already present)",
        report.downloads.downloaded, report.planned, report.downloads.already_present
    );
    if let Some(lyrics) = &report.lyrics {
        println!(
            "Lyrics:      {} found, {} not found, {} failed, {} skipped (cached)",
            lyrics.found, lyrics.not_found, lyrics.failed, lyrics.cached
        );
    }
    println!(
        "Quarantine:  {} moved in, {} recovered, {} listed",
        report.reconcile.moved, report.reconcile.recovered, report.reconcile.listed
    );
    println!(
        "Library:     {} files, {:.1} MiB",
        report.stats.total_files,
        mib(report.stats.total_bytes)
    );

    if !report.downloads.failed_tracks.is_empty() {
        println!();
        println!("Not downloaded:");
        for track in &report.downloads.failed_tracks {
            println!("  ✗ {}", track);
        }
    }
}

/// Show the download queue without changing anything
pub fn cmd_plan(rt: &Runtime, config: Config) -> anyhow::Result<()> {
    let live = LiveCollaborators::new(&config)?;
    rt.block_on(async {
        let engine = SyncEngine::new(config, live.as_collaborators(), SyncControl::new());
        let plan = engine.plan_only().await?;

        if plan.tasks.is_empty() {
            println!("Nothing to download.");
        } else {
            println!("{} tracks to download:", plan.tasks.len());
            for task in &plan.tasks {
                println!("  {} ({})", task.track, task.playlist);
                for (i, query) in task.candidates.iter().enumerate() {
                    println!("      {}. {}", i + 1, query);
                }
            }
        }

        println!();
        for entry in plan.completeness.iter().filter(|c| !c.is_complete()) {
            println!("{}: {} of {} missing", entry.playlist, entry.missing, entry.total);
        }
        anyhow::Ok(())
    })
}

/// Run only the quarantine pass
pub fn cmd_reconcile(rt: &Runtime, config: Config) -> anyhow::Result<()> {
    let live = LiveCollaborators::new(&config)?;
    rt.block_on(async {
        let control = SyncControl::new();
        install_signal_handlers(&control);
        let engine = SyncEngine::new(config, live.as_collaborators(), control);

        let summary = engine.reconcile_only().await?;
        if summary.changed_files() == 0 {
            println!("Library and quarantine are already in order.");
        } else {
            println!(
                "Moved {} orphans into quarantine, recovered {}, removed {} duplicates.",
                summary.moved, summary.recovered, summary.duplicates_removed
            );
        }
        println!("Quarantine listing has {} entries.", summary.listed);
        anyhow::Ok(())
    })
}
