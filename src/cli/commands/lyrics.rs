//! Lyrics backfill command.

use tokio::runtime::Runtime;

use super::{LiveCollaborators, install_signal_handlers};
use crate::config::Config;
use crate::control::SyncControl;
use crate::sync::{SyncEngine, load_state};

/// Look up lyrics for library files that have none
pub fn cmd_lyrics(rt: &Runtime, mut config: Config, retry_failed: bool) -> anyhow::Result<()> {
    config.lyrics.retry_failed |= retry_failed;
    let live = LiveCollaborators::new(&config)?;

    rt.block_on(async {
        let control = SyncControl::new();
        install_signal_handlers(&control);
        let engine = SyncEngine::new(config, live.as_collaborators(), control);

        let (_, index) = load_state(engine.config()).await?;
        match engine.backfill_lyrics(&index).await {
            Ok(summary) => {
                println!(
                    "Lyrics: {} found, {} not found, {} failed, {} skipped (cached)",
                    summary.found, summary.not_found, summary.failed, summary.cached
                );
                if summary.stopped_early {
                    println!("Stopped early after repeated failures; try again later.");
                }
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                println!("Lyrics lookup cancelled.");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::from(e)),
        }
    })
}
