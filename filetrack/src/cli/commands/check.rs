//! Check command: one-shot comparison against the stored backups

use super::{open_tracker, print_change};
use anyhow::{Context, Result};
use clap::Args;
use filetrack_core::{ContentChanged, TrackerConfig};
use std::path::PathBuf;
use tokio::sync::broadcast::{Receiver, error::TryRecvError};
use tracing::warn;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Start tracking these paths before checking
    pub paths: Vec<PathBuf>,

    /// Print one JSON object per change
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(config: TrackerConfig, args: CheckArgs) -> Result<()> {
    let tracker = open_tracker(&config).await?;
    let mut changes = tracker.subscribe();

    for path in &args.paths {
        let path = std::path::absolute(path).with_context(|| format!("Invalid path {:?}", path))?;
        tracker.enable(&path).await?;
    }

    let checked = tracker.sync().await?;

    let reported = drain_changes(&mut changes, |change| print_change(change, args.json))?;
    if !args.json {
        println!("{} entries checked, {} changed", checked, reported);
    }

    tracker.shutdown().await;
    Ok(())
}

/// Hand every queued change to `each`. Changes lost to lag are still counted.
fn drain_changes<F>(changes: &mut Receiver<ContentChanged>, mut each: F) -> Result<u64>
where
    F: FnMut(&ContentChanged) -> Result<()>,
{
    let mut count = 0;
    loop {
        match changes.try_recv() {
            Ok(change) => {
                each(&change)?;
                count += 1;
            }
            Err(TryRecvError::Lagged(missed)) => {
                warn!("Output fell behind; {} changes not shown", missed);
                count += missed;
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(count),
        }
    }
}
