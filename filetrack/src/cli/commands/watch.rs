//! Watch command: track paths and stream changes until interrupted

use super::{open_tracker, print_change};
use anyhow::{Context, Result};
use clap::Args;
use filetrack_core::TrackerConfig;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Files or directories to track (defaults to the root)
    pub paths: Vec<PathBuf>,

    /// Print one JSON object per change
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(config: TrackerConfig, args: WatchArgs) -> Result<()> {
    let tracker = open_tracker(&config).await?;

    let paths = if args.paths.is_empty() { vec![config.root.clone()] } else { args.paths };
    for path in &paths {
        let path = std::path::absolute(path).with_context(|| format!("Invalid path {:?}", path))?;
        if tracker.enable(&path).await? {
            info!("Tracking {:?}", path);
        }
    }

    let mut changes = tracker.subscribe();
    let watch = tracker.watch()?;
    info!("Watching {:?}; press Ctrl+C to stop", watch.paths());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => match change {
                Ok(change) => print_change(&change, args.json)?,
                Err(RecvError::Lagged(missed)) => warn!("Output fell behind; {} changes not shown", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    drop(watch);
    tracker.shutdown().await;
    Ok(())
}
