//! Status command: show tracked entries and rule files

use super::open_tracker;
use anyhow::Result;
use clap::Args;
use filetrack_core::TrackerConfig;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Print the tracked entries as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(config: TrackerConfig, args: StatusArgs) -> Result<()> {
    let tracker = open_tracker(&config).await?;
    let entries = tracker.store().all();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("Root: {}", tracker.root().display());
        println!("Data: {}", config.data_dir().display());
        println!("Rule files: {}", tracker.engine().rule_files().len());
        println!("Tracked entries: {}", entries.len());
        for entry in &entries {
            let kind = if entry.is_directory { "dir " } else { "file" };
            println!(
                "  {} {}  (last tracked {})",
                kind,
                entry.path.display(),
                entry.last_tracked_time.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    tracker.shutdown().await;
    Ok(())
}
