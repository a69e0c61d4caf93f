// Command implementations

pub mod check;
pub mod ignore;
pub mod status;
pub mod watch;

use anyhow::{Context, Result};
use filetrack_core::store::JsonFilePersistence;
use filetrack_core::tracking::ContentChanged;
use filetrack_core::{DiffKind, FileTracker, TrackerConfig, storage};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Name of the config file looked up in the root when `--config` is absent
const DEFAULT_CONFIG_FILE: &str = "filetrack.toml";

/// Resolve the effective config: an explicit file, `<root>/filetrack.toml`,
/// or defaults. A root given on the command line wins over the file's.
pub fn load_config(explicit: Option<&Path>, root: Option<&Path>) -> Result<TrackerConfig> {
    let search_root = root.unwrap_or(Path::new("."));

    let mut config = match explicit {
        Some(path) => TrackerConfig::from_file(path)?,
        None => {
            let candidate = search_root.join(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                info!("Using config {:?}", candidate);
                TrackerConfig::from_file(&candidate)?
            } else {
                TrackerConfig::default()
            }
        }
    };

    if let Some(root) = root {
        config.root = root.to_path_buf();
    }
    config.root = std::path::absolute(&config.root)
        .with_context(|| format!("Invalid root {:?}", config.root))?;
    Ok(config)
}

/// Open a tracker backed by the JSON database in the data directory
pub async fn open_tracker(config: &TrackerConfig) -> Result<FileTracker> {
    let persistence = Arc::new(JsonFilePersistence::new(config.database_path()));
    FileTracker::new(config.clone(), storage::build(config), persistence).await
}

/// Print a change notification, as JSON or as a short patch-like listing
pub fn print_change(change: &ContentChanged, json: bool) -> Result<()> {
    if json {
        let line = serde_json::json!({
            "path": change.path,
            "diff": change.diff,
            "at": chrono::Utc::now().to_rfc3339(),
        });
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    let label = if change.diff.is_initial { "new" } else { "changed" };
    println!("{} {}", label, change.path.display());
    for entry in change.diff.changes() {
        let (marker, text) = match entry.kind {
            DiffKind::Inserted => ("+", entry.modified.as_deref()),
            DiffKind::Deleted => ("-", entry.original.as_deref()),
            DiffKind::Modified => ("~", entry.modified.as_deref()),
            DiffKind::Unchanged => continue,
        };
        match text {
            Some(text) => {
                for line in text.lines() {
                    println!("  {} {}", marker, line);
                }
            }
            None => println!("  {} (binary content)", marker),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_found_in_root() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("filetrack.toml"), "debounce_ms = 42\nroot = \"/elsewhere\"\n")
            .unwrap();

        let config = load_config(None, Some(temp_dir.path())).unwrap();
        assert_eq!(config.debounce_ms, 42);
        assert_eq!(config.root, temp_dir.path());
    }

    #[test]
    fn test_explicit_config_keeps_its_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("custom.toml");
        std::fs::write(&file, "root = \"/srv/docs\"\n").unwrap();

        let config = load_config(Some(&file), None).unwrap();
        assert_eq!(config.root, Path::new("/srv/docs"));
    }

    #[test]
    fn test_defaults_without_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(None, Some(temp_dir.path())).unwrap();
        assert_eq!(config.debounce_ms, 500);
        assert!(config.root.is_absolute());
    }
}
