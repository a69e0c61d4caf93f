//! OS file system watcher built on the notify crate
//!
//! Translates notify events into [`FileChange`]s and forwards them unfiltered;
//! filtering and debouncing happen downstream in the tracker.

use crate::monitor::{ChangeType, FileChange};
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Keeps the underlying OS watch alive; dropping it stops the event stream
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    paths: Vec<PathBuf>,
}

impl WatchHandle {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Recursive file system watcher over a set of paths
pub struct FileWatcher {
    paths: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Start watching. Events arrive on the returned receiver for as long as
    /// the handle is alive.
    pub fn start(self) -> Result<(WatchHandle, mpsc::UnboundedReceiver<FileChange>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in translate_event(event) {
                    if tx.send(change).is_err() {
                        debug!("Change receiver dropped; discarding event");
                        return;
                    }
                }
            }
            Err(e) => error!("Watch error: {:?}", e),
        })
        .context("Failed to create file watcher")?;

        for path in &self.paths {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {:?}", path))?;
            info!("Watching path: {:?}", path);
        }

        Ok((WatchHandle { _watcher: watcher, paths: self.paths }, rx))
    }
}

/// Map one notify event onto zero or more changes
pub fn translate_event(event: Event) -> Vec<FileChange> {
    let mut paths = event.paths.into_iter();

    match event.kind {
        EventKind::Create(_) => paths.map(|p| FileChange::new(ChangeType::Created, p)).collect(),
        EventKind::Remove(_) => paths.map(|p| FileChange::new(ChangeType::Deleted, p)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![FileChange::renamed(from, to)],
                (Some(only), None) => vec![FileChange::new(ChangeType::Modified, only)],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.map(|p| FileChange::new(ChangeType::Deleted, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(|p| FileChange::new(ChangeType::Created, p)).collect()
        }
        EventKind::Modify(_) => paths.map(|p| FileChange::new(ChangeType::Modified, p)).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use tempfile::TempDir;
    use tokio::time::{Duration, timeout};

    #[test]
    fn test_translate_basic_kinds() {
        let created = translate_event(
            Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/a.txt")),
        );
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].change_type, ChangeType::Created);

        let modified = translate_event(
            Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
                .add_path(PathBuf::from("/a.txt")),
        );
        assert_eq!(modified[0].change_type, ChangeType::Modified);

        let removed = translate_event(
            Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("/a.txt")),
        );
        assert_eq!(removed[0].change_type, ChangeType::Deleted);
    }

    #[test]
    fn test_translate_rename_both() {
        let changes = translate_event(
            Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
                .add_path(PathBuf::from("/old.txt"))
                .add_path(PathBuf::from("/new.txt")),
        );

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Renamed);
        assert_eq!(changes[0].old_path, Some(PathBuf::from("/old.txt")));
        assert_eq!(changes[0].path, PathBuf::from("/new.txt"));
    }

    #[test]
    fn test_access_events_dropped() {
        let changes = translate_event(Event::new(EventKind::Any).add_path(PathBuf::from("/a")));
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_file_watcher_detects_changes() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("test.md");

        let watcher = FileWatcher::new(vec![temp_dir.path().to_path_buf()]);
        let (_handle, mut rx) = watcher.start().unwrap();

        std::fs::write(&test_file, "test content").unwrap();

        // Backends differ in which kinds they report; any event for the file will do
        let received = timeout(Duration::from_secs(5), async {
            while let Some(change) = rx.recv().await {
                if change.path.file_name() == test_file.file_name() {
                    return Some(change);
                }
            }
            None
        })
        .await;

        if let Ok(Some(change)) = received {
            assert!(matches!(change.change_type, ChangeType::Created | ChangeType::Modified));
        }
    }
}
