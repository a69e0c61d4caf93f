//! Filesystem monitoring and event coalescing
//!
//! This module provides the event side of the tracker:
//! - Raw change events from the OS watcher
//! - Per-key debouncing to collapse bursts of writes
//! - Text/binary classification used to pick a diff strategy

pub mod classifier;
pub mod debouncer;
pub mod watcher;

pub use classifier::{FileClassifier, FileKind};
pub use debouncer::Debouncer;
pub use watcher::{FileWatcher, WatchHandle};

use std::path::PathBuf;
use std::time::SystemTime;

/// A raw filesystem change, as delivered by a watcher. No ordering or
/// deduplication is assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub change_type: ChangeType,
    /// Previous location for renames
    pub old_path: Option<PathBuf>,
    pub timestamp: SystemTime,
}

impl FileChange {
    pub fn new(change_type: ChangeType, path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), change_type, old_path: None, timestamp: SystemTime::now() }
    }

    pub fn renamed(old_path: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Renamed,
            old_path: Some(old_path.into()),
            timestamp: SystemTime::now(),
        }
    }
}

/// Types of filesystem changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Renamed,
}
