//! The tracking orchestrator
//!
//! [`FileTracker`] turns a raw stream of [`FileChange`](crate::monitor::FileChange)s
//! into [`ContentChanged`] notifications: events are filtered by the ignore
//! rules and tracked-directory membership, debounced per path, then diffed
//! against each file's backup.

pub mod tracker;

pub use tracker::FileTracker;

use crate::backup::DiffResult;
use std::path::PathBuf;

/// Raised when a tracked file's content changed, or a newly discovered file
/// got its first backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChanged {
    pub path: PathBuf,
    pub diff: DiffResult,
}
