//! Backup snapshots and content diffs
//!
//! Every tracked file has one backup artifact holding the bytes it had when it
//! was last diffed. A change is detected by comparing the current content's
//! hash to the stored one, and only then is the backup read and diffed.

pub mod diff;
pub mod pipeline;
pub mod store;

pub use diff::{BinaryDiffStrategy, DiffStrategy, TextDiffStrategy};
pub use pipeline::{BackupPipeline, TrackOutcome};
pub use store::BackupStore;

use crate::path::{path_key, relative_to, to_slash};
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup I/O on {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Not a regular file: {0:?}")]
    NotAFile(PathBuf),

    #[error("Invalid include pattern {pattern:?}: {source}")]
    InvalidPattern { pattern: String, source: globset::Error },
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// Kind of a single diff entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Inserted,
    Deleted,
    Modified,
    Unchanged,
}

/// A contiguous block of lines with the same kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub kind: DiffKind,
    /// Text before the change; absent for insertions
    pub original: Option<String>,
    /// Text after the change; absent for deletions
    pub modified: Option<String>,
    /// 1-based line in the backup where this block starts
    pub original_line: Option<usize>,
    /// 1-based line in the current file where this block starts
    pub modified_line: Option<usize>,
}

/// Outcome of comparing a file against its backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub is_changed: bool,
    /// True when there was no backup to compare against
    pub is_initial: bool,
    pub entries: Vec<DiffEntry>,
}

impl DiffResult {
    /// First snapshot of a file: a single insertion holding `content`
    /// (absent for binary files)
    pub fn initial(content: Option<String>) -> Self {
        Self {
            is_changed: true,
            is_initial: true,
            entries: vec![DiffEntry {
                kind: DiffKind::Inserted,
                original: None,
                modified: content,
                original_line: None,
                modified_line: Some(1),
            }],
        }
    }

    pub fn unchanged() -> Self {
        Self { is_changed: false, is_initial: false, entries: Vec::new() }
    }

    /// Entries that are not [`DiffKind::Unchanged`]
    pub fn changes(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.kind != DiffKind::Unchanged)
    }
}

/// Hex sha256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Name of the backup artifact for `path`: the hash of its path relative to
/// `root`, or of the full path when it lies outside the root.
pub fn backup_key(path: &Path, root: &Path, case_insensitive: bool) -> String {
    let identity = match relative_to(path, root, case_insensitive) {
        Some(relative) => {
            let relative = to_slash(&relative);
            if case_insensitive { relative.to_lowercase() } else { relative }
        }
        None => path_key(path, case_insensitive),
    };
    content_hash(identity.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_backup_key_relative_to_root() {
        let a = backup_key(Path::new("/one/docs/a.md"), Path::new("/one"), false);
        let b = backup_key(Path::new("/two/docs/a.md"), Path::new("/two"), false);
        assert_eq!(a, b);
        assert_eq!(a, content_hash(b"docs/a.md"));

        let outside = backup_key(Path::new("/else/a.md"), Path::new("/one"), false);
        assert_eq!(outside, content_hash(b"/else/a.md"));
    }

    #[test]
    fn test_backup_key_case_folding() {
        let upper = backup_key(Path::new("/r/Docs/A.md"), Path::new("/r"), true);
        let lower = backup_key(Path::new("/r/docs/a.md"), Path::new("/r"), true);
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_initial_diff_shape() {
        let diff = DiffResult::initial(Some("Hello, World!".to_string()));
        assert!(diff.is_initial);
        assert_eq!(diff.entries.len(), 1);
        assert_eq!(diff.entries[0].kind, DiffKind::Inserted);
        assert!(!DiffResult::unchanged().is_changed);
    }
}
