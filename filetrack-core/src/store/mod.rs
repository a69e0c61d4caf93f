//! Tracked-entry bookkeeping
//!
//! The in-memory map is authoritative for reads. Every mutation is also
//! queued as a [`PersistOp`] for a single background writer, so callers never
//! wait on disk.

pub mod persistence;
pub mod tracking_store;

pub use persistence::{JsonFilePersistence, MemoryPersistence};
pub use tracking_store::TrackingStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Tracking database I/O on {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Tracking database is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Persistence backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// One tracked file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntry {
    pub path: PathBuf,
    pub is_directory: bool,
    /// Name of the backup artifact under the backup directory
    pub backup_key: String,
    pub last_tracked_time: DateTime<Utc>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    /// sha256 of the content last written to the backup
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl TrackedEntry {
    pub fn new(path: impl Into<PathBuf>, is_directory: bool, backup_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory,
            backup_key: backup_key.into(),
            last_tracked_time: Utc::now(),
            size: None,
            modified: None,
            content_hash: None,
        }
    }
}

/// A mutation to replay against the persistent copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOp {
    Upsert { key: String, entry: TrackedEntry },
    Remove { key: String },
}

impl PersistOp {
    pub fn key(&self) -> &str {
        match self {
            PersistOp::Upsert { key, .. } | PersistOp::Remove { key } => key,
        }
    }
}

/// Durable home for tracked entries
#[async_trait]
pub trait TrackingPersistence: Send + Sync {
    /// Every persisted entry, keyed by path key
    async fn load_all(&self) -> Result<Vec<(String, TrackedEntry)>>;

    async fn apply(&self, op: &PersistOp) -> Result<()>;
}
