//! Storage provider abstraction
//!
//! All file I/O the tracker performs on watched content goes through a
//! [`StorageProvider`], so the pipeline never touches `std::fs` directly.

pub mod local;

pub use local::LocalStorage;

use crate::config::{StorageBackend, TrackerConfig};
use crate::retry::Transient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Path not found: {0:?}")]
    NotFound(PathBuf),

    #[error("I/O error on {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path.to_path_buf())
        } else {
            StorageError::Io { path: path.to_path_buf(), source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            StorageError::NotFound(_) => false,
            StorageError::Io { source, .. } => source.is_transient(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata snapshot for a single file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// File operations needed by the tracker
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Files below `dir`; directories themselves are not listed
    async fn list_files(&self, dir: &Path, recursive: bool) -> Result<Vec<FileMetadata>>;

    /// Metadata for `path`, or `None` when it does not exist
    async fn get_file(&self, path: &Path) -> Result<Option<FileMetadata>>;

    async fn open(&self, path: &Path) -> Result<BoxedReader>;

    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    async fn delete(&self, path: &Path) -> Result<()>;

    /// Move `from` to `to`, replacing `to` if present
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn copy(&self, from: &Path, to: &Path) -> Result<u64>;

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.get_file(path).await?.is_some())
    }
}

/// Build the provider selected in the config
pub fn build(config: &TrackerConfig) -> Arc<dyn StorageProvider> {
    match config.storage {
        StorageBackend::Local => Arc::new(LocalStorage::new()),
    }
}
