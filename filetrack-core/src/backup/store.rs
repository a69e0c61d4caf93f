//! Backup artifacts on disk, one file per backup key

use super::{BackupError, Result};
use crate::retry::{RetryPolicy, retry_with_backoff};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Directory of backup artifacts named by backup key
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    retry: RetryPolicy,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self { dir: dir.into(), retry }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.path_for(key)).await.unwrap_or(false)
    }

    /// Backup content, or `None` when there is no artifact for `key`
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BackupError::Io { path, source }),
        }
    }

    /// Replace the artifact for `key` with `content`. Written to a temp file
    /// first and renamed into place, so readers see the old or the new bytes.
    pub async fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.tmp"));

        let (dir, tmp_path, target_path) = (&self.dir, &tmp, &target);
        retry_with_backoff(&self.retry, "backup write", || async move {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(tmp_path, content).await?;
            tokio::fs::rename(tmp_path, target_path).await
        })
        .await
        .map_err(|source| BackupError::Io { path: target.clone(), source })?;

        trace!("Backup {} refreshed ({} bytes)", key, content.len());
        Ok(())
    }

    /// Remove the artifact for `key`; a missing artifact is not an error
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted backup {}", key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BackupError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = BackupStore::new(temp_dir.path().join("backups"), RetryPolicy::none());

        assert!(!store.exists("k").await);
        assert_eq!(store.read("k").await.unwrap(), None);

        store.write("k", b"v1").await.unwrap();
        store.write("k", b"v2").await.unwrap();
        assert!(store.exists("k").await);
        assert_eq!(store.read("k").await.unwrap().as_deref(), Some(&b"v2"[..]));
        assert!(!store.dir().join("k.tmp").exists());

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(!store.exists("k").await);
    }
}
