//! Local file system backend

use super::{BoxedReader, FileMetadata, Result, StorageError, StorageProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::trace;
use walkdir::WalkDir;

/// [`StorageProvider`] over the local file system
#[derive(Debug, Default, Clone)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

fn to_metadata(path: PathBuf, meta: &Metadata) -> FileMetadata {
    FileMetadata {
        path,
        size: meta.len(),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
        is_dir: meta.is_dir(),
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn list_files(&self, dir: &Path, recursive: bool) -> Result<Vec<FileMetadata>> {
        let root = dir.to_path_buf();
        let max_depth = if recursive { usize::MAX } else { 1 };

        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry in WalkDir::new(&root).min_depth(1).max_depth(max_depth).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) if e.depth() == 0 => {
                        let source = e.into_io_error().unwrap_or_else(|| {
                            std::io::Error::other("directory walk failed")
                        });
                        return Err(StorageError::io(&root, source));
                    }
                    Err(e) => {
                        trace!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Ok(meta) = entry.metadata() {
                    files.push(to_metadata(entry.into_path(), &meta));
                }
            }
            Ok(files)
        })
        .await
        .map_err(|e| StorageError::Io { path: dir.to_path_buf(), source: std::io::Error::other(e) })?
    }

    async fn get_file(&self, path: &Path) -> Result<Option<FileMetadata>> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(Some(to_metadata(path.to_path_buf(), &meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    async fn open(&self, path: &Path) -> Result<BoxedReader> {
        let file = fs::File::open(path).await.map_err(|e| StorageError::io(path, e))?;
        Ok(Box::new(file))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(|e| StorageError::io(path, e))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(|e| StorageError::io(path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await.map_err(|e| StorageError::io(parent, e))?;
        }
        fs::rename(from, to).await.map_err(|e| StorageError::io(from, e))
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await.map_err(|e| StorageError::io(parent, e))?;
        }
        fs::copy(from, to).await.map_err(|e| StorageError::io(from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_list_files_recursive_and_flat() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(temp_dir.path().join("sub/b.txt"), "bb").unwrap();

        let storage = LocalStorage::new();

        let all = storage.list_files(temp_dir.path(), true).await.unwrap();
        let names: Vec<_> = all.iter().map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert!(all.iter().all(|f| !f.is_dir));

        let flat = storage.list_files(temp_dir.path(), false).await.unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].size, 1);
    }

    #[tokio::test]
    async fn test_list_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new();

        let result = storage.list_files(&temp_dir.path().join("nope"), true).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_file_and_exists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.md");
        let storage = LocalStorage::new();

        assert!(storage.get_file(&path).await.unwrap().is_none());
        assert!(!storage.exists(&path).await.unwrap());

        std::fs::write(&path, "hello").unwrap();
        let meta = storage.get_file(&path).await.unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert!(meta.modified.is_some());
        assert!(storage.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_open_copy_rename_delete() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.txt");
        let copied = temp_dir.path().join("nested/copy.txt");
        let moved = temp_dir.path().join("moved.txt");
        std::fs::write(&src, "content").unwrap();

        let storage = LocalStorage::new();
        assert_eq!(storage.read(&src).await.unwrap(), b"content");

        let mut reader = storage.open(&src).await.unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "content");

        assert_eq!(storage.copy(&src, &copied).await.unwrap(), 7);
        storage.rename(&copied, &moved).await.unwrap();
        assert!(!copied.exists());
        assert_eq!(std::fs::read_to_string(&moved).unwrap(), "content");

        storage.delete(&moved).await.unwrap();
        assert!(matches!(storage.delete(&moved).await, Err(StorageError::NotFound(_))));
    }
}
