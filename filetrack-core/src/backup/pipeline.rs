//! Hash-gated backup and diff of tracked files

use super::{
    BackupError, BackupStore, BinaryDiffStrategy, DiffResult, DiffStrategy, Result,
    TextDiffStrategy, backup_key, content_hash,
};
use crate::config::TrackerConfig;
use crate::monitor::{FileClassifier, FileKind};
use crate::path::{is_within, normalize, path_key, relative_to, to_slash};
use crate::rules::IgnoreEngine;
use crate::storage::StorageProvider;
use crate::store::{TrackedEntry, TrackingStore};
use chrono::Utc;
use dashmap::DashMap;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Result of [`BackupPipeline::track_and_diff`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The file no longer exists
    Missing,
    Diffed(DiffResult),
}

/// Takes backups of tracked files and diffs new content against them.
///
/// All work for one path runs under that path's lock, so refreshes of the
/// same file never interleave.
pub struct BackupPipeline {
    root: PathBuf,
    data_dir: PathBuf,
    case_insensitive: bool,
    storage: Arc<dyn StorageProvider>,
    store: Arc<TrackingStore>,
    engine: Arc<IgnoreEngine>,
    backups: BackupStore,
    classifier: FileClassifier,
    text: TextDiffStrategy,
    binary: BinaryDiffStrategy,
    include: Option<GlobSet>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BackupPipeline {
    pub fn new(
        config: &TrackerConfig,
        storage: Arc<dyn StorageProvider>,
        store: Arc<TrackingStore>,
        engine: Arc<IgnoreEngine>,
    ) -> Result<Self> {
        Ok(Self {
            root: normalize(&config.root),
            data_dir: normalize(&config.data_dir()),
            case_insensitive: config.case_insensitive,
            storage,
            store,
            engine,
            backups: BackupStore::new(config.backup_dir(), config.retry.clone()),
            classifier: FileClassifier::new(),
            text: TextDiffStrategy::new(config.diff_view),
            binary: BinaryDiffStrategy,
            include: build_include_set(&config.include_patterns, config.case_insensitive)?,
            locks: DashMap::new(),
        })
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn backup_key(&self, path: &Path) -> String {
        backup_key(path, &self.root, self.case_insensitive)
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks.entry(path_key(path, self.case_insensitive)).or_default().clone()
    }

    /// True if `path` should be tracked: not ignored, not hidden, not part of
    /// the tracker's own data, and either tracked itself or below a tracked
    /// directory whose include allowlist it passes.
    pub fn should_track(&self, path: &Path) -> bool {
        let path = normalize(path);
        if is_within(&path, &self.data_dir, self.case_insensitive) {
            return false;
        }
        if self.engine.is_ignored(&path) {
            trace!("Not tracking ignored path {:?}", path);
            return false;
        }

        if let Some(entry) = self.store.get(&path) {
            return !entry.is_directory;
        }

        let Some(dir) = self.store.ancestor_directory(&path) else {
            return false;
        };
        match (&self.include, relative_to(&path, &dir.path, self.case_insensitive)) {
            (None, _) => true,
            (Some(include), Some(relative)) => include.is_match(to_slash(&relative)),
            (Some(_), None) => false,
        }
    }

    /// Cheap change check: metadata first, then the content hash. When only
    /// the metadata moved, the stored metadata is refreshed.
    pub async fn has_changed(&self, path: &Path) -> Result<bool> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        let Some(entry) = self.store.get(path) else {
            return Ok(true);
        };
        let Some(stored_hash) = entry.content_hash.clone() else {
            return Ok(true);
        };
        if !self.backups.exists(&entry.backup_key).await {
            return Ok(true);
        }
        let Some(meta) = self.storage.get_file(path).await? else {
            return Ok(true);
        };

        if Some(meta.size) == entry.size && meta.modified == entry.modified {
            return Ok(false);
        }

        let content = match self.storage.read(path).await {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        if content_hash(&content) != stored_hash {
            return Ok(true);
        }

        debug!("Metadata changed but content did not for {:?}", path);
        self.store.upsert(TrackedEntry { size: Some(meta.size), modified: meta.modified, ..entry });
        Ok(false)
    }

    /// Diff the current content against the backup and refresh the backup
    pub async fn track_and_diff(&self, path: &Path) -> Result<TrackOutcome> {
        self.track_and_diff_with(path, |_| {}).await
    }

    /// Like [`track_and_diff`](Self::track_and_diff), calling `on_diff` with
    /// the result before the path's lock is released
    pub async fn track_and_diff_with<F>(&self, path: &Path, on_diff: F) -> Result<TrackOutcome>
    where
        F: FnOnce(&DiffResult),
    {
        let path = normalize(path);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        let Some(meta) = self.storage.get_file(&path).await? else {
            return Ok(TrackOutcome::Missing);
        };
        if meta.is_dir {
            return Err(BackupError::NotAFile(path));
        }
        let content = match self.storage.read(&path).await {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Ok(TrackOutcome::Missing),
            Err(e) => return Err(e.into()),
        };
        let hash = content_hash(&content);

        let entry = self
            .store
            .get(&path)
            .unwrap_or_else(|| TrackedEntry::new(&path, false, self.backup_key(&path)));
        let kind = self.classifier.classify(&path, &content);

        let previous = match &entry.content_hash {
            Some(stored) if *stored == hash => None,
            Some(_) => self.backups.read(&entry.backup_key).await?,
            None => None,
        };

        let diff = match (&entry.content_hash, previous) {
            (Some(stored), _) if *stored == hash => DiffResult::unchanged(),
            (Some(_), Some(original)) => match kind {
                FileKind::Text => self.text.diff(&original, &content),
                FileKind::Binary => self.binary.diff(&original, &content),
            },
            _ => DiffResult::initial(match kind {
                FileKind::Text => Some(String::from_utf8_lossy(&content).into_owned()),
                FileKind::Binary => None,
            }),
        };

        if entry.content_hash.as_deref() != Some(hash.as_str()) {
            self.backups.write(&entry.backup_key, &content).await?;
            self.store.upsert(TrackedEntry {
                last_tracked_time: Utc::now(),
                size: Some(meta.size),
                modified: meta.modified,
                content_hash: Some(hash),
                ..entry
            });
            debug!("Backup refreshed for {:?} (initial: {})", path, diff.is_initial);
        } else if entry.size != Some(meta.size) || entry.modified != meta.modified {
            self.store.upsert(TrackedEntry { size: Some(meta.size), modified: meta.modified, ..entry });
        }

        on_diff(&diff);
        Ok(TrackOutcome::Diffed(diff))
    }

    /// Delete the backup for `path`, if any, and forget its lock unless
    /// another caller is holding or waiting on it
    pub async fn delete_backup(&self, path: &Path) -> Result<()> {
        let path = normalize(path);
        let key = self
            .store
            .get(&path)
            .map(|e| e.backup_key)
            .unwrap_or_else(|| self.backup_key(&path));

        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        self.backups.delete(&key).await?;

        // Only the map and this call hold the lock; anyone else still needs it
        self.locks.remove_if(&path_key(&path, self.case_insensitive), |_, held| {
            Arc::strong_count(held) <= 2
        });
        Ok(())
    }
}

fn build_include_set(patterns: &[String], case_insensitive: bool) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = if pattern.contains('/') { pattern.clone() } else { format!("**/{pattern}") };
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|source| BackupError::InvalidPattern { pattern: pattern.clone(), source })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|source| BackupError::InvalidPattern { pattern: patterns.join(", "), source })
}
