//! File tracker orchestrator

use super::ContentChanged;
use crate::backup::{BackupPipeline, DiffResult, TrackOutcome};
use crate::config::TrackerConfig;
use crate::monitor::{ChangeType, Debouncer, FileChange, FileWatcher, WatchHandle};
use crate::path::{is_within, normalize};
use crate::rules::IgnoreEngine;
use crate::storage::StorageProvider;
use crate::store::{TrackedEntry, TrackingPersistence, TrackingStore};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

/// Buffered notifications per subscriber before it starts lagging
const NOTIFICATION_CAPACITY: usize = 1024;

/// Tracks files and directories below a root and reports content changes.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct FileTracker {
    inner: Arc<Inner>,
}

struct Inner {
    config: TrackerConfig,
    root: PathBuf,
    data_dir: PathBuf,
    storage: Arc<dyn StorageProvider>,
    engine: Arc<IgnoreEngine>,
    store: Arc<TrackingStore>,
    pipeline: BackupPipeline,
    changes: Debouncer<String, FileChange>,
    reloads: Debouncer<(), ()>,
    notifier: broadcast::Sender<ContentChanged>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl FileTracker {
    /// Load the ignore rules and persisted entries for `config.root`
    pub async fn new(
        config: TrackerConfig,
        storage: Arc<dyn StorageProvider>,
        persistence: Arc<dyn TrackingPersistence>,
    ) -> Result<Self> {
        let root = normalize(&config.root);

        let engine = Arc::new(IgnoreEngine::new(
            &root,
            config.rule_file_name.clone(),
            config.case_insensitive,
            config.retry.clone(),
        ));
        let loader = engine.clone();
        tokio::task::spawn_blocking(move || loader.load())
            .await
            .context("Failed to load ignore rules")?;

        let store = Arc::new(
            TrackingStore::open(persistence, config.case_insensitive)
                .await
                .context("Failed to open tracking store")?,
        );
        let pipeline = BackupPipeline::new(&config, storage.clone(), store.clone(), engine.clone())
            .context("Invalid tracker configuration")?;
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        info!("File tracker ready at {:?} ({} tracked entries)", root, store.len());

        Ok(Self {
            inner: Arc::new(Inner {
                data_dir: normalize(&config.data_dir()),
                root,
                storage,
                engine,
                store,
                pipeline,
                changes: Debouncer::new(config.debounce_delay()),
                reloads: Debouncer::new(config.rule_reload_delay()),
                notifier,
                tasks: TaskTracker::new(),
                cancel: CancellationToken::new(),
                config,
            }),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn engine(&self) -> &Arc<IgnoreEngine> {
        &self.inner.engine
    }

    pub fn store(&self) -> &Arc<TrackingStore> {
        &self.inner.store
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.inner.store.is_tracked(path)
    }

    /// Receive a [`ContentChanged`] for every detected change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ContentChanged> {
        self.inner.notifier.subscribe()
    }

    fn is_internal(&self, path: &Path) -> bool {
        is_within(path, &self.inner.data_dir, self.inner.config.case_insensitive)
    }

    /// Start tracking a file, or a directory and every trackable file in it.
    ///
    /// Returns `false` when the path does not exist, is ignored, is already
    /// tracked, or is a directory inside one that is tracked. Enabling a
    /// directory absorbs tracked directories below it. Backups taken here are
    /// baselines and raise no notification.
    pub async fn enable(&self, path: &Path) -> Result<bool> {
        let path = normalize(path);
        let meta = self
            .inner
            .storage
            .get_file(&path)
            .await
            .with_context(|| format!("Failed to stat {:?}", path))?;

        let Some(meta) = meta else {
            debug!("Cannot track missing path {:?}", path);
            return Ok(false);
        };
        if self.is_internal(&path) || self.inner.engine.is_ignored(&path) {
            debug!("Refusing to track ignored path {:?}", path);
            return Ok(false);
        }
        if self.inner.store.is_tracked(&path) {
            return Ok(false);
        }

        if meta.is_dir {
            if let Some(ancestor) = self.inner.store.ancestor_directory(&path) {
                debug!("{:?} is already covered by {:?}", path, ancestor.path);
                return Ok(false);
            }
        }

        let key = self.inner.pipeline.backup_key(&path);
        if meta.is_dir {
            for nested in self.inner.store.get_all_in_directory(&path) {
                if nested.is_directory {
                    debug!("Absorbing tracked directory {:?}", nested.path);
                    self.inner.store.remove(&nested.path);
                }
            }
            self.inner.store.upsert(TrackedEntry::new(&path, true, key));
            let processed = self.scan_directory(&path, false).await?;
            info!("Tracking directory {:?} ({} files)", path, processed);
        } else {
            self.inner.store.upsert(TrackedEntry::new(&path, false, key));
            if let Err(e) = self.track_file(&path, false).await {
                self.inner.store.remove(&path);
                return Err(e);
            }
            info!("Tracking file {:?}", path);
        }

        Ok(true)
    }

    /// Stop tracking `path` and everything tracked below it, deleting their
    /// backups. Returns `false` if it was not tracked.
    pub async fn disable(&self, path: &Path) -> Result<bool> {
        let path = normalize(path);
        if !self.inner.store.is_tracked(&path) {
            return Ok(false);
        }

        let removed = self.forget(&path).await;
        info!("Stopped tracking {:?} ({} entries removed)", path, removed);
        Ok(true)
    }

    /// Feed one raw change. Never blocks: relevant events are handed to the
    /// per-path debouncer and processed once the path goes quiet.
    pub fn handle_event(&self, change: FileChange) {
        if self.inner.cancel.is_cancelled() {
            return;
        }

        if change.change_type == ChangeType::Renamed {
            if let Some(old_path) = change.old_path {
                self.handle_event(FileChange::new(ChangeType::Deleted, old_path));
            }
            self.handle_event(FileChange::new(ChangeType::Created, change.path));
            return;
        }

        let path = normalize(&change.path);
        if self.inner.engine.is_rule_file(&path) {
            debug!("Rule file {:?} changed, scheduling reload", path);
            self.schedule_rule_reload();
            return;
        }
        if self.is_internal(&path) {
            return;
        }

        let store = &self.inner.store;
        let relevant = store.is_tracked(&path)
            || (store.ancestor_directory(&path).is_some() && !self.inner.engine.is_ignored(&path));
        if !relevant {
            trace!("Dropping event for untracked path {:?}", path);
            return;
        }

        let key = store.key(&path);
        let tracker = self.clone();
        self.inner.changes.debounce(key, FileChange { path, ..change }, move |change| async move {
            tracker.process_change(change).await
        });
    }

    async fn process_change(&self, change: FileChange) -> Result<()> {
        let path = change.path;
        let meta = self
            .inner
            .storage
            .get_file(&path)
            .await
            .with_context(|| format!("Failed to stat {:?}", path))?;

        let Some(meta) = meta else {
            let removed = self.forget(&path).await;
            if removed > 0 {
                info!("{:?} is gone; removed {} tracked entries", path, removed);
            }
            return Ok(());
        };

        if meta.is_dir {
            if change.change_type == ChangeType::Created && !self.inner.engine.is_ignored(&path) {
                let processed = self.scan_directory(&path, true).await?;
                debug!("Scanned new directory {:?} ({} files)", path, processed);
            }
            return Ok(());
        }

        if !self.inner.pipeline.should_track(&path) {
            if self.inner.store.is_tracked(&path) {
                debug!("{:?} is no longer trackable", path);
                self.forget(&path).await;
            }
            return Ok(());
        }

        if !self.inner.pipeline.has_changed(&path).await? {
            trace!("No content change for {:?}", path);
            return Ok(());
        }

        self.track_file(&path, true).await?;
        Ok(())
    }

    /// Back up and diff one file, notifying subscribers when `notify` is set
    /// and the content changed
    async fn track_file(&self, path: &Path, notify: bool) -> Result<Option<DiffResult>> {
        let notifier = &self.inner.notifier;
        let outcome = self
            .inner
            .pipeline
            .track_and_diff_with(path, |diff| {
                if notify && (diff.is_changed || diff.is_initial) {
                    let event = ContentChanged { path: path.to_path_buf(), diff: diff.clone() };
                    if notifier.send(event).is_err() {
                        trace!("No subscribers for change on {:?}", path);
                    }
                }
            })
            .await
            .with_context(|| format!("Failed to back up {:?}", path))?;

        match outcome {
            TrackOutcome::Diffed(diff) => Ok(Some(diff)),
            TrackOutcome::Missing => {
                self.forget(path).await;
                Ok(None)
            }
        }
    }

    /// Track every trackable file below `dir`. Already tracked files are only
    /// re-diffed when they changed.
    async fn scan_directory(&self, dir: &Path, notify: bool) -> Result<usize> {
        let files = self
            .inner
            .storage
            .list_files(dir, true)
            .await
            .with_context(|| format!("Failed to list {:?}", dir))?;

        let mut processed = 0;
        for file in files {
            if self.inner.cancel.is_cancelled() {
                break;
            }
            if !self.inner.pipeline.should_track(&file.path) {
                continue;
            }
            if self.inner.store.is_tracked(&file.path)
                && !self.inner.pipeline.has_changed(&file.path).await.unwrap_or(true)
            {
                continue;
            }

            match self.track_file(&file.path, notify).await {
                Ok(Some(_)) => processed += 1,
                Ok(None) => {}
                Err(e) => warn!("{:#}", e),
            }
        }

        Ok(processed)
    }

    /// Remove `path` and its descendants from the store and delete their
    /// backups. Returns the number of entries removed.
    async fn forget(&self, path: &Path) -> usize {
        let store = &self.inner.store;
        let mut doomed = store.get_all_in_directory(path);
        doomed.extend(store.get(path));

        for entry in doomed.iter().filter(|e| !e.is_directory) {
            if let Err(e) = self.inner.pipeline.delete_backup(&entry.path).await {
                warn!("Failed to delete backup for {:?}: {}", entry.path, e);
            }
        }

        store.remove_all_in_directory(path).len()
    }

    fn schedule_rule_reload(&self) {
        let tracker = self.clone();
        self.inner.reloads.debounce((), (), move |()| async move {
            tracker.reload_rules().await.map(|_| ())
        });
    }

    /// Recompile every rule file, stop tracking entries that are now ignored
    /// and pick up files that became trackable. Returns the rule count.
    pub async fn reload_rules(&self) -> Result<usize> {
        let engine = self.inner.engine.clone();
        let count = tokio::task::spawn_blocking(move || engine.load())
            .await
            .context("Rule reload task failed")?;

        let mut pruned = 0;
        for entry in self.inner.store.all() {
            // may already be gone as a descendant of a pruned directory
            if !self.inner.store.is_tracked(&entry.path) {
                continue;
            }
            if self.inner.engine.is_ignored(&entry.path) {
                pruned += self.forget(&entry.path).await;
            }
        }

        for dir in self.inner.store.all().into_iter().filter(|e| e.is_directory) {
            if let Err(e) = self.scan_directory(&dir.path, true).await {
                warn!("Rescan of {:?} after rule reload failed: {:#}", dir.path, e);
            }
        }

        info!("Ignore rules reloaded ({} rules, {} entries pruned)", count, pruned);
        Ok(count)
    }

    /// Bring every tracked entry up to date with the file system right now,
    /// without waiting for events. Returns the number of entries checked.
    pub async fn sync(&self) -> Result<usize> {
        let entries = self.inner.store.all();
        let total = entries.len();

        for entry in entries {
            if !self.inner.store.is_tracked(&entry.path) {
                continue;
            }
            let change_type = if entry.is_directory { ChangeType::Created } else { ChangeType::Modified };
            if let Err(e) = self.process_change(FileChange::new(change_type, entry.path)).await {
                warn!("{:#}", e);
            }
        }

        Ok(total)
    }

    /// Consume changes from `events` until it closes or the tracker shuts down
    pub fn start(&self, mut events: mpsc::UnboundedReceiver<FileChange>) {
        let tracker = self.clone();
        let cancel = self.inner.cancel.clone();

        self.inner.tasks.spawn(async move {
            info!("File tracker event loop started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = events.recv() => match change {
                        Some(change) => tracker.handle_event(change),
                        None => {
                            debug!("Event source closed");
                            break;
                        }
                    },
                }
            }
            info!("File tracker event loop stopped");
        });
    }

    /// Watch the root with the OS watcher and start the event loop. Events
    /// stop when the returned handle is dropped.
    pub fn watch(&self) -> Result<WatchHandle> {
        let (handle, events) = FileWatcher::new(vec![self.inner.root.clone()])
            .start()
            .context("Failed to start file watcher")?;
        self.start(events);
        Ok(handle)
    }

    /// Wait until every pending debounce window has fired and its processing
    /// has finished
    pub async fn settle(&self) {
        self.inner.reloads.wait().await;
        self.inner.changes.wait().await;
    }

    /// Stop the event loop, drop pending events, finish in-flight work and
    /// drain the persistence queue
    pub async fn shutdown(&self) {
        info!("Shutting down file tracker");
        let timeout = self.inner.config.shutdown_timeout();

        self.inner.cancel.cancel();
        self.inner.changes.dispose();
        self.inner.reloads.dispose();
        self.inner.tasks.close();

        let drained = tokio::time::timeout(timeout, async {
            self.inner.tasks.wait().await;
            self.inner.reloads.wait().await;
            self.inner.changes.wait().await;
        })
        .await;
        if drained.is_err() {
            error!("In-flight tracking work did not finish within {:?}", timeout);
        }

        self.inner.store.shutdown(timeout).await;
    }
}
