//! In-memory tracked-entry map with write-behind persistence

use super::{PersistOp, Result, TrackedEntry, TrackingPersistence};
use crate::path::{is_within, normalize, path_key};
use dashmap::DashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Tracked entries keyed by path key.
///
/// Reads and writes hit the map synchronously. Writes also enqueue a
/// [`PersistOp`] that a single worker applies in order; a failed op is
/// logged and dropped.
pub struct TrackingStore {
    entries: DashMap<String, TrackedEntry>,
    case_insensitive: bool,
    sender: Mutex<Option<mpsc::UnboundedSender<PersistOp>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TrackingStore {
    /// Load every persisted entry, then start the persistence worker
    pub async fn open(
        persistence: Arc<dyn TrackingPersistence>,
        case_insensitive: bool,
    ) -> Result<Self> {
        let entries = DashMap::new();
        for (key, entry) in persistence.load_all().await? {
            entries.insert(key, entry);
        }
        debug!("Tracking store opened with {} entries", entries.len());

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(persistence, rx));

        Ok(Self {
            entries,
            case_insensitive,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn key(&self, path: &Path) -> String {
        path_key(path, self.case_insensitive)
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.entries.contains_key(&self.key(path))
    }

    pub fn get(&self, path: &Path) -> Option<TrackedEntry> {
        self.entries.get(&self.key(path)).map(|e| e.value().clone())
    }

    /// Every entry strictly below `dir`
    pub fn get_all_in_directory(&self, dir: &Path) -> Vec<TrackedEntry> {
        let dir = normalize(dir);
        let dir_key = self.key(&dir);
        self.entries
            .iter()
            .filter(|e| e.key() != &dir_key && is_within(&e.value().path, &dir, self.case_insensitive))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Closest tracked directory that strictly contains `path`
    pub fn ancestor_directory(&self, path: &Path) -> Option<TrackedEntry> {
        let path = normalize(path);
        path.ancestors().skip(1).find_map(|ancestor| {
            self.entries
                .get(&self.key(ancestor))
                .filter(|e| e.is_directory)
                .map(|e| e.value().clone())
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every entry, sorted by path
    pub fn all(&self) -> Vec<TrackedEntry> {
        let mut all: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    /// Insert or replace the entry for `entry.path`
    pub fn upsert(&self, mut entry: TrackedEntry) {
        entry.path = normalize(&entry.path);
        let key = self.key(&entry.path);
        trace!("Upserting tracked entry {}", key);
        self.entries.insert(key.clone(), entry.clone());
        self.enqueue(PersistOp::Upsert { key, entry });
    }

    pub fn remove(&self, path: &Path) -> Option<TrackedEntry> {
        let key = self.key(path);
        let (key, removed) = self.entries.remove(&key)?;
        trace!("Removed tracked entry {}", key);
        self.enqueue(PersistOp::Remove { key });
        Some(removed)
    }

    /// Remove `dir` and everything tracked below it
    pub fn remove_all_in_directory(&self, dir: &Path) -> Vec<TrackedEntry> {
        let mut removed: Vec<TrackedEntry> = self
            .get_all_in_directory(dir)
            .into_iter()
            .filter_map(|e| self.remove(&e.path))
            .collect();
        removed.extend(self.remove(dir));
        removed
    }

    fn enqueue(&self, op: PersistOp) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => {
                if tx.send(op).is_err() {
                    warn!("Persistence worker is gone; dropping operation");
                }
            }
            None => debug!("Store is shut down; operation for {} not persisted", op.key()),
        }
    }

    /// Stop accepting operations and give the worker up to `timeout` to drain
    /// what is queued. The worker is aborted if it does not finish in time.
    pub async fn shutdown(&self, timeout: Duration) {
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut worker) = worker else {
            return;
        };

        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(Ok(())) => info!("Tracking store drained"),
            Ok(Err(e)) => warn!("Persistence worker ended abnormally: {}", e),
            Err(_) => {
                warn!("Persistence queue not drained within {:?}; aborting", timeout);
                worker.abort();
            }
        }
    }
}

async fn run_worker(
    persistence: Arc<dyn TrackingPersistence>,
    mut rx: mpsc::UnboundedReceiver<PersistOp>,
) {
    while let Some(op) = rx.recv().await {
        if let Err(e) = persistence.apply(&op).await {
            warn!("Failed to persist change for {}: {}", op.key(), e);
        }
    }
    debug!("Persistence worker stopped");
}
