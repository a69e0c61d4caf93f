//! Persistence backends for the tracking store

use super::{PersistOp, PersistenceError, Result, TrackedEntry, TrackingPersistence};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Stores the whole entry map as pretty-printed JSON, rewritten atomically
/// after every applied operation
pub struct JsonFilePersistence {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<String, TrackedEntry>>>,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cache: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, TrackedEntry>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(PersistenceError::Io { path: self.path.clone(), source }),
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, TrackedEntry>) -> Result<()> {
        let io_err = |source| PersistenceError::Io { path: self.path.clone(), source };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl TrackingPersistence for JsonFilePersistence {
    async fn load_all(&self) -> Result<Vec<(String, TrackedEntry)>> {
        let map = self.read_map().await?;
        info!("Loaded {} tracked entries from {:?}", map.len(), self.path);
        let entries = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        *self.cache.lock().await = Some(map);
        Ok(entries)
    }

    async fn apply(&self, op: &PersistOp) -> Result<()> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_map().await?);
        }
        let Some(map) = cache.as_mut() else {
            return Err(PersistenceError::Unavailable("cache not loaded".to_string()));
        };

        match op {
            PersistOp::Upsert { key, entry } => {
                map.insert(key.clone(), entry.clone());
            }
            PersistOp::Remove { key } => {
                if map.remove(key).is_none() {
                    debug!("Remove for unknown key {}", key);
                    return Ok(());
                }
            }
        }

        self.write_map(map).await
    }
}

/// Keeps entries in memory and records every applied operation
#[derive(Default)]
pub struct MemoryPersistence {
    entries: StdMutex<BTreeMap<String, TrackedEntry>>,
    ops: StdMutex<Vec<PersistOp>>,
    failing: StdMutex<bool>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate as if a previous session had written these entries
    pub fn with_entries(entries: impl IntoIterator<Item = (String, TrackedEntry)>) -> Self {
        let persistence = Self::default();
        persistence.entries.lock().unwrap_or_else(PoisonError::into_inner).extend(entries);
        persistence
    }

    /// Make subsequent `apply` calls fail
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }

    pub fn ops(&self) -> Vec<PersistOp> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn entries(&self) -> BTreeMap<String, TrackedEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TrackingPersistence for MemoryPersistence {
    async fn load_all(&self) -> Result<Vec<(String, TrackedEntry)>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    async fn apply(&self, op: &PersistOp) -> Result<()> {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(PersistenceError::Unavailable("memory backend set to fail".to_string()));
        }

        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            match op {
                PersistOp::Upsert { key, entry } => {
                    entries.insert(key.clone(), entry.clone());
                }
                PersistOp::Remove { key } => {
                    entries.remove(key);
                }
            }
        }
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).push(op.clone());
        Ok(())
    }
}
