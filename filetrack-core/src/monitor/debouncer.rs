//! Per-key debouncing of rapid events
//!
//! Each key owns at most one pending window. A new event for the key replaces
//! the stored value and restarts the delay; the superseded window is cancelled
//! without running. When a window expires, its action runs once with the
//! latest value.

use dashmap::DashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

struct Window<V> {
    latest: V,
    generation: u64,
    cancel: CancellationToken,
}

/// Debouncer for keyed events
pub struct Debouncer<K, V> {
    delay: Duration,
    windows: Arc<DashMap<K, Window<V>>>,
    generation: AtomicU64,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a new debouncer with a fixed delay
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            windows: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record `value` as the latest payload for `key` and (re)start its delay.
    ///
    /// `action` runs with whatever value is current for the key when the
    /// delay elapses. Errors from it are logged. Must be called from within a
    /// tokio runtime.
    pub fn debounce<F, Fut>(&self, key: K, value: V, action: F)
    where
        F: FnOnce(V) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            trace!("Debouncer disposed, dropping event for {:?}", key);
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();

        let previous = self.windows.insert(
            key.clone(),
            Window { latest: value, generation, cancel: cancel.clone() },
        );
        if let Some(previous) = previous {
            trace!("Restarting debounce window for {:?}", key);
            previous.cancel.cancel();
        }

        let windows = self.windows.clone();
        let delay = self.delay;

        self.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }

            // A newer window for the key owns the slot; ours is stale
            let Some((_, window)) = windows.remove_if(&key, |_, w| w.generation == generation)
            else {
                return;
            };
            if window.cancel.is_cancelled() {
                return;
            }

            debug!("Debounce window for {:?} expired", key);
            if let Err(e) = action(window.latest).await {
                warn!("Debounced action for {:?} failed: {:#}", key, e);
            }
        });
    }

    /// Number of windows currently waiting to fire
    pub fn pending_count(&self) -> usize {
        self.windows.len()
    }

    /// Cancel every pending window; none of their actions will run. Later
    /// calls to [`debounce`](Self::debounce) are ignored.
    pub fn dispose(&self) {
        self.shutdown.cancel();
        self.windows.clear();
        self.tasks.close();
    }

    /// Wait for spawned windows, including actions already running, to finish
    pub async fn wait(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        if !self.shutdown.is_cancelled() {
            self.tasks.reopen();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Fired = Arc<Mutex<Vec<(String, u32)>>>;

    fn recorder() -> Fired {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn record(
        sink: Fired,
        key: &str,
    ) -> impl FnOnce(u32) -> std::future::Ready<anyhow::Result<()>> + Send + 'static {
        let key = key.to_string();
        move |value| {
            sink.lock().unwrap().push((key, value));
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_debouncer_aggregates_rapid_changes() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let fired = recorder();

        // Send multiple rapid changes
        for i in 1..=5 {
            debouncer.debounce("test.rs".to_string(), i, record(fired.clone(), "test.rs"));
            sleep(Duration::from_millis(10)).await;
        }

        // Wait for debounce delay
        sleep(Duration::from_millis(250)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.as_slice(), &[("test.rs".to_string(), 5)]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_debouncer_separate_keys() {
        let debouncer = Debouncer::new(Duration::from_millis(200));
        let fired = recorder();

        debouncer.debounce("file1.rs".to_string(), 1, record(fired.clone(), "file1.rs"));
        debouncer.debounce("file2.rs".to_string(), 2, record(fired.clone(), "file2.rs"));
        // restarting file2 must not delay file1
        sleep(Duration::from_millis(120)).await;
        debouncer.debounce("file2.rs".to_string(), 3, record(fired.clone(), "file2.rs"));

        sleep(Duration::from_millis(140)).await;
        {
            let fired = fired.lock().unwrap();
            assert_eq!(fired.as_slice(), &[("file1.rs".to_string(), 1)]);
        }

        sleep(Duration::from_millis(250)).await;
        let mut fired = fired.lock().unwrap().clone();
        fired.sort();
        assert_eq!(fired, vec![("file1.rs".to_string(), 1), ("file2.rs".to_string(), 3)]);
    }

    #[tokio::test]
    async fn test_dispose_cancels_pending_windows() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let fired = recorder();

        debouncer.debounce("a".to_string(), 1, record(fired.clone(), "a"));
        debouncer.debounce("b".to_string(), 2, record(fired.clone(), "b"));
        assert_eq!(debouncer.pending_count(), 2);

        debouncer.dispose();
        debouncer.debounce("c".to_string(), 3, record(fired.clone(), "c"));

        sleep(Duration::from_millis(150)).await;
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_action_does_not_stop_other_keys() {
        let debouncer = Debouncer::new(Duration::from_millis(30));
        let fired = recorder();

        debouncer.debounce("bad".to_string(), 0, |_| async { Err(anyhow::anyhow!("boom")) });
        debouncer.debounce("good".to_string(), 7, record(fired.clone(), "good"));

        sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.lock().unwrap().as_slice(), &[("good".to_string(), 7)]);

        // still usable afterwards
        debouncer.debounce("bad".to_string(), 8, record(fired.clone(), "bad"));
        sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_returns_after_actions_complete() {
        let debouncer = Debouncer::new(Duration::from_millis(20));
        let fired = recorder();

        debouncer.debounce("k".to_string(), 1, record(fired.clone(), "k"));
        debouncer.wait().await;
        assert_eq!(fired.lock().unwrap().len(), 1);

        // the tracker is reopened, so new windows keep working
        debouncer.debounce("k".to_string(), 2, record(fired.clone(), "k"));
        debouncer.wait().await;
        assert_eq!(fired.lock().unwrap().len(), 2);
    }
}
