//! Stream registry implementation
//!
//! The central registry that owns all capture workers and enforces the
//! one-running-worker-per-key invariant.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::source::SourceOpener;
use crate::worker::CaptureWorker;

use super::config::RegistryConfig;
use super::entry::{ActiveStream, StreamEntry};
use super::error::RegistryError;
use super::key::StreamKey;

/// Central registry for all capture workers
///
/// Two-level locking: a coarse `RwLock` over the key map, a fine `RwLock`
/// per entry. Worker starts and stops happen under the entry lock only,
/// so a slow device open on one key never serializes the others.
pub struct StreamRegistry {
    /// Map of stream key to its slot
    streams: RwLock<HashMap<StreamKey, Arc<RwLock<StreamEntry>>>>,

    /// Capability used to open video sources
    opener: Arc<dyn SourceOpener>,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a registry with default configuration
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        Self::with_config(opener, RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(opener: Arc<dyn SourceOpener>, config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            opener,
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Return the running worker for `key`, starting one if needed
    ///
    /// Concurrent callers with the same key are serialized on the entry
    /// lock, so exactly one of them opens the device; the rest get the
    /// worker it started. An existing running worker only has its
    /// `last_accessed` refreshed. If the device open fails the error
    /// propagates and no worker is recorded.
    pub async fn get_or_create(
        &self,
        key: &StreamKey,
    ) -> Result<Arc<CaptureWorker>, RegistryError> {
        loop {
            let entry_arc = {
                let mut streams = self.streams.write().await;
                Arc::clone(
                    streams
                        .entry(key.clone())
                        .or_insert_with(|| Arc::new(RwLock::new(StreamEntry::new()))),
                )
            };

            let mut entry = entry_arc.write().await;

            if entry.removed {
                // The slot was evicted while we waited for its lock.
                // Drop the stale slot from the map (unless someone
                // already replaced it) and retry with a fresh one.
                drop(entry);
                let mut streams = self.streams.write().await;
                if let Some(current) = streams.get(key) {
                    if Arc::ptr_eq(current, &entry_arc) {
                        streams.remove(key);
                    }
                }
                continue;
            }

            if let Some(worker) = entry.running_worker() {
                entry.touch();
                tracing::debug!(stream = %key, "reusing capture worker");
                return Ok(worker);
            }

            // Absent or terminal: start a fresh worker. The entry lock
            // held across the open is this key's critical section.
            let worker = Arc::new(CaptureWorker::new(key.clone(), self.config.join_timeout));
            worker.start(Arc::clone(&self.opener)).await?;

            entry.worker = Some(Arc::clone(&worker));
            entry.touch();
            tracing::info!(stream = %key, "capture worker created");
            return Ok(worker);
        }
    }

    /// Stop every stream whose source matches `src`
    ///
    /// The literal `"all"` matches every stream; any other value matches
    /// the source component of the key, so all resolutions and frame
    /// rates of one source go down together. Returns the number of
    /// workers stopped.
    pub async fn stop_source(&self, src: &str) -> usize {
        let targets: Vec<(StreamKey, Arc<RwLock<StreamEntry>>)> = {
            let streams = self.streams.read().await;
            streams
                .iter()
                .filter(|(key, _)| src == "all" || key.src == src)
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect()
        };

        let mut stopped = 0;
        for (key, entry_arc) in targets {
            if self.evict(&key, &entry_arc, |_| true).await {
                tracing::info!(stream = %key, "stream stopped");
                stopped += 1;
            }
        }
        stopped
    }

    /// Stop every stream; call before process exit so capture threads
    /// are joined rather than abandoned to the runtime
    pub async fn shutdown(&self) -> usize {
        let stopped = self.stop_source("all").await;
        tracing::info!(stopped, "registry shut down");
        stopped
    }

    /// Snapshot of the currently active streams
    ///
    /// Entries mid-mutation (e.g. a worker start in progress) are
    /// skipped rather than waited for; writers are only blocked for the
    /// duration of the map copy.
    pub async fn list_active(&self) -> Vec<ActiveStream> {
        let snapshot: Vec<(StreamKey, Arc<RwLock<StreamEntry>>)> = {
            let streams = self.streams.read().await;
            streams
                .iter()
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect()
        };

        let mut active = Vec::with_capacity(snapshot.len());
        for (key, entry_arc) in snapshot {
            if let Ok(entry) = entry_arc.try_read() {
                if !entry.removed && entry.running_worker().is_some() {
                    active.push(ActiveStream {
                        key,
                        last_accessed: entry.last_accessed,
                    });
                }
            }
        }
        active
    }

    /// Number of currently active streams
    pub async fn active_count(&self) -> usize {
        self.list_active().await.len()
    }

    /// Run one reaper pass
    ///
    /// Evicts entries whose worker is terminal, whose slot is empty, or
    /// whose `last_accessed` is older than the idle timeout measured
    /// against the start of this pass. An entry refreshed after the pass
    /// began re-reads as fresh under its lock and survives.
    pub async fn reap_idle(&self) {
        let pass_started = Instant::now();

        let targets: Vec<(StreamKey, Arc<RwLock<StreamEntry>>)> = {
            let streams = self.streams.read().await;
            streams
                .iter()
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect()
        };

        for (key, entry_arc) in targets {
            let evicted = self
                .evict(&key, &entry_arc, |entry| match entry.worker.as_ref() {
                    None => true,
                    Some(worker) if worker.is_stopped() => true,
                    // duration_since saturates to zero for entries
                    // refreshed after pass_started
                    Some(_) => {
                        pass_started.duration_since(entry.last_accessed)
                            > self.config.idle_timeout
                    }
                })
                .await;

            if evicted {
                tracing::debug!(stream = %key, "idle stream reaped");
            }
        }
    }

    /// Spawn the background reaper task
    ///
    /// Runs `reap_idle` every `reap_interval` for the life of the task;
    /// the caller keeps the handle and aborts it at shutdown.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.reap_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.reap_idle().await;
            }
        })
    }

    /// Evict one entry if `should_evict` says so
    ///
    /// The entry lock is held from the decision through `worker.stop()`
    /// and the tombstone, so no other operation can observe the key half
    /// evicted. Returns whether a worker was stopped.
    async fn evict(
        &self,
        key: &StreamKey,
        entry_arc: &Arc<RwLock<StreamEntry>>,
        should_evict: impl FnOnce(&StreamEntry) -> bool,
    ) -> bool {
        let mut entry = entry_arc.write().await;

        if entry.removed || !should_evict(&entry) {
            return false;
        }

        let stopped = match entry.worker.take() {
            Some(worker) => {
                worker.stop().await;
                true
            }
            None => false,
        };
        entry.removed = true;
        drop(entry);

        // Pointer-compared so a fresh slot inserted for the same key in
        // the meantime is left alone.
        let mut streams = self.streams.write().await;
        if let Some(current) = streams.get(key) {
            if Arc::ptr_eq(current, entry_arc) {
                streams.remove(key);
            }
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::assert_ok;

    use crate::source::testing::TestOpener;

    use super::*;

    fn key(src: &str) -> StreamKey {
        StreamKey::new(src, 8, 8, 100)
    }

    fn init_tracing() {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    fn registry(opener: Arc<TestOpener>) -> Arc<StreamRegistry> {
        init_tracing();
        Arc::new(StreamRegistry::with_config(
            opener,
            RegistryConfig::default().join_timeout(Duration::from_secs(2)),
        ))
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_worker() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        let first = registry.get_or_create(&key("0")).await.unwrap();
        let second = registry.get_or_create(&key("0")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(opener.opens(), 1);
        assert_eq!(registry.active_count().await, 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_lookup_refreshes_last_accessed() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        registry.get_or_create(&key("0")).await.unwrap();
        let before = registry.list_active().await[0].last_accessed;

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.get_or_create(&key("0")).await.unwrap();
        let after = registry.list_active().await[0].last_accessed;

        assert!(after > before);
        assert_eq!(opener.opens(), 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_opens_device_once() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_create(&key("0")).await.unwrap() })
            })
            .collect();

        let mut workers = Vec::new();
        for task in tasks {
            workers.push(task.await.unwrap());
        }

        assert_eq!(opener.opens(), 1);
        assert!(workers.iter().all(|w| Arc::ptr_eq(w, &workers[0])));

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_workers() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        let a = registry.get_or_create(&key("0")).await.unwrap();
        let b = registry.get_or_create(&key("1")).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(opener.opens(), 2);
        assert_eq!(registry.active_count().await, 2);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_then_create_builds_new_worker() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        let old = registry.get_or_create(&key("0")).await.unwrap();
        assert_eq!(registry.stop_source("0").await, 1);
        assert!(old.is_stopped());
        assert_eq!(registry.active_count().await, 0);

        let new = registry.get_or_create(&key("0")).await.unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(opener.opens(), 2);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_source_matches_source_component() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        registry
            .get_or_create(&StreamKey::new("0", 640, 480, 100))
            .await
            .unwrap();
        registry
            .get_or_create(&StreamKey::new("0", 1280, 720, 100))
            .await
            .unwrap();
        registry.get_or_create(&key("1")).await.unwrap();

        assert_eq!(registry.stop_source("0").await, 2);

        let active = registry.list_active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key.src, "1");

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_all() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        let workers = vec![
            registry.get_or_create(&key("0")).await.unwrap(),
            registry.get_or_create(&key("1")).await.unwrap(),
            registry.get_or_create(&key("2")).await.unwrap(),
        ];

        assert_eq!(registry.stop_source("all").await, 3);
        assert!(registry.list_active().await.is_empty());
        assert!(workers.iter().all(|w| w.is_stopped()));
    }

    #[tokio::test]
    async fn test_open_failure_leaves_registry_unchanged() {
        let opener = TestOpener::failing();
        let registry = registry(Arc::clone(&opener));

        let result = registry.get_or_create(&key("0")).await;
        assert!(matches!(result, Err(RegistryError::DeviceOpen { .. })));
        assert!(registry.list_active().await.is_empty());

        // The failure is retryable: once the device comes back, the same
        // key works.
        opener.set_fail(false);
        assert_ok!(registry.get_or_create(&key("0")).await);
        assert_eq!(registry.active_count().await, 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_reaper_evicts_idle_entry() {
        let opener = TestOpener::new();
        let registry = Arc::new(StreamRegistry::with_config(
            Arc::clone(&opener) as Arc<dyn SourceOpener>,
            RegistryConfig::default()
                .idle_timeout(Duration::from_millis(50))
                .join_timeout(Duration::from_secs(2)),
        ));

        let worker = registry.get_or_create(&key("0")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        registry.reap_idle().await;

        assert!(registry.list_active().await.is_empty());
        assert!(worker.is_stopped());
    }

    #[tokio::test]
    async fn test_reaper_keeps_fresh_entry() {
        let opener = TestOpener::new();
        let registry = Arc::new(StreamRegistry::with_config(
            Arc::clone(&opener) as Arc<dyn SourceOpener>,
            RegistryConfig::default()
                .idle_timeout(Duration::from_millis(200))
                .join_timeout(Duration::from_secs(2)),
        ));

        registry.get_or_create(&key("0")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        registry.reap_idle().await;

        assert_eq!(registry.active_count().await, 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_reaper_evicts_terminal_worker() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        let worker = registry.get_or_create(&key("0")).await.unwrap();
        worker.stop().await;

        registry.reap_idle().await;
        assert!(registry.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_worker_is_replaced_on_lookup() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        let old = registry.get_or_create(&key("0")).await.unwrap();
        old.stop().await;

        let new = registry.get_or_create(&key("0")).await.unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(new.is_running());
        assert_eq!(opener.opens(), 2);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawned_reaper_ticks() {
        let opener = TestOpener::new();
        let registry = Arc::new(StreamRegistry::with_config(
            Arc::clone(&opener) as Arc<dyn SourceOpener>,
            RegistryConfig::default()
                .idle_timeout(Duration::from_millis(50))
                .reap_interval(Duration::from_millis(25))
                .join_timeout(Duration::from_secs(2)),
        ));

        let reaper = registry.spawn_reaper();
        registry.get_or_create(&key("0")).await.unwrap();

        // Within a couple of intervals past the deadline the entry must
        // be gone.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.list_active().await.is_empty());

        reaper.abort();
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let opener = TestOpener::new();
        let registry = registry(Arc::clone(&opener));

        registry.get_or_create(&key("0")).await.unwrap();
        registry.get_or_create(&key("1")).await.unwrap();

        assert_eq!(registry.shutdown().await, 2);
        assert_eq!(registry.active_count().await, 0);
    }
}
