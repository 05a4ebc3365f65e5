//! Per-stream registry entry

use std::sync::Arc;
use std::time::Instant;

use crate::registry::key::StreamKey;
use crate::worker::CaptureWorker;

/// Slot for a single stream key in the registry
///
/// Locked per key, so same-key operations serialize against each other
/// (including across a worker start's device open) without blocking any
/// other key.
pub struct StreamEntry {
    /// The worker serving this key, if one has been started successfully
    pub(super) worker: Option<Arc<CaptureWorker>>,

    /// Updated on every successful lookup or creation; the reaper's
    /// eviction criterion
    pub(super) last_accessed: Instant,

    /// Tombstone set on eviction; a racing lookup that finds it retries
    /// with a fresh slot instead of resurrecting this one
    pub(super) removed: bool,
}

impl StreamEntry {
    pub(super) fn new() -> Self {
        Self {
            worker: None,
            last_accessed: Instant::now(),
            removed: false,
        }
    }

    pub(super) fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    /// The entry's worker, if it is currently producing frames
    pub(super) fn running_worker(&self) -> Option<Arc<CaptureWorker>> {
        self.worker.as_ref().filter(|w| w.is_running()).cloned()
    }
}

/// Point-in-time view of one active stream, as returned by
/// [`StreamRegistry::list_active`](crate::registry::StreamRegistry::list_active)
#[derive(Debug, Clone)]
pub struct ActiveStream {
    /// The stream's capture configuration
    pub key: StreamKey,
    /// When the stream was last requested
    pub last_accessed: Instant,
}
