//! Capture worker implementation

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use crate::registry::{RegistryError, StreamKey};
use crate::source::{Frame, SourceOpener, VideoSource};

use super::state::WorkerState;

/// Owns one video source and continuously captures frames from it
///
/// Shared as `Arc<CaptureWorker>` between the registry, the capture
/// thread, and any producers bound to it. The frame slot uses its own
/// fine-grained lock, so frame reads never serialize behind registry
/// operations.
pub struct CaptureWorker {
    key: StreamKey,

    /// Lifecycle flag, broadcast so `stop()` and producers can observe
    /// the loop exiting
    state: watch::Sender<WorkerState>,

    /// Single-slot buffer holding the most recent frame; replaced whole,
    /// never written in place
    frame: Mutex<Option<Frame>>,

    /// Handle of the capture thread, taken exactly once on join
    thread: Mutex<Option<thread::JoinHandle<()>>>,

    /// Bound on how long `stop()` waits for the loop to exit
    join_timeout: Duration,
}

impl CaptureWorker {
    pub(crate) fn new(key: StreamKey, join_timeout: Duration) -> Self {
        let (state, _) = watch::channel(WorkerState::Created);
        Self {
            key,
            state,
            frame: Mutex::new(None),
            thread: Mutex::new(None),
            join_timeout,
        }
    }

    /// The capture configuration this worker serves
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Whether the worker has reached its terminal state
    pub fn is_stopped(&self) -> bool {
        self.state().is_stopped()
    }

    /// Whether the capture loop is producing frames
    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    /// Latest buffered frame, or `None` if the loop has not produced one
    ///
    /// Non-blocking beyond the frame slot's own lock, which is only ever
    /// held for a replace or a clone.
    pub fn read(&self) -> Option<Frame> {
        lock(&self.frame).clone()
    }

    /// Open the device and start the capture loop
    ///
    /// The blocking open runs on the blocking pool so unrelated streams
    /// are never held up behind a slow device. On failure the worker is
    /// left terminal and must not be retained by the caller.
    pub(crate) async fn start(
        self: &Arc<Self>,
        opener: Arc<dyn SourceOpener>,
    ) -> Result<(), RegistryError> {
        let key = self.key.clone();
        let source = match tokio::task::spawn_blocking(move || opener.open(&key)).await {
            Ok(Ok(source)) => source,
            Ok(Err(e)) => {
                self.state.send_replace(WorkerState::Stopped);
                return Err(RegistryError::DeviceOpen {
                    key: self.key.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                self.state.send_replace(WorkerState::Stopped);
                return Err(RegistryError::DeviceOpen {
                    key: self.key.clone(),
                    reason: format!("open task failed: {}", e),
                });
            }
        };

        self.state.send_replace(WorkerState::Running);

        let worker = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("capture-{}", self.key))
            .spawn(move || worker.run(source));

        match spawned {
            Ok(handle) => {
                *lock(&self.thread) = Some(handle);
                tracing::info!(stream = %self.key, "capture worker started");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(WorkerState::Stopped);
                Err(RegistryError::DeviceOpen {
                    key: self.key.clone(),
                    reason: format!("capture thread spawn failed: {}", e),
                })
            }
        }
    }

    /// Capture loop body, runs on the dedicated thread
    fn run(self: Arc<Self>, mut source: Box<dyn VideoSource>) {
        // Publishes Stopped on every exit path, panics included, so
        // waiters are never left hanging.
        struct ExitGuard(Arc<CaptureWorker>);

        impl Drop for ExitGuard {
            fn drop(&mut self) {
                self.0.state.send_replace(WorkerState::Stopped);
                tracing::debug!(stream = %self.0.key, "capture loop exited");
            }
        }

        let worker = ExitGuard(self);
        let interval = worker.0.key.interval();

        while *worker.0.state.borrow() == WorkerState::Running {
            match source.read_frame() {
                Ok(frame) => {
                    *lock(&worker.0.frame) = Some(frame);
                }
                Err(e) => {
                    tracing::warn!(stream = %worker.0.key, error = %e, "frame read failed");
                }
            }
            // Best-effort pacing; the failure path sleeps too so a dead
            // device cannot busy-spin the loop.
            thread::sleep(interval);
        }

        // Release the device before the guard announces Stopped.
        drop(source);
    }

    /// Request the capture loop to exit and wait (bounded) for it
    ///
    /// Idempotent and safe to call concurrently with itself; safe when
    /// the loop already exited on its own. If the loop does not exit
    /// within the join window the thread is abandoned and the device
    /// handle may leak.
    pub async fn stop(&self) {
        let mut rx = self.state.subscribe();

        self.state.send_if_modified(|state| match *state {
            // Never started, nothing to wait for
            WorkerState::Created => {
                *state = WorkerState::Stopped;
                true
            }
            WorkerState::Running => {
                *state = WorkerState::Stopping;
                true
            }
            WorkerState::Stopping | WorkerState::Stopped => false,
        });

        match timeout(self.join_timeout, rx.wait_for(|state| state.is_stopped())).await {
            Ok(_) => {
                // Loop has exited; reap the thread. `take()` keeps a
                // concurrent stop() from joining twice.
                let handle = lock(&self.thread).take();
                if let Some(handle) = handle {
                    let _ = handle.join();
                    tracing::info!(stream = %self.key, "capture worker stopped");
                }
            }
            Err(_) => {
                tracing::warn!(
                    stream = %self.key,
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "capture loop did not exit within the join window, abandoning thread"
                );
                // Detach the stuck thread and mark the worker terminal
                // anyway; the device handle may leak with it.
                drop(lock(&self.thread).take());
                self.state.send_replace(WorkerState::Stopped);
            }
        };
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
