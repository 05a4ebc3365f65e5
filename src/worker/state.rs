//! Worker lifecycle states

/// Lifecycle of a capture worker
///
/// Transitions only move forward: `Created → Running → Stopping →
/// Stopped`. `Stopped` is terminal; reusing the worker's stream key means
/// creating a new worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, capture loop not yet started
    Created,
    /// Capture loop is producing frames
    Running,
    /// Stop requested, waiting for the loop to exit
    Stopping,
    /// Terminal: loop exited (or was abandoned after a stop timeout)
    Stopped,
}

impl WorkerState {
    /// Whether this is the terminal state
    pub fn is_stopped(self) -> bool {
        matches!(self, WorkerState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stopped_is_terminal() {
        assert!(WorkerState::Stopped.is_stopped());
        assert!(!WorkerState::Created.is_stopped());
        assert!(!WorkerState::Running.is_stopped());
        assert!(!WorkerState::Stopping.is_stopped());
    }
}
