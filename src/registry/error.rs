//! Registry error types

use super::key::StreamKey;

/// Error type for registry operations
///
/// Device-open failure is the only condition surfaced to callers; read,
/// encode, and stop-timeout failures are absorbed and logged so one bad
/// stream never takes the registry down.
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// The video source for this key could not be opened; no entry was
    /// recorded and the caller may retry
    DeviceOpen {
        /// The key whose source failed to open
        key: StreamKey,
        /// What the opener reported
        reason: String,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DeviceOpen { key, reason } => {
                write!(f, "could not open video source {}: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
