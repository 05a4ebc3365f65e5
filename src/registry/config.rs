//! Registry configuration

use std::time::Duration;

use crate::producer::DEFAULT_JPEG_QUALITY;

/// Configuration options for the stream registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long an entry may go unrefreshed before the reaper evicts it
    pub idle_timeout: Duration,

    /// Interval between reaper passes
    pub reap_interval: Duration,

    /// Bound on how long a worker `stop()` waits for its capture loop to
    /// exit; should exceed the longest capture interval in use
    pub join_timeout: Duration,

    /// JPEG quality (1-100) for producers fed from this registry
    pub jpeg_quality: u8,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(120),
            reap_interval: Duration::from_secs(60),
            join_timeout: Duration::from_secs(5),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl RegistryConfig {
    /// Set the idle eviction threshold
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the interval between reaper passes
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Set the bound on worker stop waits
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Set the JPEG quality, capped at 100
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.min(100);
        self
    }
}
