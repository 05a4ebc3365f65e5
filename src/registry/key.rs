//! Stream key type

use std::time::Duration;

/// Unique identifier for a capture configuration
///
/// Two requests for the same source at different resolutions or frame
/// rates are distinct streams with distinct workers. The source string is
/// opaque here; the [`SourceOpener`](crate::source::SourceOpener)
/// interprets it as a device index, URL, or anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// Opaque source identifier (e.g. "0", "rtsp://...")
    pub src: String,
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Target frames per second
    pub fps: u32,
}

impl StreamKey {
    /// Create a new stream key
    pub fn new(src: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            src: src.into(),
            width,
            height,
            fps,
        }
    }

    /// Best-effort period between captured frames
    ///
    /// An fps of zero is clamped to one rather than dividing by zero.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}x{}@{}fps",
            self.src, self.width, self.height, self.fps
        )
    }
}
