//! Video source capability
//!
//! The core never opens or reads devices itself. It calls through the
//! [`SourceOpener`] and [`VideoSource`] traits, so the same registry and
//! worker machinery runs against camera indices, capture URLs, or the
//! synthetic [`pattern`] generator. Both traits are blocking by design:
//! real device reads block, and the capture worker runs them on its own
//! dedicated thread.

pub mod pattern;

use bytes::Bytes;

use crate::registry::StreamKey;

/// A single decoded video frame, packed RGB8.
///
/// The pixel payload is reference-counted, so cloning a frame is cheap
/// and a frame handed out by a worker is immutable from then on.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Packed RGB8 pixel data, `width * height * 3` bytes
    pub data: Bytes,
}

impl Frame {
    /// Create a frame from packed RGB8 data
    pub fn new(width: u32, height: u32, data: Bytes) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

/// Error type for source operations
#[derive(Debug, Clone)]
pub enum SourceError {
    /// The source could not be opened
    Open(String),
    /// A single frame read failed
    Read(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Open(reason) => write!(f, "failed to open source: {}", reason),
            SourceError::Read(reason) => write!(f, "failed to read frame: {}", reason),
        }
    }
}

impl std::error::Error for SourceError {}

/// An open video source producing decoded frames
///
/// Owned exclusively by one capture worker's loop; dropping it releases
/// the underlying device handle.
pub trait VideoSource: Send {
    /// Read the next frame, blocking until one is available
    ///
    /// A `Read` error is treated as transient by the capture loop: it is
    /// logged and the loop keeps going.
    fn read_frame(&mut self) -> Result<Frame, SourceError>;
}

/// Resolves a stream key to an open video source
///
/// The source identifier inside the key is opaque to the core; mapping it
/// to a device index or network URL is the opener's business.
pub trait SourceOpener: Send + Sync {
    /// Open the source described by `key`, configured for its resolution
    /// and frame rate
    fn open(&self, key: &StreamKey) -> Result<Box<dyn VideoSource>, SourceError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Emits uniform frames whose fill byte increments on every read, so
    /// a torn write would show up as a frame with mixed bytes.
    pub(crate) struct SolidSource {
        width: u32,
        height: u32,
        fill: u8,
    }

    impl SolidSource {
        pub(crate) fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                fill: 0,
            }
        }
    }

    impl VideoSource for SolidSource {
        fn read_frame(&mut self) -> Result<Frame, SourceError> {
            let len = (self.width * self.height * 3) as usize;
            let frame = Frame::new(self.width, self.height, Bytes::from(vec![self.fill; len]));
            self.fill = self.fill.wrapping_add(1);
            Ok(frame)
        }
    }

    /// Opener that counts successful opens and can be told to fail.
    pub(crate) struct TestOpener {
        opens: AtomicUsize,
        fail: AtomicBool,
    }

    impl TestOpener {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                opens: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }

        pub(crate) fn failing() -> Arc<Self> {
            let opener = Self::new();
            opener.set_fail(true);
            opener
        }

        pub(crate) fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        pub(crate) fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    impl SourceOpener for TestOpener {
        fn open(&self, key: &StreamKey) -> Result<Box<dyn VideoSource>, SourceError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SourceError::Open(format!("no such device: {}", key.src)));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SolidSource::new(key.width, key.height)))
        }
    }
}
