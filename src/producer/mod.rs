//! Per-viewer frame producer
//!
//! Each viewer connection gets its own [`FrameProducer`] bound to one
//! capture worker. The producer pulls whatever frame is latest, encodes
//! it to JPEG, and wraps it in a multipart chunk; it never buffers and it
//! runs at its own pace, decoupled from the worker's capture loop.
//!
//! Cancellation is simply dropping the producer when the connection
//! closes; nothing is held beyond the worker reference.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::source::Frame;
use crate::worker::CaptureWorker;

/// Encoder quality used when none is configured
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Multipart boundary and part header emitted before every JPEG payload
const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// Pull-style sequence of multipart MJPEG chunks for one viewer
///
/// Must be created inside a Tokio runtime (it owns a timer).
pub struct FrameProducer {
    worker: Arc<CaptureWorker>,
    ticker: Interval,
    quality: u8,
}

impl FrameProducer {
    /// Bind a producer to a worker at the default JPEG quality
    pub fn new(worker: Arc<CaptureWorker>) -> Self {
        Self::with_quality(worker, DEFAULT_JPEG_QUALITY)
    }

    /// Bind a producer with an explicit JPEG quality (1-100)
    pub fn with_quality(worker: Arc<CaptureWorker>, quality: u8) -> Self {
        // Pace at the worker's capture interval; there is no point
        // polling the slot faster than frames arrive.
        let mut ticker = interval(worker.key().interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            worker,
            ticker,
            quality,
        }
    }

    /// Next wire chunk, or `None` once the bound worker has stopped
    ///
    /// Skips ticks where no frame is available yet and frames that fail
    /// to encode; a stopped worker is observed within one capture
    /// interval. After the first `None` every further call returns
    /// `None`.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        loop {
            self.ticker.tick().await;

            if self.worker.is_stopped() {
                return None;
            }

            let Some(frame) = self.worker.read() else {
                continue;
            };

            match encode_jpeg(&frame, self.quality) {
                Ok(jpeg) => return Some(chunk(&jpeg)),
                Err(e) => {
                    tracing::error!(stream = %self.worker.key(), error = %e, "failed to encode frame");
                }
            }
        }
    }
}

fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Bytes, image::ImageError> {
    let mut jpeg = Vec::with_capacity(frame.data.len() / 4);
    JpegEncoder::new_with_quality(&mut jpeg, quality).write_image(
        &frame.data,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(Bytes::from(jpeg))
}

fn chunk(jpeg: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + 2);
    buf.extend_from_slice(PART_HEADER);
    buf.extend_from_slice(jpeg);
    buf.extend_from_slice(b"\r\n");
    buf.freeze()
}
