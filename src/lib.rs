//! # mjpeg-mux
//!
//! Core of an MJPEG multiplexing server: keeps exactly one capture
//! worker per distinct (source, width, height, fps) configuration and
//! serves any number of concurrent viewers from it.
//!
//! The HTTP layer is not part of this crate. An embedding server calls
//! [`StreamRegistry::get_or_create`] per viewer request, wraps the worker
//! in a [`FrameProducer`], and writes the chunks it yields into a
//! `multipart/x-mixed-replace; boundary=frame` response until the
//! connection closes.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mjpeg_mux::source::pattern::PatternOpener;
//! use mjpeg_mux::{FrameProducer, StreamKey, StreamRegistry};
//!
//! # async fn serve_one_viewer() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(StreamRegistry::new(Arc::new(PatternOpener)));
//! let reaper = registry.spawn_reaper();
//!
//! let worker = registry
//!     .get_or_create(&StreamKey::new("0", 640, 480, 30))
//!     .await?;
//! let mut producer = FrameProducer::new(worker);
//! while let Some(_chunk) = producer.next_chunk().await {
//!     // write the chunk to the viewer's connection
//! }
//!
//! registry.shutdown().await;
//! reaper.abort();
//! # Ok(())
//! # }
//! ```
//!
//! Delivery is best-effort: workers pace themselves at roughly `1/fps`,
//! producers read whatever frame is latest, and stale or skipped frames
//! are normal under load.

pub mod producer;
pub mod registry;
pub mod source;
pub mod worker;

pub use producer::{FrameProducer, DEFAULT_JPEG_QUALITY};
pub use registry::{ActiveStream, RegistryConfig, RegistryError, StreamKey, StreamRegistry};
pub use source::{Frame, SourceError, SourceOpener, VideoSource};
pub use worker::{CaptureWorker, WorkerState};
