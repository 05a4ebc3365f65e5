//! Stream registry
//!
//! The registry keeps at most one running capture worker per stream key
//! and reclaims workers nobody has asked for recently.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<StreamRegistry>
//!                 ┌────────────────────────────────┐
//!                 │ streams: HashMap<StreamKey,    │
//!                 │   Arc<RwLock<StreamEntry {    │
//!                 │     worker, last_accessed,    │
//!                 │   }>>                         │
//!                 │ >                              │
//!                 └───────────────┬────────────────┘
//!                                 │ get_or_create / stop / reap
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!   [CaptureWorker]        [CaptureWorker]           [reaper task]
//!   capture thread         capture thread            reap_idle()
//!         │                       │
//!         ▼                       ▼
//!   FrameProducer ──► viewer   FrameProducer ──► viewer
//! ```
//!
//! # Locking
//!
//! The outer map lock is only ever held to copy or to fetch-or-insert a
//! slot. The per-key entry lock is the critical section: it is held
//! across worker construction and device open, so racing callers on one
//! key open the device exactly once while other keys proceed untouched.

pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{ActiveStream, StreamEntry};
pub use error::RegistryError;
pub use key::StreamKey;
pub use store::StreamRegistry;
