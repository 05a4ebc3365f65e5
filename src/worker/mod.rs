//! Capture worker
//!
//! One worker owns one open video source and runs a continuous capture
//! loop on a dedicated OS thread (device reads block). The loop publishes
//! the most recent decoded frame into a single-slot buffer that any number
//! of producers read concurrently; stale reads are fine, torn reads are
//! impossible.

pub mod capture;
pub mod state;

pub use capture::CaptureWorker;
pub use state::WorkerState;
