//! Job queues for the shorts pipeline.
//!
//! This crate provides:
//! - Single-worker FIFO queues with per-job panic isolation
//! - Queue payloads for the preparation and render stages
//! - Throttled render progress reporting into the status store

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{PrepareJob, QueuedJob, RenderJob};
pub use progress::{ProgressReporter, ProgressSample};
pub use queue::{JobHandler, JobQueue};
