//! Short-form video job pipeline.
//!
//! This crate turns submitted scene lists into rendered videos:
//! - Narration cleanup, fragmenting and caption timing
//! - Content-addressed audio and video caches
//! - Stock footage search with fallback queries
//! - Background music selection
//! - Scene resolution and the two-queue prepare/render coordinator

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod music;
pub mod narration;
pub mod resolver;
pub mod search;

pub use cache::{AudioCache, VideoCache};
pub use collaborators::Collaborators;
pub use config::{RecoveryPolicy, WorkerConfig};
pub use coordinator::PipelineCoordinator;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use music::MusicPicker;
pub use resolver::SceneResolver;
pub use search::FootageFinder;
