//! Shared data models for the shorts pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their persisted input documents
//! - Scene inputs, resolved scenes and scene parts
//! - Captions and word timings
//! - Render configuration, voices and music
//! - Job status records and render stages
//! - Submission validation

pub mod caption;
pub mod config;
pub mod job;
pub mod music;
pub mod render;
pub mod scene;
pub mod status;
pub mod validation;
pub mod voice;

// Re-export common types
pub use caption::{captions_are_monotonic, Caption, Emotion, WordTiming};
pub use config::{CaptionPosition, JobConfig, MusicVolume, Orientation, RenderConfig, RenderDefaults, VoiceConfig};
pub use job::{JobDocument, JobId};
pub use music::{MusicCatalog, MusicMood, MusicSelection, MusicTrack};
pub use render::{narration_ms, RenderDocument};
pub use scene::{secs_to_ms, AudioRef, ClipRef, ResolvedScene, SceneInput, ScenePart};
pub use status::{JobStatus, RenderStage, StatusPatch, StatusRecord, TransitionError};
pub use validation::{validate_scenes, ValidationError, ValidationResult, MAX_SCENES};
pub use voice::{TtsEngine, VoiceCatalog, VoiceProfile};
