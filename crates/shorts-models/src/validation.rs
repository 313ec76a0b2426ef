//! Submission validation. Jobs that fail here are rejected before queueing.

use thiserror::Error;
use url::Url;

use crate::{captions_are_monotonic, SceneInput};

/// Upper bound on scenes per job.
pub const MAX_SCENES: usize = 50;

/// Reasons a submission is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one scene is required")]
    NoScenes,

    #[error("too many scenes: {count} (max {max})")]
    TooManyScenes { count: usize, max: usize },

    #[error("scene {scene}: narration text is empty")]
    EmptyText { scene: usize },

    #[error("scene {scene}: search terms or video URLs are required")]
    MissingSearchTerms { scene: usize },

    #[error("scene {scene}: invalid video URL: {url}")]
    InvalidVideoUrl { scene: usize, url: String },

    #[error("scene {scene}: audio duration must be finite and positive")]
    InvalidAudioDuration { scene: usize },

    #[error("scene {scene}: captions must be ordered with start before end")]
    InvalidCaption { scene: usize },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a list of scene inputs.
pub fn validate_scenes(scenes: &[SceneInput]) -> ValidationResult<()> {
    if scenes.is_empty() {
        return Err(ValidationError::NoScenes);
    }
    if scenes.len() > MAX_SCENES {
        return Err(ValidationError::TooManyScenes {
            count: scenes.len(),
            max: MAX_SCENES,
        });
    }

    for (scene, input) in scenes.iter().enumerate() {
        if input.text.trim().is_empty() {
            return Err(ValidationError::EmptyText { scene });
        }

        let has_terms = input.search_terms.iter().any(|t| !t.trim().is_empty());
        if !has_terms && !input.has_assigned_videos() {
            return Err(ValidationError::MissingSearchTerms { scene });
        }

        for url in &input.video_urls {
            let parsed = Url::parse(url).map_err(|_| ValidationError::InvalidVideoUrl {
                scene,
                url: url.clone(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ValidationError::InvalidVideoUrl {
                    scene,
                    url: url.clone(),
                });
            }
        }

        if let Some(audio) = &input.audio {
            if !audio.has_valid_duration() {
                return Err(ValidationError::InvalidAudioDuration { scene });
            }
        }

        if let Some(captions) = &input.captions {
            if !captions_are_monotonic(captions) {
                return Err(ValidationError::InvalidCaption { scene });
            }
        }
    }

    Ok(())
}
