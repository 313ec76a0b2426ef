//! The render document: the sole input of the rendering engine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobId, MusicSelection, RenderConfig, ResolvedScene, ScenePart};

/// Fully resolved, renderer-ready description of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderDocument {
    /// Job ID
    pub job_id: JobId,
    /// Every scene part of every scene, in narration order
    pub scenes: Vec<ScenePart>,
    /// Background music window
    pub music: MusicSelection,
    /// Merged configuration
    pub config: RenderConfig,
    /// Silence appended after the final scene
    pub padding_back_ms: u64,
    /// Narration duration plus trailing padding
    pub total_duration_ms: u64,
}

impl RenderDocument {
    /// Flatten resolved scenes into a render document.
    pub fn new(
        job_id: JobId,
        resolved: &[ResolvedScene],
        music: MusicSelection,
        config: RenderConfig,
    ) -> Self {
        let scenes: Vec<ScenePart> = resolved
            .iter()
            .flat_map(|scene| scene.parts.iter().cloned())
            .collect();
        let padding_back_ms = config.padding_back_ms;
        let total_duration_ms = narration_ms(resolved) + padding_back_ms;

        Self {
            job_id,
            scenes,
            music,
            config,
            padding_back_ms,
            total_duration_ms,
        }
    }

    /// Duration of narrated content, without padding.
    pub fn content_duration_ms(&self) -> u64 {
        self.scenes.iter().map(ScenePart::duration_ms).sum()
    }
}

/// Total narration length of resolved scenes in milliseconds.
pub fn narration_ms(resolved: &[ResolvedScene]) -> u64 {
    resolved.iter().map(ResolvedScene::duration_ms).sum()
}
