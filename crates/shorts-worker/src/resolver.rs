//! Scene resolution: narration fragments, audio, footage and captions.

use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use shorts_models::{AudioRef, Caption, ClipRef, RenderConfig, ResolvedScene, SceneInput, ScenePart, WordTiming};

use crate::cache::{normalize_text, AudioCache};
use crate::error::{WorkerError, WorkerResult};
use crate::narration::{build_captions, captions_fit, narration_fragments};
use crate::search::FootageFinder;

/// Audio for one fragment and whatever timing data came with it.
#[derive(Debug, Clone)]
struct FragmentAudio {
    audio: AudioRef,
    word_timings: Option<Vec<WordTiming>>,
    stored_captions: Option<Vec<Caption>>,
}

/// Turns scene inputs into resolved scenes.
pub struct SceneResolver {
    audio: Arc<AudioCache>,
    finder: Arc<FootageFinder>,
}

impl SceneResolver {
    pub fn new(audio: Arc<AudioCache>, finder: Arc<FootageFinder>) -> Self {
        Self { audio, finder }
    }

    /// Resolve scene `index`.
    ///
    /// Audio synthesis for every fragment runs concurrently with the footage
    /// lookup. Clip IDs used by this scene are added to `exclude`.
    pub async fn resolve(
        &self,
        index: usize,
        input: &SceneInput,
        config: &RenderConfig,
        exclude: &mut HashSet<String>,
    ) -> WorkerResult<ResolvedScene> {
        let fragments = narration_fragments(&input.text);
        if fragments.is_empty() {
            return Err(shorts_models::ValidationError::EmptyText { scene: index }.into());
        }
        let needed = fragments.len();

        let videos = async {
            if input.has_explicit_videos() {
                self.finder.by_urls(&input.video_urls, exclude).await
            } else if input.has_assigned_videos() {
                self.finder
                    .reuse_or_find(
                        index,
                        &input.video_urls,
                        &input.search_terms,
                        needed,
                        config.orientation,
                        exclude,
                    )
                    .await
            } else {
                self.finder
                    .find(index, &input.search_terms, needed, config.orientation, exclude)
                    .await
            }
        };
        let audio = try_join_all(
            fragments
                .iter()
                .enumerate()
                .map(|(i, fragment)| self.fragment_audio(i, fragment, input, config, needed)),
        );

        let (clips, audio): (Vec<ClipRef>, Vec<FragmentAudio>) = tokio::try_join!(videos, audio)?;

        if clips.len() < needed {
            return Err(WorkerError::CountMismatch {
                scene: index,
                needed,
                found: clips.len(),
            });
        }

        let mut parts = Vec::with_capacity(needed);
        for (i, ((fragment, clip), fragment_audio)) in fragments.into_iter().zip(clips).zip(audio).enumerate() {
            let FragmentAudio {
                audio,
                word_timings,
                stored_captions,
            } = fragment_audio;

            if !audio.has_valid_duration() {
                return Err(WorkerError::InvalidDuration {
                    scene: index,
                    part: i,
                    value: audio.duration_secs,
                });
            }

            let captions = match stored_captions {
                Some(captions) if captions_fit(&captions, audio.duration_secs) => captions,
                _ => build_captions(&fragment, audio.duration_secs, word_timings.as_deref()),
            };

            parts.push(ScenePart {
                id: ScenePart::part_id(index, i),
                text: fragment,
                video: clip,
                audio,
                captions,
            });
        }

        let scene = ResolvedScene::new(index, parts);
        info!(
            scene = index,
            parts = scene.parts.len(),
            duration_secs = scene.duration_secs,
            "Resolved scene"
        );
        Ok(scene)
    }

    async fn fragment_audio(
        &self,
        position: usize,
        fragment: &str,
        input: &SceneInput,
        config: &RenderConfig,
        fragments: usize,
    ) -> WorkerResult<FragmentAudio> {
        if position == 0 {
            if let Some(assigned) = input.audio.as_ref().filter(|a| assigned_audio_matches(a, fragment, fragments)) {
                debug!(url = %assigned.url, "Using pre-assigned audio");
                return Ok(FragmentAudio {
                    audio: assigned.clone(),
                    word_timings: None,
                    stored_captions: input.captions.clone(),
                });
            }
        }

        let cached = self.audio.get_or_synthesize(fragment, &config.voice, false).await?;
        Ok(FragmentAudio {
            audio: AudioRef {
                url: cached.path.to_string_lossy().to_string(),
                duration_secs: cached.duration_secs,
                text: Some(normalize_text(fragment)),
            },
            word_timings: cached.word_timings,
            stored_captions: None,
        })
    }
}

/// Pre-assigned audio voices the first fragment when its recorded text is
/// that fragment. Audio without recorded text is trusted only for
/// single-fragment scenes.
fn assigned_audio_matches(audio: &AudioRef, fragment: &str, fragments: usize) -> bool {
    if !audio.has_valid_duration() {
        return false;
    }
    match &audio.text {
        Some(text) => normalize_text(text) == normalize_text(fragment),
        None => fragments == 1,
    }
}
