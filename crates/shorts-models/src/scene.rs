//! Scene inputs and resolved scenes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Caption;

/// One narrated scene as submitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneInput {
    /// Narration text
    pub text: String,

    /// Search-term hints for stock footage
    #[serde(default)]
    pub search_terms: Vec<String>,

    /// Pre-assigned clip URLs, from the client or a previous resolution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_urls: Vec<String>,

    /// `video_urls` were chosen by footage search, not by the client.
    /// Pinned clips are reused where they fit and topped up by search.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub videos_pinned: bool,

    /// Pre-assigned narration audio for the first fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioRef>,

    /// Pre-existing captions for the first fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captions: Option<Vec<Caption>>,
}

impl SceneInput {
    /// Create a scene input with only narration and search terms.
    pub fn new<I, S>(text: impl Into<String>, search_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: text.into(),
            search_terms: search_terms.into_iter().map(Into::into).collect(),
            video_urls: Vec::new(),
            videos_pinned: false,
            audio: None,
            captions: None,
        }
    }

    /// Whether clips were already chosen for this scene.
    pub fn has_assigned_videos(&self) -> bool {
        !self.video_urls.is_empty()
    }

    /// Whether the client supplied the clip list. Such lists are used as-is.
    pub fn has_explicit_videos(&self) -> bool {
        self.has_assigned_videos() && !self.videos_pinned
    }
}

/// Reference to a narration audio artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioRef {
    /// Local path or URL of the audio file
    pub url: String,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Text voiced by this audio, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AudioRef {
    /// A usable duration is finite and strictly positive.
    pub fn has_valid_duration(&self) -> bool {
        self.duration_secs.is_finite() && self.duration_secs > 0.0
    }
}

/// Reference to a stock-footage clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRef {
    /// Provider clip ID
    pub id: String,
    /// Remote file URL
    pub url: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Clip duration in seconds
    pub duration_secs: f64,
    /// Local cached copy, when pre-downloaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

/// A sentence-level subdivision of a scene with its own media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenePart {
    /// Stable part ID (`scene-{index}-part-{index}`)
    pub id: String,
    /// Narration fragment
    pub text: String,
    /// Chosen clip
    pub video: ClipRef,
    /// Narration audio
    pub audio: AudioRef,
    /// Word captions
    pub captions: Vec<Caption>,
}

impl ScenePart {
    /// Stable ID for a part of a scene.
    pub fn part_id(scene_index: usize, part_index: usize) -> String {
        format!("scene-{}-part-{}", scene_index, part_index)
    }

    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs
    }

    pub fn duration_ms(&self) -> u64 {
        secs_to_ms(self.audio.duration_secs)
    }
}

/// A scene with every fragment's media resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResolvedScene {
    /// Position of the scene in the job
    pub index: usize,
    /// Resolved parts, in narration order
    pub parts: Vec<ScenePart>,
    /// Sum of part durations in seconds
    pub duration_secs: f64,
}

impl ResolvedScene {
    /// Build a resolved scene; the duration is the sum of part durations.
    pub fn new(index: usize, parts: Vec<ScenePart>) -> Self {
        let duration_secs = parts.iter().map(ScenePart::duration_secs).sum();
        Self {
            index,
            parts,
            duration_secs,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.parts.iter().map(ScenePart::duration_ms).sum()
    }

    /// Scene input that replays this resolution without searching again.
    ///
    /// Explicit clip lists from the original input are kept as-is; searched
    /// clips are pinned by URL. The first part's audio and captions are
    /// carried so the first fragment is not re-synthesized.
    pub fn to_scene_input(&self, original: &SceneInput) -> SceneInput {
        let (video_urls, videos_pinned) = if original.has_explicit_videos() {
            (original.video_urls.clone(), false)
        } else {
            (self.parts.iter().map(|p| p.video.url.clone()).collect(), true)
        };
        let first = self.parts.first();

        SceneInput {
            text: original.text.clone(),
            search_terms: original.search_terms.clone(),
            video_urls,
            videos_pinned,
            audio: first.map(|p| p.audio.clone()),
            captions: first.map(|p| p.captions.clone()),
        }
    }
}

/// Convert seconds to whole milliseconds (rounded).
pub fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(scene: usize, index: usize, url: &str, secs: f64) -> ScenePart {
        ScenePart {
            id: ScenePart::part_id(scene, index),
            text: format!("fragment {}", index),
            video: ClipRef {
                id: format!("clip-{}", index),
                url: url.to_string(),
                width: 1080,
                height: 1920,
                duration_secs: 10.0,
                local_path: None,
            },
            audio: AudioRef {
                url: format!("/cache/audio/{}.mp3", index),
                duration_secs: secs,
                text: Some(format!("fragment {}", index)),
            },
            captions: vec![Caption::new("fragment", 0, 500)],
        }
    }

    #[test]
    fn test_resolved_scene_duration_is_sum_of_parts() {
        let scene = ResolvedScene::new(0, vec![part(0, 0, "a", 1.25), part(0, 1, "b", 2.5)]);
        assert!((scene.duration_secs - 3.75).abs() < 1e-9);
        assert_eq!(scene.duration_ms(), 3750);
    }

    #[test]
    fn test_to_scene_input_pins_searched_clips() {
        let original = SceneInput::new("One. Two.", ["ocean"]);
        let scene = ResolvedScene::new(0, vec![part(0, 0, "u1", 1.0), part(0, 1, "u2", 1.0)]);

        let replay = scene.to_scene_input(&original);
        assert_eq!(replay.video_urls, vec!["u1".to_string(), "u2".to_string()]);
        assert!(replay.videos_pinned);
        assert!(!replay.has_explicit_videos());
        assert_eq!(replay.audio.as_ref().map(|a| a.url.as_str()), Some("/cache/audio/0.mp3"));
        assert_eq!(replay.captions.as_ref().map(Vec::len), Some(1));
        assert_eq!(replay.search_terms, original.search_terms);
    }

    #[test]
    fn test_to_scene_input_keeps_explicit_clip_list() {
        let mut original = SceneInput::new("One.", ["ocean"]);
        original.video_urls = vec!["u1".into(), "u2".into(), "u3".into()];
        let scene = ResolvedScene::new(0, vec![part(0, 0, "u1", 1.0)]);

        let replay = scene.to_scene_input(&original);
        assert_eq!(replay.video_urls.len(), 3);
        assert!(!replay.videos_pinned);
        assert!(replay.has_explicit_videos());
    }

    #[test]
    fn test_pinned_clips_follow_the_new_resolution() {
        let mut original = SceneInput::new("One. Two.", ["ocean"]);
        original.video_urls = vec!["u1".into()];
        original.videos_pinned = true;
        let scene = ResolvedScene::new(0, vec![part(0, 0, "u1", 1.0), part(0, 1, "u9", 1.0)]);

        let replay = scene.to_scene_input(&original);
        assert_eq!(replay.video_urls, vec!["u1".to_string(), "u9".to_string()]);
        assert!(replay.videos_pinned);

        let json = serde_json::to_value(SceneInput::new("One.", ["ocean"])).unwrap();
        assert!(json.get("videos_pinned").is_none());
    }

    #[test]
    fn test_audio_duration_validity() {
        let mut audio = AudioRef {
            url: "a.mp3".into(),
            duration_secs: 1.0,
            text: None,
        };
        assert!(audio.has_valid_duration());
        audio.duration_secs = 0.0;
        assert!(!audio.has_valid_duration());
        audio.duration_secs = f64::NAN;
        assert!(!audio.has_valid_duration());
        audio.duration_secs = -2.0;
        assert!(!audio.has_valid_duration());
    }

    #[test]
    fn test_secs_to_ms() {
        assert_eq!(secs_to_ms(3.0), 3000);
        assert_eq!(secs_to_ms(0.0015), 2);
        assert_eq!(secs_to_ms(f64::NAN), 0);
    }
}
