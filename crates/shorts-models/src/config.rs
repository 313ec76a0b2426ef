//! Render configuration: what clients submit and what the renderer receives.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{MusicMood, VoiceCatalog};

/// Target aspect ratio class for footage search and composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
            Orientation::Square => "square",
        }
    }

    /// Whether a clip of the given dimensions matches this orientation.
    pub fn matches(&self, width: u32, height: u32) -> bool {
        match self {
            Orientation::Portrait => height > width,
            Orientation::Landscape => width > height,
            Orientation::Square => width == height,
        }
    }
}

/// Where captions are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptionPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

/// Background music level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MusicVolume {
    Muted,
    Low,
    #[default]
    Medium,
    High,
}

impl MusicVolume {
    /// Linear gain applied to the music track.
    pub fn gain(&self) -> f64 {
        match self {
            MusicVolume::Muted => 0.0,
            MusicVolume::Low => 0.2,
            MusicVolume::Medium => 0.45,
            MusicVolume::High => 0.7,
        }
    }
}

/// Client-supplied configuration. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicMood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_volume: Option<MusicVolume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_position: Option<CaptionPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_back_ms: Option<u64>,
}

/// Process-wide defaults merged into every job's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderDefaults {
    pub orientation: Orientation,
    pub voice: String,
    pub language: String,
    pub music_volume: MusicVolume,
    pub caption_position: CaptionPosition,
    pub padding_back_ms: u64,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            orientation: Orientation::Portrait,
            voice: "Charlotte".to_string(),
            language: "en".to_string(),
            music_volume: MusicVolume::Medium,
            caption_position: CaptionPosition::Bottom,
            padding_back_ms: 1500,
        }
    }
}

/// Voice parameters that identify a synthesis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct VoiceConfig {
    pub voice: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_audio: Option<String>,
}

/// Fully merged configuration handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderConfig {
    pub orientation: Orientation,
    pub voice: VoiceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicMood>,
    pub music_volume: MusicVolume,
    pub caption_position: CaptionPosition,
    pub padding_back_ms: u64,
}

impl JobConfig {
    /// Merge with defaults, resolving the voice against the catalog.
    ///
    /// Explicit language and reference audio win over the voice profile;
    /// unknown voices keep the requested name with the default language.
    pub fn resolve(&self, defaults: &RenderDefaults, voices: &VoiceCatalog) -> RenderConfig {
        let voice_name = self.voice.clone().unwrap_or_else(|| defaults.voice.clone());
        let profile = voices.get(&voice_name);

        let language = self
            .language
            .clone()
            .or_else(|| profile.map(|p| p.language.clone()))
            .unwrap_or_else(|| defaults.language.clone());

        let reference_audio = self.reference_audio.clone().or_else(|| {
            profile.map(|p| voices.reference_path(p).to_string_lossy().to_string())
        });

        RenderConfig {
            orientation: self.orientation.unwrap_or(defaults.orientation),
            voice: VoiceConfig {
                voice: profile.map(|p| p.name.clone()).unwrap_or(voice_name),
                language,
                reference_audio,
            },
            music: self.music,
            music_volume: self.music_volume.unwrap_or(defaults.music_volume),
            caption_position: self.caption_position.unwrap_or(defaults.caption_position),
            padding_back_ms: self.padding_back_ms.unwrap_or(defaults.padding_back_ms),
        }
    }
}
