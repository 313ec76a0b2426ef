//! Background music catalog and selections.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Mood tag used to pick background music.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MusicMood {
    Sad,
    Melancholic,
    Happy,
    Euphoric,
    Excited,
    Chill,
    Uneasy,
    Angry,
    Dark,
    Hopeful,
    Contemplative,
    Funny,
}

impl MusicMood {
    pub fn as_str(&self) -> &'static str {
        match self {
            MusicMood::Sad => "sad",
            MusicMood::Melancholic => "melancholic",
            MusicMood::Happy => "happy",
            MusicMood::Euphoric => "euphoric",
            MusicMood::Excited => "excited",
            MusicMood::Chill => "chill",
            MusicMood::Uneasy => "uneasy",
            MusicMood::Angry => "angry",
            MusicMood::Dark => "dark",
            MusicMood::Hopeful => "hopeful",
            MusicMood::Contemplative => "contemplative",
            MusicMood::Funny => "funny",
        }
    }
}

/// A track in the catalog, with the usable window inside the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MusicTrack {
    pub file: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub mood: MusicMood,
}

impl MusicTrack {
    pub fn new(file: impl Into<String>, start_ms: u64, end_ms: u64, mood: MusicMood) -> Self {
        Self {
            file: file.into(),
            start_ms,
            end_ms,
            mood,
        }
    }

    pub fn length_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// The clipped music window chosen for one render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MusicSelection {
    pub file: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub mood: MusicMood,
    /// Set when no track was long enough and the renderer must loop it
    #[serde(default)]
    pub looped: bool,
}

impl MusicSelection {
    pub fn window_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Whether the window covers a video of `total_ms` without looping.
    pub fn covers(&self, total_ms: u64) -> bool {
        !self.looped && self.window_ms() >= total_ms
    }
}

/// Immutable music table, injected into the coordinator at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicCatalog {
    tracks: Vec<MusicTrack>,
}

impl MusicCatalog {
    /// Build a catalog, dropping tracks with an empty window.
    pub fn new(tracks: Vec<MusicTrack>) -> Self {
        Self {
            tracks: tracks.into_iter().filter(|t| t.length_ms() > 0).collect(),
        }
    }

    /// The bundled music library.
    pub fn builtin() -> Self {
        use MusicMood::*;
        Self::new(vec![
            MusicTrack::new("Sly Sky - Telecasted.mp3", 0, 152_000, Melancholic),
            MusicTrack::new("No.2 Remembering Her - Esther Abrami.mp3", 2_000, 134_000, Melancholic),
            MusicTrack::new("Champion - Telecasted.mp3", 0, 142_000, Chill),
            MusicTrack::new("Oh Please - Telecasted.mp3", 0, 154_000, Chill),
            MusicTrack::new("Jetski - Telecasted.mp3", 0, 142_000, Uneasy),
            MusicTrack::new("Phantom - Density & Time.mp3", 0, 178_000, Uneasy),
            MusicTrack::new("On The Hunt - Andrew Langdon.mp3", 0, 95_000, Uneasy),
            MusicTrack::new("Name The Time And Place - Telecasted.mp3", 0, 142_000, Excited),
            MusicTrack::new("Delayed Baggage - Ryan Stasik.mp3", 3_000, 108_000, Euphoric),
            MusicTrack::new("Like It Loud - Dyalla.mp3", 4_000, 160_000, Euphoric),
            MusicTrack::new("Organic Guitar House - Dyalla.mp3", 2_000, 160_000, Euphoric),
            MusicTrack::new("Honey, I Play The Drums - Telecasted.mp3", 0, 118_000, Happy),
            MusicTrack::new("Paris Else - Telecasted.mp3", 0, 129_000, Happy),
            MusicTrack::new("Restless Heart - Jimena Contreras.mp3", 0, 94_000, Sad),
            MusicTrack::new("Heartbeat Of The Wind - Asher Fulero.mp3", 0, 124_000, Sad),
            MusicTrack::new("Hopeful - Nat Keefe.mp3", 0, 175_000, Hopeful),
            MusicTrack::new("Hopeful Freedom - Asher Fulero.mp3", 1_000, 172_000, Hopeful),
            MusicTrack::new("Traversing - Godmode.mp3", 0, 95_000, Dark),
            MusicTrack::new("Final Soliloquy - Asher Fulero.mp3", 1_000, 181_000, Dark),
            MusicTrack::new("Curse of the Witches - Jimena Contreras.mp3", 0, 113_000, Angry),
            MusicTrack::new("Shaking Off The Rain - The Grey Room.mp3", 0, 144_000, Contemplative),
            MusicTrack::new("Ambiphonic Lounge - Godmode.mp3", 0, 166_000, Contemplative),
            MusicTrack::new("Cafecito por la Manana - Cumbia Deli.mp3", 0, 184_000, Funny),
            MusicTrack::new("Buckle Up - Jeremy Korpas.mp3", 0, 128_000, Funny),
        ])
    }

    pub fn tracks(&self) -> &[MusicTrack] {
        &self.tracks
    }

    /// Tracks for a mood; every track when no mood is given or none match.
    pub fn tracks_for(&self, mood: Option<MusicMood>) -> Vec<&MusicTrack> {
        let matching: Vec<&MusicTrack> = match mood {
            Some(mood) => self.tracks.iter().filter(|t| t.mood == mood).collect(),
            None => Vec::new(),
        };
        if matching.is_empty() {
            self.tracks.iter().collect()
        } else {
            matching
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Default for MusicCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
