//! Captions and word timings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Emotion tag inferred from a caption's terminal punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Question,
    Exclamation,
}

impl Emotion {
    /// Infer the emotion from the last non-whitespace character of `text`.
    pub fn from_text(text: &str) -> Self {
        match text.trim_end().chars().last() {
            Some('?') => Emotion::Question,
            Some('!') => Emotion::Exclamation,
            _ => Emotion::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Question => "question",
            Emotion::Exclamation => "exclamation",
        }
    }
}

/// A timed caption fragment, offsets relative to the start of its scene part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Caption {
    /// Caption text
    pub text: String,
    /// Start offset in milliseconds
    pub start_ms: u64,
    /// End offset in milliseconds
    pub end_ms: u64,
    /// Emotion inferred from terminal punctuation
    #[serde(default)]
    pub emotion: Emotion,
}

impl Caption {
    /// Create a caption, inferring its emotion from the text.
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        let text = text.into();
        let emotion = Emotion::from_text(&text);
        Self {
            text,
            start_ms,
            end_ms,
            emotion,
        }
    }

    /// Caption length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Per-word timestamps reported by a speech synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordTiming {
    pub word: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Check that every caption has `start < end` and that captions do not
/// go backwards in time.
pub fn captions_are_monotonic(captions: &[Caption]) -> bool {
    let mut last_end = 0;
    for caption in captions {
        if caption.start_ms >= caption.end_ms || caption.start_ms < last_end {
            return false;
        }
        last_end = caption.end_ms;
    }
    true
}
