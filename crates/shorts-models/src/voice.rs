//! Voice catalog for speech synthesis.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Synthesis engine behind a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TtsEngine {
    /// English voices
    Chatterbox,
    /// Multilingual voices (Spanish, Portuguese)
    Xtts,
}

/// A named voice with its language and reference recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VoiceProfile {
    pub name: String,
    pub language: String,
    pub engine: TtsEngine,
    /// Reference recording file name, relative to the catalog's reference dir
    pub reference_audio: String,
}

impl VoiceProfile {
    fn builtin(name: &str, language: &str, engine: TtsEngine) -> Self {
        Self {
            name: name.to_string(),
            language: language.to_string(),
            engine,
            reference_audio: format!("{}.WAV", name),
        }
    }
}

/// Immutable table of voices, injected where voices are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceCatalog {
    voices: Vec<VoiceProfile>,
    reference_dir: Option<PathBuf>,
}

impl VoiceCatalog {
    pub fn new(voices: Vec<VoiceProfile>) -> Self {
        Self {
            voices,
            reference_dir: None,
        }
    }

    /// The voices served by the TTS service.
    pub fn builtin() -> Self {
        Self::new(vec![
            VoiceProfile::builtin("Charlotte", "en", TtsEngine::Chatterbox),
            VoiceProfile::builtin("Hamilton", "en", TtsEngine::Chatterbox),
            VoiceProfile::builtin("Noel", "es", TtsEngine::Xtts),
            VoiceProfile::builtin("Pilar", "es", TtsEngine::Xtts),
            VoiceProfile::builtin("Paulo", "pt", TtsEngine::Xtts),
            VoiceProfile::builtin("Ines", "pt", TtsEngine::Xtts),
        ])
    }

    /// Resolve reference recordings against `dir`.
    pub fn with_reference_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reference_dir = Some(dir.into());
        self
    }

    /// Look up a voice by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&VoiceProfile> {
        self.voices
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
    }

    /// Full path of a voice's reference recording.
    pub fn reference_path(&self, voice: &VoiceProfile) -> PathBuf {
        match &self.reference_dir {
            Some(dir) => dir.join(&voice.reference_audio),
            None => Path::new(&voice.reference_audio).to_path_buf(),
        }
    }

    pub fn voices(&self) -> &[VoiceProfile] {
        &self.voices
    }
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = VoiceCatalog::builtin();
        let voice = catalog.get("paulo").unwrap();
        assert_eq!(voice.language, "pt");
        assert_eq!(voice.engine, TtsEngine::Xtts);
        assert!(catalog.get("nobody").is_none());
    }

    #[test]
    fn test_reference_path_uses_dir() {
        let catalog = VoiceCatalog::builtin().with_reference_dir("/voices");
        let voice = catalog.get("Charlotte").unwrap();
        assert_eq!(catalog.reference_path(voice), PathBuf::from("/voices/Charlotte.WAV"));
    }
}
