//! Synthesized narration cache.
//!
//! Keyed by the normalized text and the voice triple (voice, language,
//! reference audio). Entries never expire; a forced regeneration replaces
//! the entry in place once the new audio is ready.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use shorts_media::fs_utils::{copy_atomic, write_atomic};
use shorts_media::{DurationProbe, MediaError, SpeechRequest, SpeechSynthesizer};
use shorts_models::{VoiceConfig, WordTiming};
use shorts_storage::KeyedMutex;

use super::hash_key;
use crate::error::WorkerResult;
use crate::metrics::{record_cache_lookup, AUDIO_CACHE};

/// A cached narration clip.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAudio {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub word_timings: Option<Vec<WordTiming>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AudioSidecar {
    /// Audio file name inside the cache directory
    file: String,
    text: String,
    voice: VoiceConfig,
    #[serde(default)]
    duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    word_timings: Option<Vec<WordTiming>>,
    created_at: DateTime<Utc>,
}

/// Trim and collapse internal whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable cache key for a narration request.
pub fn audio_cache_key(text: &str, voice: &VoiceConfig) -> String {
    let normalized = normalize_text(text);
    hash_key(&[
        &normalized,
        &voice.voice,
        &voice.language,
        voice.reference_audio.as_deref().unwrap_or(""),
    ])
}

fn valid_duration(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0
}

pub struct AudioCache {
    dir: PathBuf,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    probe: Arc<dyn DurationProbe>,
    locks: KeyedMutex,
}

impl AudioCache {
    pub async fn open(
        dir: impl Into<PathBuf>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        probe: Arc<dyn DurationProbe>,
    ) -> WorkerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            synthesizer,
            probe,
            locks: KeyedMutex::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Cached narration for `text`, synthesizing it on a miss.
    ///
    /// Identical concurrent requests wait for one synthesis. With `force`
    /// the cached entry is ignored and overwritten.
    pub async fn get_or_synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
        force: bool,
    ) -> WorkerResult<CachedAudio> {
        let key = audio_cache_key(text, voice);
        let _guard = self.locks.lock(&key).await;

        if !force {
            match self.read_entry(&key).await {
                Ok(Some(cached)) => {
                    record_cache_lookup(AUDIO_CACHE, true);
                    debug!(key = %key, "Audio cache hit");
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, "Unreadable audio cache entry, regenerating: {}", e),
            }
        }
        record_cache_lookup(AUDIO_CACHE, false);

        self.synthesize_into(&key, text, voice).await
    }

    async fn read_entry(&self, key: &str) -> WorkerResult<Option<CachedAudio>> {
        let sidecar_path = self.sidecar_path(key);
        let bytes = match fs::read(&sidecar_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut sidecar: AudioSidecar = serde_json::from_slice(&bytes)?;

        let path = self.dir.join(&sidecar.file);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let duration_secs = match sidecar.duration_secs.filter(|d| valid_duration(*d)) {
            Some(duration) => duration,
            None => {
                let duration = self.probe.duration(&path).await?;
                sidecar.duration_secs = Some(duration);
                // Best effort; the next hit probes again if this fails.
                if let Err(e) = write_atomic(&sidecar_path, &serde_json::to_vec_pretty(&sidecar)?).await {
                    debug!(key = %key, "Could not update audio sidecar: {}", e);
                }
                duration
            }
        };

        Ok(Some(CachedAudio {
            path,
            duration_secs,
            word_timings: sidecar.word_timings,
        }))
    }

    async fn synthesize_into(&self, key: &str, text: &str, voice: &VoiceConfig) -> WorkerResult<CachedAudio> {
        let normalized = normalize_text(text);
        let synthesis = self
            .synthesizer
            .synthesize(&SpeechRequest::new(normalized.clone(), voice.clone()))
            .await?;

        let duration_secs = match synthesis.duration_secs.filter(|d| valid_duration(*d)) {
            Some(duration) => duration,
            None => self.probe.duration(&synthesis.audio_path).await?,
        };
        if !valid_duration(duration_secs) {
            return Err(MediaError::invalid_duration(synthesis.audio_path.clone(), duration_secs).into());
        }

        let extension = synthesis
            .audio_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav")
            .to_string();
        let file = format!("{}.{}", key, extension);
        let path = self.dir.join(&file);

        copy_atomic(&synthesis.audio_path, &path).await?;
        if synthesis.audio_path != path {
            let _ = fs::remove_file(&synthesis.audio_path).await;
        }

        let sidecar = AudioSidecar {
            file,
            text: normalized,
            voice: voice.clone(),
            duration_secs: Some(duration_secs),
            word_timings: synthesis.word_timings.clone(),
            created_at: Utc::now(),
        };
        write_atomic(&self.sidecar_path(key), &serde_json::to_vec_pretty(&sidecar)?).await?;

        info!(key = %key, duration_secs, voice = %voice.voice, "Cached synthesized audio");
        Ok(CachedAudio {
            path,
            duration_secs,
            word_timings: synthesis.word_timings,
        })
    }
}

impl std::fmt::Debug for AudioCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCache").field("dir", &self.dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use async_trait::async_trait;
    use shorts_media::{MediaResult, Synthesis};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingSynth {
        dir: PathBuf,
        calls: AtomicUsize,
        duration: Option<f64>,
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynth {
        async fn synthesize(&self, request: &SpeechRequest) -> MediaResult<Synthesis> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let path = self.dir.join(format!("synth-{}.wav", n));
            tokio::fs::write(&path, request.text.as_bytes()).await?;
            Ok(Synthesis {
                audio_path: path,
                duration_secs: self.duration,
                word_timings: None,
            })
        }
    }

    struct FixedProbe(f64);

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn duration(&self, _path: &Path) -> MediaResult<f64> {
            Ok(self.0)
        }
    }

    fn voice() -> VoiceConfig {
        VoiceConfig {
            voice: "Charlotte".into(),
            language: "en".into(),
            reference_audio: Some("Charlotte.WAV".into()),
        }
    }

    async fn cache(dir: &TempDir, duration: Option<f64>, probed: f64) -> (AudioCache, Arc<CountingSynth>) {
        let scratch = dir.path().join("scratch");
        tokio::fs::create_dir_all(&scratch).await.unwrap();
        let synth = Arc::new(CountingSynth {
            dir: scratch,
            calls: AtomicUsize::new(0),
            duration,
        });
        let cache = AudioCache::open(dir.path().join("audio"), synth.clone(), Arc::new(FixedProbe(probed)))
            .await
            .unwrap();
        (cache, synth)
    }

    #[test]
    fn test_key_ignores_whitespace_differences() {
        let v = voice();
        assert_eq!(audio_cache_key("  Hello   world ", &v), audio_cache_key("Hello world", &v));
        assert_ne!(audio_cache_key("Hello world", &v), audio_cache_key("Hello world!", &v));

        let other = VoiceConfig {
            language: "pt".into(),
            ..voice()
        };
        assert_ne!(audio_cache_key("Hello", &v), audio_cache_key("Hello", &other));
    }

    #[tokio::test]
    async fn test_concurrent_requests_synthesize_once() {
        let dir = TempDir::new().unwrap();
        let (cache, synth) = cache(&dir, Some(3.0), 1.0).await;
        let v = voice();

        let (a, b) = tokio::join!(
            cache.get_or_synthesize("Hello world", &v, false),
            cache.get_or_synthesize("Hello  world", &v, false)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(a.duration_secs, 3.0);
        assert!(a.path.starts_with(dir.path().join("audio")));
    }

    #[tokio::test]
    async fn test_force_regenerates() {
        let dir = TempDir::new().unwrap();
        let (cache, synth) = cache(&dir, Some(2.0), 1.0).await;
        let v = voice();

        cache.get_or_synthesize("Hello", &v, false).await.unwrap();
        cache.get_or_synthesize("Hello", &v, true).await.unwrap();
        cache.get_or_synthesize("Hello", &v, false).await.unwrap();

        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_duration_is_probed() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = cache(&dir, None, 4.5).await;

        let cached = cache.get_or_synthesize("Hello", &voice(), false).await.unwrap();
        assert_eq!(cached.duration_secs, 4.5);
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_falls_back_to_synthesis() {
        let dir = TempDir::new().unwrap();
        let (cache, synth) = cache(&dir, Some(2.0), 1.0).await;
        let v = voice();

        cache.get_or_synthesize("Hello", &v, false).await.unwrap();
        let sidecar = cache.sidecar_path(&audio_cache_key("Hello", &v));
        tokio::fs::write(&sidecar, b"{not json").await.unwrap();

        let cached = cache.get_or_synthesize("Hello", &v, false).await.unwrap();
        assert_eq!(cached.duration_secs, 2.0);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_duration_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = cache(&dir, None, 0.0).await;

        let err = cache.get_or_synthesize("Hello", &voice(), false).await.unwrap_err();
        assert!(matches!(err, WorkerError::Media(_)));
    }
}
