//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shorts_media::RetryPolicy;
use shorts_models::{Orientation, RenderDefaults};

/// What to do with jobs left `processing` by a previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Mark them failed so clients can re-render
    #[default]
    FailInterrupted,
    /// Report them and leave the records as they are
    Leave,
}

impl FromStr for RecoveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" | "fail_interrupted" => Ok(RecoveryPolicy::FailInterrupted),
            "leave" => Ok(RecoveryPolicy::Leave),
            other => Err(format!("unknown recovery policy: {}", other)),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root of the persisted job documents
    pub data_dir: PathBuf,
    /// Root of the audio and video caches
    pub cache_dir: PathBuf,
    /// Where rendered videos are written
    pub output_dir: PathBuf,
    /// Defaults merged into every job's configuration
    pub defaults: RenderDefaults,
    /// Directory holding the voices' reference recordings
    pub voice_reference_dir: Option<PathBuf>,
    /// TTS service base URL
    pub tts_url: String,
    /// Transcode synthesized WAV to MP3
    pub tts_transcode_mp3: bool,
    /// Pexels API key
    pub pexels_api_key: Option<String>,
    /// Render command line; the document and output paths are appended
    pub render_command: String,
    pub render_timeout: Duration,
    /// Retry policy shared by every collaborator client
    pub retry: RetryPolicy,
    /// Minimum interval between progress writes
    pub progress_interval: Duration,
    /// Shortest acceptable stock clip
    pub min_clip_secs: f64,
    /// Age after which cached downloads are removed by cleanup
    pub video_cache_ttl_hours: u64,
    /// Seed for fallback ordering and music choice; random when unset
    pub random_seed: Option<u64>,
    pub recovery: RecoveryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            cache_dir: data_dir.join("cache"),
            output_dir: data_dir.join("output"),
            data_dir,
            defaults: RenderDefaults::default(),
            voice_reference_dir: None,
            tts_url: "http://localhost:5003/".to_string(),
            tts_transcode_mp3: false,
            pexels_api_key: None,
            render_command: "shorts-render".to_string(),
            render_timeout: Duration::from_secs(1800),
            retry: RetryPolicy::default(),
            progress_interval: Duration::from_millis(500),
            min_clip_secs: 3.0,
            video_cache_ttl_hours: 72,
            random_seed: None,
            recovery: RecoveryPolicy::FailInterrupted,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let base = Self::default();
        let data_dir = env_opt("SHORTS_DATA_DIR").map(PathBuf::from).unwrap_or(base.data_dir);

        let orientation = match env_opt("SHORTS_ORIENTATION").as_deref() {
            Some("landscape") => Orientation::Landscape,
            Some("square") => Orientation::Square,
            Some("portrait") => Orientation::Portrait,
            _ => base.defaults.orientation,
        };
        let defaults = RenderDefaults {
            orientation,
            voice: env_opt("SHORTS_DEFAULT_VOICE").unwrap_or(base.defaults.voice),
            language: env_opt("SHORTS_DEFAULT_LANGUAGE").unwrap_or(base.defaults.language),
            padding_back_ms: env_or("SHORTS_PADDING_BACK_MS", base.defaults.padding_back_ms),
            ..base.defaults
        };

        let retry = RetryPolicy::default()
            .with_max_retries(env_or("SHORTS_RETRY_MAX", base.retry.max_retries))
            .with_base_delay(Duration::from_millis(env_or("SHORTS_RETRY_BASE_DELAY_MS", 250)))
            .with_max_delay(Duration::from_millis(env_or("SHORTS_RETRY_MAX_DELAY_MS", 5000)));

        Self {
            cache_dir: env_opt("SHORTS_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("cache")),
            output_dir: env_opt("SHORTS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("output")),
            data_dir,
            defaults,
            voice_reference_dir: env_opt("TTS_REFERENCE_DIR").map(PathBuf::from),
            tts_url: env_opt("TTS_URL").unwrap_or(base.tts_url),
            tts_transcode_mp3: env_or("TTS_TRANSCODE_MP3", base.tts_transcode_mp3),
            pexels_api_key: env_opt("PEXELS_API_KEY"),
            render_command: env_opt("RENDER_COMMAND").unwrap_or(base.render_command),
            render_timeout: Duration::from_secs(env_or("RENDER_TIMEOUT_SECS", 1800)),
            retry,
            progress_interval: Duration::from_millis(env_or("PROGRESS_INTERVAL_MS", 500)),
            min_clip_secs: env_or("MIN_CLIP_SECS", base.min_clip_secs),
            video_cache_ttl_hours: env_or("VIDEO_CACHE_TTL_HOURS", base.video_cache_ttl_hours),
            random_seed: env_opt("RANDOM_SEED").and_then(|s| s.parse().ok()),
            recovery: env_or("RECOVERY_POLICY", base.recovery),
        }
    }

    pub fn audio_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("audio")
    }

    pub fn video_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("videos")
    }

    /// Scratch space for synthesized audio before it enters the cache.
    pub fn tts_scratch_dir(&self) -> PathBuf {
        self.cache_dir.join("tmp")
    }
}
