//! Media collaborators for the shorts pipeline.
//!
//! Every external tool sits behind an `async_trait` seam:
//! - [`SpeechSynthesizer`]: TTS over HTTP
//! - [`FootageSearch`]: stock footage search and lookup (Pexels)
//! - [`MediaDownloader`]: streamed HTTP downloads
//! - [`DurationProbe`]: ffprobe durations
//! - [`AudioTranscoder`]: ffmpeg MP3 encoding
//! - [`Renderer`]: the external render command
//!
//! Transient failures are retried by an injected [`RetryPolicy`].

pub mod download;
pub mod encode;
pub mod error;
pub mod footage;
pub mod fs_utils;
pub mod metrics;
pub mod probe;
pub mod render;
pub mod retry;
pub mod tts;

pub use download::{HttpDownloader, MediaDownloader};
pub use encode::{AudioTranscoder, FfmpegTranscoder};
pub use error::{MediaError, MediaResult};
pub use footage::{pexels_id_from_url, ClipQuery, FootageSearch, PexelsClient, PexelsConfig};
pub use fs_utils::{copy_atomic, move_file, write_atomic};
pub use probe::{DurationProbe, FfprobeDurationProbe};
pub use render::{parse_progress_line, CommandRenderer, ProgressCallback, Renderer};
pub use retry::RetryPolicy;
pub use tts::{HttpTtsClient, SpeechRequest, SpeechSynthesizer, Synthesis, TtsClientConfig, TtsHealth};

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<std::path::PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<std::path::PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
