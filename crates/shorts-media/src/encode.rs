//! Audio transcoding with FFmpeg.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Converts synthesized audio into the format the renderer consumes.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    /// Encode `input` into MP3 at `output`.
    async fn encode(&self, input: &Path, output: &Path) -> MediaResult<()>;
}

/// FFmpeg-backed MP3 encoder.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    bitrate: String,
    sample_rate: u32,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            bitrate: "192k".to_string(),
            sample_rate: 44_100,
        }
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.bitrate = bitrate.into();
        self
    }

    /// Arguments for one transcode.
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn encode(&self, input: &Path, output: &Path) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = self.build_args(input, output);
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let result = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if result.status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "audio transcode failed",
                Some(String::from_utf8_lossy(&result.stderr).to_string()),
                result.status.code(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let args = FfmpegTranscoder::new()
            .with_bitrate("128k")
            .build_args(Path::new("in.wav"), Path::new("out.mp3"));

        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert!(args.windows(2).any(|w| w == ["-b:a", "128k"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "libmp3lame"]));
        assert_eq!(args.last().map(String::as_str), Some("out.mp3"));
    }
}
