//! Media duration probing.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Reads the playback duration of a media file.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds. Missing, zero or non-finite durations are errors.
    async fn duration(&self, path: &Path) -> MediaResult<f64>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe backed by the `ffprobe` CLI.
#[derive(Debug, Clone, Default)]
pub struct FfprobeDurationProbe;

impl FfprobeDurationProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration(&self, path: &Path) -> MediaResult<f64> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

        let output = Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::FfprobeFailed {
                message: format!("ffprobe exited with {}", output.status),
                stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
            });
        }

        let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let duration = parse_duration(path, probe.format.duration.as_deref())?;
        debug!(path = %path.display(), duration, "Probed duration");
        Ok(duration)
    }
}

/// Parse and validate an ffprobe duration string.
fn parse_duration(path: &Path, raw: Option<&str>) -> MediaResult<f64> {
    let raw = raw.ok_or_else(|| MediaError::invalid_duration(path, "missing"))?;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| MediaError::invalid_duration(path, raw))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(MediaError::invalid_duration(path, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        let path = Path::new("a.mp3");
        assert!((parse_duration(path, Some("3.250000")).unwrap() - 3.25).abs() < 1e-9);
        assert!(parse_duration(path, None).is_err());
        assert!(parse_duration(path, Some("N/A")).is_err());
        assert!(parse_duration(path, Some("0.000000")).is_err());
        assert!(parse_duration(path, Some("nan")).is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = FfprobeDurationProbe::new()
            .duration(Path::new("/definitely/not/here.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
