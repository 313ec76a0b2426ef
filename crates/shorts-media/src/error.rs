//! Error types for media collaborators.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors raised by media collaborators.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Renderer command not found: {0}")]
    RendererNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Render failed: {message}")]
    RenderFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("HTTP {status} from {service}: {message}")]
    Http {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid duration for {path}: {value}")]
    InvalidDuration { path: PathBuf, value: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn render_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::RenderFailed {
            message: message.into(),
            exit_code,
        }
    }

    pub fn synthesis_failed(message: impl Into<String>) -> Self {
        Self::SynthesisFailed(message.into())
    }

    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn http(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            service,
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_duration(path: impl Into<PathBuf>, value: impl std::fmt::Display) -> Self {
        Self::InvalidDuration {
            path: path.into(),
            value: value.to_string(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Check if the error is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaError::Network(e) => !e.is_builder() && !e.is_decode(),
            MediaError::Http { status, .. } => *status == 429 || *status >= 500,
            MediaError::Timeout(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MediaError::http("pexels", 503, "unavailable").is_retryable());
        assert!(MediaError::http("pexels", 429, "slow down").is_retryable());
        assert!(!MediaError::http("pexels", 404, "missing").is_retryable());
        assert!(MediaError::Timeout(30).is_retryable());
        assert!(!MediaError::not_found("clip").is_retryable());
        assert!(!MediaError::invalid_duration("/a.wav", f64::NAN).is_retryable());
    }
}
