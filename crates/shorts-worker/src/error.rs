//! Worker error types.

use thiserror::Error;

use shorts_models::{JobId, JobStatus, ValidationError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("No videos found for scene {scene} (searched: {terms})")]
    NoVideosFound { scene: usize, terms: String },

    #[error("Scene {scene} needs {needed} clips but only {found} were found")]
    CountMismatch {
        scene: usize,
        needed: usize,
        found: usize,
    },

    #[error("Invalid audio duration for scene {scene} part {part}: {value}")]
    InvalidDuration { scene: usize, part: usize, value: f64 },

    #[error("Job {job_id} is {status}; only ready or failed jobs can be re-rendered")]
    InvalidState { job_id: JobId, status: JobStatus },

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Storage error: {0}")]
    Storage(#[from] shorts_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] shorts_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] shorts_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    /// Errors caused by the job's own content rather than infrastructure.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            WorkerError::NoVideosFound { .. }
                | WorkerError::CountMismatch { .. }
                | WorkerError::InvalidDuration { .. }
        )
    }
}
