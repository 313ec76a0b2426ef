//! Persisted job status records.
//!
//! A record follows `pending -> processing -> {ready | failed}`. Progress and
//! stage updates recur while processing. Terminal records are sticky until an
//! explicit new processing cycle is started.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, not yet picked up
    #[default]
    Pending,
    /// Preparing assets or rendering
    Processing,
    /// Output video is available
    Ready,
    /// Job failed or was deleted
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Ready => "ready",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Failed)
    }

    /// Whether a record in `self` may move to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(
                next,
                JobStatus::Pending | JobStatus::Processing | JobStatus::Failed
            ),
            JobStatus::Processing => matches!(
                next,
                JobStatus::Processing | JobStatus::Ready | JobStatus::Failed
            ),
            JobStatus::Ready | JobStatus::Failed => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Render stage label derived from renderer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    Initializing,
    ProcessingFrames,
    Encoding,
    Finalizing,
}

impl RenderStage {
    /// Map a renderer fraction (0.0..=1.0) to its stage.
    pub fn from_fraction(fraction: f64) -> Self {
        if fraction.is_nan() || fraction < 0.05 {
            RenderStage::Initializing
        } else if fraction < 0.8 {
            RenderStage::ProcessingFrames
        } else if fraction < 0.95 {
            RenderStage::Encoding
        } else {
            RenderStage::Finalizing
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RenderStage::Initializing => "Initializing",
            RenderStage::ProcessingFrames => "Processing frames",
            RenderStage::Encoding => "Encoding",
            RenderStage::Finalizing => "Finalizing",
        }
    }
}

impl std::fmt::Display for RenderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Rejected status transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Current state of one job, as polled by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusRecord {
    pub status: JobStatus,
    /// Progress percentage (0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Current stage label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error message if the job failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Estimated seconds until completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self::pending()
    }
}

impl StatusRecord {
    /// The record reported for unknown jobs.
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            progress: None,
            stage: None,
            message: None,
            error: None,
            eta_seconds: None,
            started_at: None,
            updated_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge a patch into this record.
    ///
    /// Only fields present in the patch change, apart from the lifecycle
    /// timestamps: `started_at` is set on first entry into processing and
    /// `completed_at` on entry into a terminal state.
    pub fn apply(&mut self, patch: StatusPatch, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(TransitionError {
                    from: self.status,
                    to: next,
                });
            }
            if next == JobStatus::Processing && self.started_at.is_none() {
                self.started_at = Some(now);
            }
            if next.is_terminal() {
                self.completed_at = Some(now);
            }
            self.status = next;
        } else if self.status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: self.status,
            });
        }

        if let Some(progress) = patch.progress {
            self.progress = Some(progress.min(100));
        }
        if patch.stage.is_some() {
            self.stage = patch.stage;
        }
        if patch.message.is_some() {
            self.message = patch.message;
        }
        if patch.error.is_some() {
            self.error = patch.error;
        }
        if patch.eta_seconds.is_some() {
            self.eta_seconds = patch.eta_seconds;
        }
        self.updated_at = Some(now);
        Ok(())
    }

    /// Start a new processing cycle, whatever the current state.
    ///
    /// Clears the completion timestamp and every per-cycle field.
    pub fn begin_cycle(&mut self, message: Option<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.progress = None;
        self.stage = None;
        self.message = message;
        self.error = None;
        self.eta_seconds = None;
        self.started_at = Some(now);
        self.completed_at = None;
        self.updated_at = Some(now);
    }
}

/// Partial update of a status record. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub stage: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub eta_seconds: Option<u64>,
}

impl StatusPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_eta(mut self, eta_seconds: u64) -> Self {
        self.eta_seconds = Some(eta_seconds);
        self
    }

    /// Terminal failure with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
