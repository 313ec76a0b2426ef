//! Job payloads carried by the pipeline queues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shorts_models::JobId;

/// A payload that belongs to one pipeline job.
pub trait QueuedJob: Send + 'static {
    fn job_id(&self) -> &JobId;

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}

/// Resolve a job's scenes and produce its render document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareJob {
    pub job_id: JobId,
    /// Set when re-entering the pipeline from a terminal state
    #[serde(default)]
    pub rerender: bool,
    pub enqueued_at: DateTime<Utc>,
}

impl PrepareJob {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            rerender: false,
            enqueued_at: Utc::now(),
        }
    }

    pub fn rerender(job_id: JobId) -> Self {
        Self {
            rerender: true,
            ..Self::new(job_id)
        }
    }
}

impl QueuedJob for PrepareJob {
    fn job_id(&self) -> &JobId {
        &self.job_id
    }

    fn kind(&self) -> &'static str {
        "prepare"
    }
}

/// Render a persisted render document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderJob {
    pub job_id: JobId,
    pub enqueued_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            enqueued_at: Utc::now(),
        }
    }
}

impl QueuedJob for RenderJob {
    fn job_id(&self) -> &JobId {
        &self.job_id
    }

    fn kind(&self) -> &'static str {
        "render"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_job_serialization() {
        let job = PrepareJob::rerender(JobId::from("j1"));
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"rerender\":true"));

        let parsed: PrepareJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, job);
        assert_eq!(parsed.kind(), "prepare");
    }
}
