//! Per-stage job logging.
//!
//! A [`JobLogger`] lives for one pass of a job through a pipeline stage. It
//! tags every event with the job ID and stage name, and feeds the stage
//! duration and failure metrics when the pass ends.

use std::time::{Duration, Instant};
use tracing::{error, info, warn, Span};

use shorts_models::JobId;

use crate::metrics::{record_job_failed, record_stage_duration};

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    stage: &'static str,
    started: Instant,
}

impl JobLogger {
    /// Start timing `stage` ("prepare", "resolve" or "render") for a job.
    pub fn new(job_id: &JobId, stage: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            stage,
            started: Instant::now(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, stage = self.stage, "Stage started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, stage = self.stage, "{}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = self.stage, "{}", message);
    }

    /// Log a failed pass and count it against the stage.
    pub fn log_failure(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            stage = self.stage,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Stage failed: {}", message
        );
        record_job_failed(self.stage);
    }

    /// Log a successful pass and record how long it took.
    pub fn log_completion(&self, message: &str) -> Duration {
        let elapsed = self.elapsed();
        info!(
            job_id = %self.job_id,
            stage = self.stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "Stage completed: {}", message
        );
        record_stage_duration(self.stage, elapsed.as_secs_f64());
        elapsed
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Span for instrumenting the whole pass.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job_stage", job_id = %self.job_id, stage = self.stage)
    }
}
