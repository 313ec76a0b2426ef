//! Pipeline metrics.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "shorts_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "shorts_cache_misses_total";

    pub const JOBS_SUBMITTED_TOTAL: &str = "shorts_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "shorts_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "shorts_jobs_failed_total";

    pub const STAGE_DURATION_SECONDS: &str = "shorts_stage_duration_seconds";
}

pub const AUDIO_CACHE: &str = "audio";
pub const VIDEO_CACHE: &str = "video";

pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    if hit {
        counter!(names::CACHE_HITS_TOTAL, "cache" => cache).increment(1);
    } else {
        counter!(names::CACHE_MISSES_TOTAL, "cache" => cache).increment(1);
    }
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_job_failed(stage: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "stage" => stage).increment(1);
}

pub fn record_stage_duration(stage: &'static str, seconds: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(seconds);
}
