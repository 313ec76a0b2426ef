//! Render progress reporting.
//!
//! The renderer reports fractions from a synchronous callback, often many
//! times per second. The reporter keeps only the latest value and a single
//! writer task persists it through the status store at a bounded rate.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use shorts_models::{JobId, RenderStage};
use shorts_storage::StatusStore;

/// A persisted progress sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub percent: u8,
    pub stage: RenderStage,
    pub eta_seconds: Option<u64>,
}

impl ProgressSample {
    /// Derive percent, stage and ETA from a fraction and the time spent so far.
    pub fn from_fraction(fraction: f64, elapsed: Duration) -> Self {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let percent = (fraction * 100.0).floor() as u8;
        let eta_seconds = (fraction >= 0.01 && fraction < 1.0)
            .then(|| (elapsed.as_secs_f64() * (1.0 - fraction) / fraction).round() as u64);

        Self {
            percent,
            stage: RenderStage::from_fraction(fraction),
            eta_seconds,
        }
    }
}

/// Forwards renderer progress into the status store.
pub struct ProgressReporter {
    tx: watch::Sender<Option<f64>>,
    writer: JoinHandle<()>,
}

impl ProgressReporter {
    /// Spawn the writer task for `job_id`. Writes happen at most once per
    /// `min_interval`, and only when percent or stage moved forward.
    pub fn start(statuses: Arc<StatusStore>, job_id: JobId, min_interval: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        let writer = tokio::spawn(write_progress(statuses, job_id, rx, min_interval));
        Self { tx, writer }
    }

    /// Callback suitable for a renderer.
    pub fn callback(&self) -> Arc<dyn Fn(f64) + Send + Sync> {
        let tx = self.tx.clone();
        Arc::new(move |fraction| {
            let _ = tx.send(Some(fraction));
        })
    }

    /// Flush the last sample and stop the writer.
    pub async fn finish(self) {
        let Self { tx, writer } = self;
        drop(tx);
        let _ = writer.await;
    }
}

async fn write_progress(
    statuses: Arc<StatusStore>,
    job_id: JobId,
    mut rx: watch::Receiver<Option<f64>>,
    min_interval: Duration,
) {
    let started = Instant::now();
    let mut last: Option<ProgressSample> = None;

    // Callbacks hold sender clones, so this also ends once every one is dropped.
    while rx.changed().await.is_ok() {
        let Some(fraction) = *rx.borrow_and_update() else {
            continue;
        };
        let sample = ProgressSample::from_fraction(fraction, started.elapsed());

        let advanced = match last {
            None => true,
            Some(prev) => sample.percent > prev.percent || sample.stage > prev.stage,
        };
        if !advanced {
            continue;
        }

        let result = statuses
            .set_progress(
                &job_id,
                sample.percent,
                Some(sample.stage.label().to_string()),
                sample.eta_seconds,
            )
            .await;
        if let Err(e) = result {
            // Terminal records reject progress, e.g. after the job was deleted.
            debug!(job_id = %job_id, "Stopping progress updates: {}", e);
            break;
        }
        last = Some(sample);

        tokio::time::sleep(min_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shorts_models::JobStatus;
    use shorts_storage::MemoryStore;

    #[test]
    fn test_sample_from_fraction() {
        let sample = ProgressSample::from_fraction(0.5, Duration::from_secs(10));
        assert_eq!(sample.percent, 50);
        assert_eq!(sample.stage, RenderStage::ProcessingFrames);
        assert_eq!(sample.eta_seconds, Some(10));

        let done = ProgressSample::from_fraction(1.0, Duration::from_secs(10));
        assert_eq!(done.percent, 100);
        assert_eq!(done.stage, RenderStage::Finalizing);
        assert_eq!(done.eta_seconds, None);

        let start = ProgressSample::from_fraction(f64::NAN, Duration::ZERO);
        assert_eq!(start.percent, 0);
        assert_eq!(start.stage, RenderStage::Initializing);
    }

    #[tokio::test]
    async fn test_reporter_writes_latest_progress() {
        let statuses = Arc::new(StatusStore::new(Arc::new(MemoryStore::new())));
        let id = JobId::from("job");
        statuses
            .set_status(&id, JobStatus::Processing, None, None, None)
            .await
            .unwrap();

        let reporter = ProgressReporter::start(Arc::clone(&statuses), id.clone(), Duration::from_millis(1));
        let callback = reporter.callback();
        for fraction in [0.1, 0.2, 0.85] {
            callback(fraction);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        drop(callback);
        reporter.finish().await;

        let record = statuses.get_status(&id).await;
        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(record.progress, Some(85));
        assert_eq!(record.stage.as_deref(), Some("Encoding"));
    }

    #[tokio::test]
    async fn test_reporter_stops_on_terminal_record() {
        let statuses = Arc::new(StatusStore::new(Arc::new(MemoryStore::new())));
        let id = JobId::from("gone");
        statuses.terminate(&id, "Job deleted").await.unwrap();

        let reporter = ProgressReporter::start(Arc::clone(&statuses), id.clone(), Duration::from_millis(1));
        (reporter.callback())(0.5);
        reporter.finish().await;

        let record = statuses.get_status(&id).await;
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.progress, None);
    }
}
