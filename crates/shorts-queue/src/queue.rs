//! Single-worker FIFO job queue.
//!
//! Each queue owns one worker task that takes jobs in submission order and
//! runs them one at a time. Every job runs in its own spawned task, so a
//! panicking handler only loses that job and the loop moves on.

use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

use shorts_models::JobId;

use crate::error::{QueueError, QueueResult};
use crate::job::QueuedJob;

/// Processes jobs taken off a [`JobQueue`].
#[async_trait]
pub trait JobHandler<T>: Send + Sync + 'static {
    /// Run one job to completion. Failures are recorded by the handler.
    async fn handle(&self, job: T);

    /// Called when `handle` panicked.
    async fn on_crash(&self, job_id: &JobId, message: String);
}

#[derive(Debug)]
struct QueueState {
    waiting: AtomicUsize,
    processing: AtomicBool,
    /// Jobs enqueued but not yet finished
    outstanding: watch::Sender<usize>,
}

/// In-process FIFO queue drained by a single worker.
pub struct JobQueue<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<T>,
    state: Arc<QueueState>,
    worker: JoinHandle<()>,
}

impl<T: QueuedJob> JobQueue<T> {
    /// Start the worker task. Must be called inside a tokio runtime.
    pub fn start<H>(name: &'static str, handler: Arc<H>) -> Self
    where
        H: JobHandler<T>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0usize);
        let state = Arc::new(QueueState {
            waiting: AtomicUsize::new(0),
            processing: AtomicBool::new(false),
            outstanding,
        });

        let worker = tokio::spawn(run_worker(name, rx, handler, Arc::clone(&state)));
        info!(queue = name, "Queue worker started");

        Self {
            name,
            tx,
            state,
            worker,
        }
    }

    /// Append a job to the queue.
    pub fn enqueue(&self, job: T) -> QueueResult<()> {
        let job_id = job.job_id().clone();
        let kind = job.kind();

        self.state.waiting.fetch_add(1, Ordering::SeqCst);
        self.state.outstanding.send_modify(|n| *n += 1);

        if self.tx.send(job).is_err() {
            self.state.waiting.fetch_sub(1, Ordering::SeqCst);
            self.state.outstanding.send_modify(|n| *n = n.saturating_sub(1));
            return Err(QueueError::Closed(self.name));
        }

        debug!(queue = self.name, job_id = %job_id, kind, depth = self.depth(), "Enqueued job");
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Jobs waiting to be picked up.
    pub fn depth(&self) -> usize {
        self.state.waiting.load(Ordering::SeqCst)
    }

    /// Whether the worker is running a job right now.
    pub fn is_processing(&self) -> bool {
        self.state.processing.load(Ordering::SeqCst)
    }

    /// Wait until every enqueued job has finished.
    pub async fn wait_idle(&self) {
        let mut rx = self.state.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting jobs and wait for the queued ones to drain.
    pub async fn shutdown(self) {
        let Self { name, tx, worker, .. } = self;
        drop(tx);
        if let Err(e) = worker.await {
            error!(queue = name, "Queue worker ended abnormally: {}", e);
        }
        info!(queue = name, "Queue worker stopped");
    }
}

async fn run_worker<T, H>(
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<T>,
    handler: Arc<H>,
    state: Arc<QueueState>,
) where
    T: QueuedJob,
    H: JobHandler<T>,
{
    while let Some(job) = rx.recv().await {
        state.waiting.fetch_sub(1, Ordering::SeqCst);
        state.processing.store(true, Ordering::SeqCst);

        let job_id = job.job_id().clone();
        let span = tracing::info_span!("job", queue = name, job_id = %job_id, kind = job.kind());

        let task_handler = Arc::clone(&handler);
        let result = tokio::spawn(async move { task_handler.handle(job).await }.instrument(span)).await;

        if let Err(e) = result {
            let message = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                "job task was cancelled".to_string()
            };
            error!(queue = name, job_id = %job_id, "Job crashed: {}", message);
            handler.on_crash(&job_id, message).await;
        }

        state.processing.store(false, Ordering::SeqCst);
        state.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::RenderJob;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        handled: Mutex<Vec<String>>,
        crashed: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl JobHandler<RenderJob> for Recorder {
        async fn handle(&self, job: RenderJob) {
            if job.job_id.as_str() == "boom" {
                panic!("renderer exploded");
            }
            tokio::task::yield_now().await;
            self.handled.lock().await.push(job.job_id.to_string());
        }

        async fn on_crash(&self, job_id: &JobId, message: String) {
            self.crashed.lock().await.push((job_id.to_string(), message));
        }
    }

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let recorder = Arc::new(Recorder::default());
        let queue = JobQueue::start("render", Arc::clone(&recorder));

        for id in ["a", "b", "c"] {
            queue.enqueue(RenderJob::new(JobId::from(id))).unwrap();
        }
        queue.wait_idle().await;

        assert_eq!(*recorder.handled.lock().await, vec!["a", "b", "c"]);
        assert_eq!(queue.depth(), 0);
        assert!(!queue.is_processing());
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let recorder = Arc::new(Recorder::default());
        let queue = JobQueue::start("render", Arc::clone(&recorder));

        queue.enqueue(RenderJob::new(JobId::from("boom"))).unwrap();
        queue.enqueue(RenderJob::new(JobId::from("next"))).unwrap();
        queue.wait_idle().await;

        assert_eq!(*recorder.handled.lock().await, vec!["next"]);
        let crashed = recorder.crashed.lock().await;
        assert_eq!(crashed.len(), 1);
        assert_eq!(crashed[0].0, "boom");
        assert!(crashed[0].1.contains("renderer exploded"));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let recorder = Arc::new(Recorder::default());
        let queue = JobQueue::start("render", Arc::clone(&recorder));
        queue.enqueue(RenderJob::new(JobId::from("a"))).unwrap();

        queue.shutdown().await;
        assert_eq!(*recorder.handled.lock().await, vec!["a"]);
    }
}
