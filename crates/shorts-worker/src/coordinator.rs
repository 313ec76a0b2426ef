//! Pipeline coordinator.
//!
//! Jobs flow through two independent single-worker FIFO queues:
//!
//! 1. **prepare**: resolve every scene (audio, footage, captions), pre-download
//!    clips, choose music, persist the render document and the updated scene
//!    inputs, then enqueue the render.
//! 2. **render**: run the renderer on the persisted document, forwarding
//!    progress into the status store.
//!
//! Any error fails the job with its message. A job is owned by the queues
//! from submission until its last handler finishes; deleting an owned job
//! tombstones it so that work is discarded instead of recorded.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn, Instrument};

use shorts_media::Renderer;
use shorts_models::{
    narration_ms, validate_scenes, JobConfig, JobDocument, JobId, JobStatus, MusicCatalog, RenderDocument,
    RenderStage, ResolvedScene, SceneInput, StatusPatch, StatusRecord, VoiceCatalog,
};
use shorts_queue::{JobHandler, JobQueue, PrepareJob, ProgressReporter, RenderJob};
use shorts_storage::{JobDocuments, KeyValueStore, StatusStore};

use crate::cache::{AudioCache, VideoCache};
use crate::collaborators::Collaborators;
use crate::config::{RecoveryPolicy, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::{record_job_completed, record_job_submitted};
use crate::music::MusicPicker;
use crate::resolver::SceneResolver;
use crate::search::FootageFinder;

pub const STAGE_QUEUED: &str = "Queued";
pub const STAGE_RESOLVING: &str = "Resolving scenes";
pub const STAGE_COMPLETE: &str = "Complete";

/// Error recorded on deleted jobs.
pub const DELETED_MESSAGE: &str = "Job deleted";
const INTERRUPTED_MESSAGE: &str = "Interrupted by a worker restart; re-render to retry";

/// Jobs the queues still own, and which of those were deleted.
///
/// Ownership is counted because a re-render can be queued before the
/// previous cycle's handler has released the job.
#[derive(Debug, Default)]
struct InFlight {
    owned: HashMap<JobId, usize>,
    deleted: HashSet<JobId>,
}

/// State shared by both queue handlers.
struct Pipeline {
    config: WorkerConfig,
    voices: VoiceCatalog,
    documents: JobDocuments,
    statuses: Arc<StatusStore>,
    resolver: SceneResolver,
    videos: Arc<VideoCache>,
    music: MusicPicker,
    renderer: Arc<dyn Renderer>,
    in_flight: RwLock<InFlight>,
}

impl Pipeline {
    fn output_path(&self, id: &JobId) -> PathBuf {
        self.config.output_dir.join(format!("{}.mp4", id))
    }

    async fn is_deleted(&self, id: &JobId) -> bool {
        self.in_flight.read().await.deleted.contains(id)
    }

    async fn claim(&self, id: &JobId) {
        *self.in_flight.write().await.owned.entry(id.clone()).or_default() += 1;
    }

    /// A handler is done with the job. The last release drops any tombstone.
    async fn release(&self, id: &JobId) {
        let mut in_flight = self.in_flight.write().await;
        let remaining = match in_flight.owned.get_mut(id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            in_flight.owned.remove(id);
            in_flight.deleted.remove(id);
        }
    }

    /// Tombstone an owned job. Returns `false` when no handler will see it.
    async fn tombstone(&self, id: &JobId) -> bool {
        let mut in_flight = self.in_flight.write().await;
        if in_flight.owned.contains_key(id) {
            in_flight.deleted.insert(id.clone());
            true
        } else {
            false
        }
    }

    /// Record a failure and release the job. A deleted job instead has
    /// anything it left behind removed.
    async fn fail(&self, id: &JobId, stage: &'static str, message: &str) {
        if self.is_deleted(id).await {
            let _ = tokio::fs::remove_file(self.output_path(id)).await;
        } else {
            JobLogger::new(id, stage).log_failure(message);
            if let Err(e) = self.statuses.set_error(id, message).await {
                warn!(job_id = %id, "Could not record failure: {}", e);
            }
        }
        self.release(id).await;
    }

    /// Returns `false` when the job was deleted and the result discarded.
    async fn prepare(&self, job: &PrepareJob, logger: &JobLogger) -> WorkerResult<bool> {
        let id = &job.job_id;
        if self.is_deleted(id).await {
            return Ok(false);
        }
        let Some(mut input) = self.documents.load_input(id).await? else {
            return if self.is_deleted(id).await {
                Ok(false)
            } else {
                Err(WorkerError::JobNotFound(id.clone()))
            };
        };

        let total = input.scenes.len();
        logger.log_start(&format!("resolving {} scenes (rerender: {})", total, job.rerender));
        self.statuses
            .set_status(
                id,
                JobStatus::Processing,
                Some(format!("Resolving {} scenes", total)),
                None,
                Some(STAGE_RESOLVING.to_string()),
            )
            .await?;

        let config = input.config.resolve(&self.config.defaults, &self.voices);
        let mut exclude = HashSet::new();
        let mut resolved = Vec::with_capacity(total);
        for (index, scene) in input.scenes.iter().enumerate() {
            if self.is_deleted(id).await {
                return Ok(false);
            }
            resolved.push(self.resolver.resolve(index, scene, &config, &mut exclude).await?);

            let message = format!("Resolved scene {} of {}", index + 1, total);
            logger.log_progress(&message);
            self.statuses
                .update(id, StatusPatch::default().with_message(message))
                .await?;
        }

        self.attach_local_copies(&mut resolved, logger).await;

        let total_ms = narration_ms(&resolved) + config.padding_back_ms;
        let music = self.music.select(config.music, total_ms, input.music.as_ref())?;
        let document = RenderDocument::new(id.clone(), &resolved, music.clone(), config);

        input.scenes = resolved
            .iter()
            .zip(&input.scenes)
            .map(|(scene, original)| scene.to_scene_input(original))
            .collect();
        input.music = Some(music);
        input.touch();

        if self.is_deleted(id).await {
            return Ok(false);
        }
        self.documents.save_render(&document).await?;
        self.documents.save_input(&input).await?;
        if self.is_deleted(id).await {
            self.documents.delete(id).await?;
            return Ok(false);
        }

        self.statuses
            .set_status(
                id,
                JobStatus::Processing,
                Some("Waiting for render".to_string()),
                None,
                Some(STAGE_QUEUED.to_string()),
            )
            .await?;
        logger.log_completion(&format!(
            "{} parts, {} ms narration, {} ms total",
            document.scenes.len(),
            document.content_duration_ms(),
            document.total_duration_ms
        ));
        Ok(true)
    }

    /// Pre-download every clip and point parts at their local copies.
    /// Failed downloads leave the part on its remote URL.
    async fn attach_local_copies(&self, resolved: &mut [ResolvedScene], logger: &JobLogger) {
        let mut seen = HashSet::new();
        let urls: Vec<String> = resolved
            .iter()
            .flat_map(|scene| scene.parts.iter())
            .map(|part| part.video.url.clone())
            .filter(|url| seen.insert(url.clone()))
            .collect();

        let mut local: HashMap<String, String> = HashMap::new();
        for (url, result) in self.videos.prefetch(&urls).await {
            match result {
                Ok(path) => {
                    local.insert(url, path.to_string_lossy().to_string());
                }
                Err(e) => logger.log_warning(&format!("pre-download of {} failed: {}", url, e)),
            }
        }

        for part in resolved.iter_mut().flat_map(|scene| scene.parts.iter_mut()) {
            part.video.local_path = local.get(&part.video.url).cloned();
        }
    }

    /// Returns `false` when the job was deleted and the result discarded.
    async fn render(&self, job: &RenderJob, logger: &JobLogger) -> WorkerResult<bool> {
        let id = &job.job_id;
        if self.is_deleted(id).await {
            return Ok(false);
        }
        let Some(document) = self.documents.load_render(id).await? else {
            return if self.is_deleted(id).await {
                Ok(false)
            } else {
                Err(WorkerError::JobNotFound(id.clone()))
            };
        };

        logger.log_start(&format!("{} parts", document.scenes.len()));
        self.statuses
            .set_status(
                id,
                JobStatus::Processing,
                Some("Rendering".to_string()),
                Some(0),
                Some(RenderStage::Initializing.label().to_string()),
            )
            .await?;

        let output = self.output_path(id);
        let reporter = ProgressReporter::start(
            Arc::clone(&self.statuses),
            id.clone(),
            self.config.progress_interval,
        );
        let result = self.renderer.render(&document, &output, reporter.callback()).await;
        reporter.finish().await;

        if self.is_deleted(id).await {
            let _ = tokio::fs::remove_file(&output).await;
            return Ok(false);
        }
        let path = result?;

        self.statuses
            .set_status(
                id,
                JobStatus::Ready,
                Some(format!("Rendered to {}", path.display())),
                Some(100),
                Some(STAGE_COMPLETE.to_string()),
            )
            .await?;
        logger.log_completion(&path.display().to_string());
        Ok(true)
    }
}

struct PrepareHandler {
    pipeline: Arc<Pipeline>,
    render_queue: Arc<JobQueue<RenderJob>>,
}

#[async_trait]
impl JobHandler<PrepareJob> for PrepareHandler {
    async fn handle(&self, job: PrepareJob) {
        let logger = JobLogger::new(&job.job_id, "prepare");

        let prepared = self
            .pipeline
            .prepare(&job, &logger)
            .instrument(logger.create_span())
            .await;
        match prepared {
            Ok(true) => {
                if let Err(e) = self.render_queue.enqueue(RenderJob::new(job.job_id.clone())) {
                    self.pipeline.fail(&job.job_id, "prepare", &e.to_string()).await;
                }
            }
            Ok(false) => {
                logger.log_warning("job was deleted, discarding preparation");
                self.pipeline.release(&job.job_id).await;
            }
            Err(e) => {
                let stage = if e.is_resolution_error() { "resolve" } else { "prepare" };
                self.pipeline.fail(&job.job_id, stage, &e.to_string()).await
            }
        }
    }

    async fn on_crash(&self, job_id: &JobId, message: String) {
        self.pipeline
            .fail(job_id, "prepare", &format!("Internal error: {}", message))
            .await;
    }
}

struct RenderHandler {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl JobHandler<RenderJob> for RenderHandler {
    async fn handle(&self, job: RenderJob) {
        let logger = JobLogger::new(&job.job_id, "render");

        let rendered = self
            .pipeline
            .render(&job, &logger)
            .instrument(logger.create_span())
            .await;
        match rendered {
            Ok(true) => {
                record_job_completed();
                self.pipeline.release(&job.job_id).await;
            }
            Ok(false) => {
                logger.log_warning("job was deleted, discarding render");
                self.pipeline.release(&job.job_id).await;
            }
            Err(e) => self.pipeline.fail(&job.job_id, "render", &e.to_string()).await,
        }
    }

    async fn on_crash(&self, job_id: &JobId, message: String) {
        self.pipeline
            .fail(job_id, "render", &format!("Internal error: {}", message))
            .await;
    }
}

/// Entry point for submitting, re-rendering, deleting and observing jobs.
pub struct PipelineCoordinator {
    pipeline: Arc<Pipeline>,
    prepare_queue: JobQueue<PrepareJob>,
    render_queue: Arc<JobQueue<RenderJob>>,
}

impl PipelineCoordinator {
    /// Open the caches and start both queue workers.
    pub async fn new(
        config: WorkerConfig,
        store: Arc<dyn KeyValueStore>,
        collaborators: Collaborators,
        music: MusicCatalog,
        voices: VoiceCatalog,
    ) -> WorkerResult<Self> {
        tokio::fs::create_dir_all(&config.output_dir).await?;

        let audio = Arc::new(
            AudioCache::open(
                config.audio_cache_dir(),
                collaborators.synthesizer,
                collaborators.probe,
            )
            .await?,
        );
        let videos = Arc::new(VideoCache::open(config.video_cache_dir(), collaborators.downloader).await?);
        let finder = Arc::new(FootageFinder::new(
            collaborators.footage,
            config.random_seed,
            config.min_clip_secs,
        ));
        let music = MusicPicker::new(music, config.random_seed.map(|s| s.wrapping_add(1)));

        let pipeline = Arc::new(Pipeline {
            documents: JobDocuments::new(Arc::clone(&store)),
            statuses: Arc::new(StatusStore::new(store)),
            resolver: SceneResolver::new(audio, finder),
            videos,
            music,
            renderer: collaborators.renderer,
            voices,
            config,
            in_flight: RwLock::new(InFlight::default()),
        });

        let render_queue = Arc::new(JobQueue::start(
            "render",
            Arc::new(RenderHandler {
                pipeline: Arc::clone(&pipeline),
            }),
        ));
        let prepare_queue = JobQueue::start(
            "prepare",
            Arc::new(PrepareHandler {
                pipeline: Arc::clone(&pipeline),
                render_queue: Arc::clone(&render_queue),
            }),
        );

        Ok(Self {
            pipeline,
            prepare_queue,
            render_queue,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.pipeline.config
    }

    pub fn statuses(&self) -> Arc<StatusStore> {
        Arc::clone(&self.pipeline.statuses)
    }

    pub fn documents(&self) -> &JobDocuments {
        &self.pipeline.documents
    }

    /// Where the rendered video of `id` is written.
    pub fn output_path(&self, id: &JobId) -> PathBuf {
        self.pipeline.output_path(id)
    }

    /// Validate and queue a new job, returning its ID immediately.
    pub async fn submit(&self, scenes: Vec<SceneInput>, config: JobConfig) -> WorkerResult<JobId> {
        validate_scenes(&scenes)?;

        let document = JobDocument::new(scenes, config);
        let id = document.id.clone();
        self.pipeline.claim(&id).await;
        if let Err(e) = self.queue_new(&document).await {
            self.pipeline.release(&id).await;
            return Err(e);
        }
        record_job_submitted();
        info!(job_id = %id, scenes = document.scenes.len(), "Job submitted");
        Ok(id)
    }

    async fn queue_new(&self, document: &JobDocument) -> WorkerResult<()> {
        let id = &document.id;
        self.pipeline.documents.save_input(document).await?;

        let statuses = &self.pipeline.statuses;
        statuses
            .set_status(id, JobStatus::Pending, Some("Submitted".to_string()), None, None)
            .await?;
        statuses
            .set_status(
                id,
                JobStatus::Processing,
                Some("Waiting for preparation".to_string()),
                None,
                Some(STAGE_QUEUED.to_string()),
            )
            .await?;

        self.prepare_queue.enqueue(PrepareJob::new(id.clone()))?;
        Ok(())
    }

    /// Current status; unknown jobs read as pending.
    pub async fn status(&self, id: &JobId) -> StatusRecord {
        self.pipeline.statuses.get_status(id).await
    }

    /// Run a finished job through the pipeline again.
    ///
    /// Replacement scenes or config, when given, overwrite the persisted
    /// ones. Clips and audio already assigned to scenes are reused.
    pub async fn rerender(
        &self,
        id: &JobId,
        scenes: Option<Vec<SceneInput>>,
        config: Option<JobConfig>,
    ) -> WorkerResult<()> {
        let pipeline = &self.pipeline;
        let mut input = pipeline
            .documents
            .load_input(id)
            .await?
            .ok_or_else(|| WorkerError::JobNotFound(id.clone()))?;

        let current = pipeline.statuses.get_status(id).await;
        if !current.is_terminal() {
            return Err(WorkerError::InvalidState {
                job_id: id.clone(),
                status: current.status,
            });
        }

        if let Some(scenes) = scenes {
            validate_scenes(&scenes)?;
            input.scenes = scenes;
        }
        if let Some(config) = config {
            input.config = config;
        }
        input.touch();

        pipeline.claim(id).await;
        if let Err(e) = self.queue_again(&input).await {
            pipeline.release(id).await;
            return Err(e);
        }
        info!(job_id = %id, "Re-render queued");
        Ok(())
    }

    async fn queue_again(&self, input: &JobDocument) -> WorkerResult<()> {
        let pipeline = &self.pipeline;
        let id = &input.id;
        pipeline.documents.save_input(input).await?;

        match tokio::fs::remove_file(pipeline.output_path(id)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        pipeline
            .statuses
            .begin_cycle(id, Some("Re-render requested".to_string()))
            .await?;
        pipeline
            .statuses
            .update(id, StatusPatch::default().with_stage(STAGE_QUEUED))
            .await?;

        self.prepare_queue.enqueue(PrepareJob::rerender(id.clone()))?;
        Ok(())
    }

    /// Delete a job's documents and output.
    ///
    /// In-flight work for the job is discarded and the status is left
    /// `failed` so pollers stop waiting. Returns `false` for unknown jobs.
    pub async fn delete(&self, id: &JobId) -> WorkerResult<bool> {
        let pipeline = &self.pipeline;
        let has_input = pipeline.documents.load_input(id).await?.is_some();
        let current = pipeline.statuses.get_status(id).await;
        if !has_input && current.updated_at.is_none() {
            return Ok(false);
        }

        if pipeline.tombstone(id).await {
            debug!(job_id = %id, "Discarding in-flight work");
        }
        pipeline.documents.delete(id).await?;
        match tokio::fs::remove_file(pipeline.output_path(id)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                warn!(job_id = %id, "Could not remove output: {}", e)
            }
            _ => {}
        }
        pipeline.statuses.terminate(id, DELETED_MESSAGE).await?;

        info!(job_id = %id, "Job deleted");
        Ok(true)
    }

    /// Wait until the job reaches `ready` or `failed`.
    pub async fn wait_for_terminal(&self, id: &JobId, timeout: Duration) -> WorkerResult<StatusRecord> {
        let statuses = &self.pipeline.statuses;
        let mut events = statuses.subscribe();

        let current = statuses.get_status(id).await;
        if current.is_terminal() {
            return Ok(current);
        }

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(event) if event.job_id == *id && event.record.is_terminal() => return event.record,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {
                        let record = statuses.get_status(id).await;
                        if record.is_terminal() {
                            return record;
                        }
                    }
                    Err(RecvError::Closed) => return statuses.get_status(id).await,
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| WorkerError::Timeout(timeout.as_secs()))
    }

    /// Handle jobs a previous run left `processing`, per the recovery policy.
    ///
    /// Call before submitting new jobs.
    pub async fn recover(&self) -> WorkerResult<Vec<JobId>> {
        let statuses = &self.pipeline.statuses;
        let interrupted = statuses.interrupted_jobs().await?;

        for id in &interrupted {
            match self.pipeline.config.recovery {
                RecoveryPolicy::FailInterrupted => {
                    statuses.set_error(id, INTERRUPTED_MESSAGE).await?;
                    warn!(job_id = %id, "Marked interrupted job as failed");
                }
                RecoveryPolicy::Leave => warn!(job_id = %id, "Found interrupted job"),
            }
        }
        Ok(interrupted)
    }

    /// Deleted jobs whose in-flight work has not wound down yet.
    pub async fn pending_deletions(&self) -> usize {
        self.pipeline.in_flight.read().await.deleted.len()
    }

    /// Remove cached downloads older than `max_age_hours`.
    pub async fn cleanup_cache(&self, max_age_hours: u64) -> usize {
        self.pipeline.videos.cleanup(max_age_hours).await
    }

    /// Wait until both queues are drained.
    pub async fn wait_idle(&self) {
        self.prepare_queue.wait_idle().await;
        self.render_queue.wait_idle().await;
    }

    /// Stop accepting jobs and let queued ones finish.
    pub async fn shutdown(self) {
        let Self {
            prepare_queue,
            render_queue,
            ..
        } = self;
        prepare_queue.shutdown().await;
        match Arc::try_unwrap(render_queue) {
            Ok(queue) => queue.shutdown().await,
            Err(queue) => queue.wait_idle().await,
        }
    }
}
