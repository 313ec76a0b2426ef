//! Durable job status store.
//!
//! Every write to one job is serialized through a keyed lock and follows
//! read-merge-write, so concurrent updates never lose fields. Reads never
//! fail: a missing or unreadable record is reported as `pending`.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use shorts_models::{JobId, JobStatus, StatusPatch, StatusRecord};

use crate::documents::{job_id_from_key, status_key, JOBS_PREFIX};
use crate::error::StorageResult;
use crate::kv::KeyValueStore;
use crate::locks::KeyedMutex;

const EVENT_CAPACITY: usize = 256;

/// A committed status record.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub job_id: JobId,
    pub record: StatusRecord,
}

pub struct StatusStore {
    store: Arc<dyn KeyValueStore>,
    locks: KeyedMutex,
    events: broadcast::Sender<StatusEvent>,
}

impl StatusStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            locks: KeyedMutex::new(),
            events,
        }
    }

    /// Receive every record committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Current record of a job. Absent or corrupt records read as pending.
    pub async fn get_status(&self, id: &JobId) -> StatusRecord {
        self.read(id).await
    }

    /// Move a job to `status`, optionally updating message, progress and stage.
    pub async fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        message: Option<String>,
        progress: Option<u8>,
        stage: Option<String>,
    ) -> StorageResult<StatusRecord> {
        let patch = StatusPatch {
            status: Some(status),
            progress,
            stage,
            message,
            ..Default::default()
        };
        self.update(id, patch).await
    }

    /// Record progress while processing.
    pub async fn set_progress(
        &self,
        id: &JobId,
        progress: u8,
        stage: Option<String>,
        eta_seconds: Option<u64>,
    ) -> StorageResult<StatusRecord> {
        let patch = StatusPatch {
            progress: Some(progress),
            stage,
            eta_seconds,
            ..Default::default()
        };
        self.update(id, patch).await
    }

    /// Mark a job failed with an error message.
    pub async fn set_error(&self, id: &JobId, message: impl Into<String>) -> StorageResult<StatusRecord> {
        self.update(id, StatusPatch::failed(message)).await
    }

    /// Merge an arbitrary patch into the job's record.
    pub async fn update(&self, id: &JobId, patch: StatusPatch) -> StorageResult<StatusRecord> {
        let _guard = self.locks.lock(id.as_str()).await;

        let (mut record, _) = self.read_record(id).await;
        record.apply(patch, Utc::now())?;
        self.commit(id, record).await
    }

    /// Start a new processing cycle, leaving any terminal state.
    pub async fn begin_cycle(&self, id: &JobId, message: Option<String>) -> StorageResult<StatusRecord> {
        let _guard = self.locks.lock(id.as_str()).await;

        let (mut record, _) = self.read_record(id).await;
        record.begin_cycle(message, Utc::now());
        self.commit(id, record).await
    }

    /// Force a terminal `failed` record regardless of the current state.
    ///
    /// Used when a job is deleted so pollers stop waiting.
    pub async fn terminate(&self, id: &JobId, reason: impl Into<String>) -> StorageResult<StatusRecord> {
        let _guard = self.locks.lock(id.as_str()).await;

        let now = Utc::now();
        let (mut record, _) = self.read_record(id).await;
        record.status = JobStatus::Failed;
        record.error = Some(reason.into());
        record.eta_seconds = None;
        record.completed_at = Some(now);
        record.updated_at = Some(now);
        self.commit(id, record).await
    }

    pub async fn delete_status(&self, id: &JobId) -> StorageResult<bool> {
        let _guard = self.locks.lock(id.as_str()).await;
        self.store.delete(&status_key(id)).await
    }

    /// Jobs whose persisted record is still `processing`.
    ///
    /// At startup these were interrupted by a crash or restart.
    pub async fn interrupted_jobs(&self) -> StorageResult<Vec<JobId>> {
        let keys = self.store.list_prefix(JOBS_PREFIX).await?;
        let mut interrupted = Vec::new();

        for key in keys.iter().filter(|k| k.ends_with("/status.json")) {
            let Some(id) = job_id_from_key(key) else {
                continue;
            };
            if self.read(&id).await.status == JobStatus::Processing {
                interrupted.push(id);
            }
        }

        if !interrupted.is_empty() {
            info!(count = interrupted.len(), "Found interrupted jobs");
        }
        Ok(interrupted)
    }

    /// Read outside the job lock. A corrupt record is removed under the lock,
    /// and only if no writer replaced it in the meantime.
    async fn read(&self, id: &JobId) -> StatusRecord {
        let (record, corrupt) = self.read_record(id).await;
        if let Some(bytes) = corrupt {
            self.reset_corrupt(id, &bytes).await;
        }
        record
    }

    /// Decode the stored record. Unreadable bytes come back alongside a
    /// pending record so the caller can decide whether to remove them.
    async fn read_record(&self, id: &JobId) -> (StatusRecord, Option<Vec<u8>>) {
        let bytes = match self.store.get(&status_key(id)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return (StatusRecord::pending(), None),
            Err(e) => {
                warn!(job_id = %id, "Failed to read status record: {}", e);
                return (StatusRecord::pending(), None);
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => (record, None),
            Err(e) => {
                warn!(job_id = %id, "Corrupt status record: {}", e);
                (StatusRecord::pending(), Some(bytes))
            }
        }
    }

    async fn reset_corrupt(&self, id: &JobId, seen: &[u8]) {
        let _guard = self.locks.lock(id.as_str()).await;

        let key = status_key(id);
        match self.store.get(&key).await {
            Ok(Some(current)) if current == seen => {
                info!(job_id = %id, "Resetting corrupt status record");
                if let Err(e) = self.store.delete(&key).await {
                    warn!(job_id = %id, "Failed to delete corrupt status record: {}", e);
                }
            }
            Ok(_) => debug!(job_id = %id, "Corrupt status record already replaced"),
            Err(e) => warn!(job_id = %id, "Failed to re-read status record: {}", e),
        }
    }

    async fn commit(&self, id: &JobId, record: StatusRecord) -> StorageResult<StatusRecord> {
        let bytes = serde_json::to_vec_pretty(&record)?;
        self.store.put(&status_key(id), &bytes).await?;

        debug!(
            job_id = %id,
            status = %record.status,
            progress = ?record.progress,
            stage = ?record.stage,
            "Status updated"
        );

        // No receivers is fine
        let _ = self.events.send(StatusEvent {
            job_id: id.clone(),
            record: record.clone(),
        });
        Ok(record)
    }
}
