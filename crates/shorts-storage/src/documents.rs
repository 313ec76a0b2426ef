//! Persisted job documents.
//!
//! Layout:
//! ```text
//! jobs/<id>/input.json    raw inputs (scenes, config, music, timestamps)
//! jobs/<id>/render.json   resolved render document
//! jobs/<id>/status.json   status record (owned by StatusStore)
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use shorts_models::{JobDocument, JobId, RenderDocument};

use crate::error::StorageResult;
use crate::kv::{get_json, put_json, KeyValueStore};

pub const JOBS_PREFIX: &str = "jobs/";

pub fn input_key(id: &JobId) -> String {
    format!("{}{}/input.json", JOBS_PREFIX, id)
}

pub fn render_key(id: &JobId) -> String {
    format!("{}{}/render.json", JOBS_PREFIX, id)
}

pub fn status_key(id: &JobId) -> String {
    format!("{}{}/status.json", JOBS_PREFIX, id)
}

/// Extract the job ID from a key under `jobs/`.
pub fn job_id_from_key(key: &str) -> Option<JobId> {
    key.strip_prefix(JOBS_PREFIX)?
        .split('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(JobId::from)
}

/// Reads and writes job input and render documents.
#[derive(Clone)]
pub struct JobDocuments {
    store: Arc<dyn KeyValueStore>,
}

impl JobDocuments {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn save_input(&self, doc: &JobDocument) -> StorageResult<()> {
        put_json(self.store.as_ref(), &input_key(&doc.id), doc).await
    }

    pub async fn load_input(&self, id: &JobId) -> StorageResult<Option<JobDocument>> {
        get_json(self.store.as_ref(), &input_key(id)).await
    }

    pub async fn save_render(&self, doc: &RenderDocument) -> StorageResult<()> {
        put_json(self.store.as_ref(), &render_key(&doc.job_id), doc).await
    }

    pub async fn load_render(&self, id: &JobId) -> StorageResult<Option<RenderDocument>> {
        get_json(self.store.as_ref(), &render_key(id)).await
    }

    /// Remove the input and render documents of a job.
    pub async fn delete(&self, id: &JobId) -> StorageResult<()> {
        let input = self.store.delete(&input_key(id)).await?;
        let render = self.store.delete(&render_key(id)).await?;
        debug!(job_id = %id, input, render, "Deleted job documents");
        Ok(())
    }

    /// Every job with at least one persisted document.
    pub async fn list(&self) -> StorageResult<Vec<JobId>> {
        let ids: BTreeSet<JobId> = self
            .store
            .list_prefix(JOBS_PREFIX)
            .await?
            .iter()
            .filter_map(|key| job_id_from_key(key))
            .collect();
        Ok(ids.into_iter().collect())
    }
}
