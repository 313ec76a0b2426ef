//! Job identity and the persisted job input document.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{JobConfig, MusicSelection, SceneInput};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Raw inputs of a job.
///
/// Written on submission and re-written after preparation with the
/// search-updated scene inputs, so a later re-render can replay the job
/// without searching for media again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobDocument {
    /// Job ID
    pub id: JobId,

    /// Ordered scene inputs
    pub scenes: Vec<SceneInput>,

    /// Client-supplied configuration (merged with defaults at preparation)
    #[serde(default)]
    pub config: JobConfig,

    /// Music chosen by the last preparation, reused while it still fits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicSelection>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl JobDocument {
    /// Create a document for a freshly submitted job.
    pub fn new(scenes: Vec<SceneInput>, config: JobConfig) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            scenes,
            config,
            music: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
