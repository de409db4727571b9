//! Versioned output records

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::job::JobId;
use crate::domain::request::RequestId;
use crate::domain::workflow::{ExecutionOutcome, ResolutionWarning, TokenUsage, WorkflowId};

/// Result of one successful job. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    id: String,
    request_id: RequestId,
    job_id: JobId,
    workflow_id: WorkflowId,
    workflow_version: u32,

    /// Per-request, starts at 1. Assigned by the repository on append.
    version: u32,

    /// Block name -> block output, in execution order
    results: IndexMap<String, Value>,

    usage: TokenUsage,
    duration_ms: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<ResolutionWarning>,

    created_at: DateTime<Utc>,
}

impl OutputRecord {
    /// Build an unversioned record from a finished execution
    pub fn from_outcome(
        request_id: RequestId,
        job_id: JobId,
        workflow_id: WorkflowId,
        workflow_version: u32,
        outcome: ExecutionOutcome,
    ) -> Self {
        Self {
            id: format!("out-{}", uuid::Uuid::new_v4()),
            request_id,
            job_id,
            workflow_id,
            workflow_version,
            version: 0,
            results: outcome.results,
            usage: outcome.usage,
            duration_ms: outcome.duration_ms,
            warnings: outcome.warnings,
            created_at: Utc::now(),
        }
    }

    /// Stamp the version. Only the repository calls this.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn workflow_version(&self) -> u32 {
        self.workflow_version
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn results(&self) -> &IndexMap<String, Value> {
        &self.results
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn warnings(&self) -> &[ResolutionWarning] {
        &self.warnings
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
