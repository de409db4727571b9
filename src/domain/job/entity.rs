//! Job domain entities

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::JobError;
use crate::domain::request::RequestId;
use crate::domain::workflow::{FailureKind, WorkflowId};

/// Regex pattern for valid job IDs: job-{uuid}
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^job-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$").unwrap()
});

/// Validated job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Result<Self, JobError> {
        let id = id.into();
        if !ID_PATTERN.is_match(&id) {
            return Err(JobError::invalid_id(format!(
                "Invalid job ID '{}': must be in format job-{{uuid}}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Generate a new job ID with UUID
    pub fn generate() -> Self {
        Self(format!("job-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = JobError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for a worker
    #[default]
    Pending,

    /// A worker is executing the blocks
    Running,

    /// Output record stored
    Completed,

    /// Stopped by an error or cancellation
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Pending and running jobs block new triggers for the same request
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change applied atomically by the job repository
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    Start,
    Complete { output_version: u32 },
    Fail { kind: FailureKind, message: String },
}

impl JobTransition {
    pub fn target(&self) -> JobStatus {
        match self {
            Self::Start => JobStatus::Running,
            Self::Complete { .. } => JobStatus::Completed,
            Self::Fail { .. } => JobStatus::Failed,
        }
    }
}

/// One execution attempt of a workflow against a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    request_id: RequestId,
    workflow_id: WorkflowId,
    status: JobStatus,

    /// 1-based attempt number within a resubmission chain
    attempt: u32,

    /// Resubmissions so far in this chain
    retry_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    previous_job_id: Option<JobId>,

    /// Block name -> instruction appended for this execution
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    custom_instructions: HashMap<String, String>,

    #[serde(default)]
    cancel_requested: bool,

    /// Block currently executing
    #[serde(skip_serializing_if = "Option::is_none")]
    current_block: Option<String>,

    #[serde(default)]
    blocks_completed: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    failure_kind: Option<FailureKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    /// Version of the output record written by this job
    #[serde(skip_serializing_if = "Option::is_none")]
    output_version: Option<u32>,

    created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job
    pub fn new(request_id: RequestId, workflow_id: WorkflowId) -> Self {
        Self {
            id: JobId::generate(),
            request_id,
            workflow_id,
            status: JobStatus::Pending,
            attempt: 1,
            retry_count: 0,
            previous_job_id: None,
            custom_instructions: HashMap::new(),
            cancel_requested: false,
            current_block: None,
            blocks_completed: 0,
            failure_kind: None,
            error: None,
            output_version: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_custom_instructions(mut self, instructions: HashMap<String, String>) -> Self {
        self.custom_instructions = instructions;
        self
    }

    /// New pending job continuing this failed job's chain
    pub fn resubmission(&self) -> Result<Self, JobError> {
        if self.status != JobStatus::Failed {
            return Err(JobError::not_allowed(self.id.as_str(), self.status, "retried"));
        }

        let mut next = Self::new(self.request_id.clone(), self.workflow_id.clone())
            .with_custom_instructions(self.custom_instructions.clone());
        next.attempt = self.attempt + 1;
        next.retry_count = self.retry_count + 1;
        next.previous_job_id = Some(self.id.clone());
        Ok(next)
    }

    // Getters

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn previous_job_id(&self) -> Option<&JobId> {
        self.previous_job_id.as_ref()
    }

    pub fn custom_instructions(&self) -> &HashMap<String, String> {
        &self.custom_instructions
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn current_block(&self) -> Option<&str> {
        self.current_block.as_deref()
    }

    pub fn blocks_completed(&self) -> usize {
        self.blocks_completed
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure_kind
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn output_version(&self) -> Option<u32> {
        self.output_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    // State changes

    /// Apply a transition, rejecting anything the state machine forbids
    pub fn apply(&mut self, transition: JobTransition) -> Result<(), JobError> {
        let target = transition.target();
        if !self.status.can_transition_to(target) {
            return Err(JobError::invalid_transition(self.status, target));
        }

        let now = Utc::now();
        match transition {
            JobTransition::Start => {
                self.started_at = Some(now);
            }
            JobTransition::Complete { output_version } => {
                self.output_version = Some(output_version);
                self.current_block = None;
                self.completed_at = Some(now);
            }
            JobTransition::Fail { kind, message } => {
                self.failure_kind = Some(kind);
                self.error = Some(message);
                self.current_block = None;
                self.completed_at = Some(now);
            }
        }
        self.status = target;
        Ok(())
    }

    /// Flag a running job for cancellation between blocks
    pub fn request_cancel(&mut self) -> Result<(), JobError> {
        if self.status != JobStatus::Running {
            return Err(JobError::not_allowed(self.id.as_str(), self.status, "cancelled"));
        }
        self.cancel_requested = true;
        Ok(())
    }

    /// Record which block is executing and how many have finished
    pub fn record_progress(&mut self, current_block: Option<String>, blocks_completed: usize) {
        if self.status == JobStatus::Running {
            self.current_block = current_block;
            self.blocks_completed = blocks_completed;
        }
    }
}
