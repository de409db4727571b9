//! Engine events
//!
//! One payload shape is shared by the live stream and webhook deliveries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::DomainError;

/// Types of events emitted during a job's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Job claimed by a worker
    #[serde(rename = "job.started")]
    JobStarted,
    /// A block finished
    #[serde(rename = "job.progress")]
    JobProgress,
    /// All blocks finished and the output record is stored
    #[serde(rename = "job.completed")]
    JobCompleted,
    /// Job ended in failure or was cancelled
    #[serde(rename = "job.failed")]
    JobFailed,
}

impl EventType {
    /// Returns all available event types
    pub fn all() -> Vec<Self> {
        vec![
            Self::JobStarted,
            Self::JobProgress,
            Self::JobCompleted,
            Self::JobFailed,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobStarted => "job.started",
            Self::JobProgress => "job.progress",
            Self::JobCompleted => "job.completed",
            Self::JobFailed => "job.failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JobCompleted | Self::JobFailed)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("Unknown event type '{}'", s)))
    }
}

/// Event payload sent to stream consumers and webhooks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Unique event ID
    pub id: String,
    pub event_type: EventType,
    /// Request the event concerns; the stream channel key
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Event-specific data
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub fn new(event_type: EventType, subject_id: impl Into<String>, data: Value) -> Self {
        Self {
            id: format!("evt-{}", uuid::Uuid::new_v4()),
            event_type,
            subject_id: subject_id.into(),
            job_id: None,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}
