//! Job-specific errors

use thiserror::Error;

use crate::domain::DomainError;

/// Errors raised by job state changes and lifecycle operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid job ID: {0}")]
    InvalidId(String),

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Request '{request_id}' already has active job '{job_id}'")]
    RequestBusy { request_id: String, job_id: String },

    #[error("Job '{job_id}' reached the retry limit of {max_retries}: {reason}")]
    RetryLimitReached {
        job_id: String,
        max_retries: u32,
        reason: String,
    },

    #[error("Job '{job_id}' was already resubmitted as '{next_job_id}'")]
    Superseded { job_id: String, next_job_id: String },

    #[error("Job '{job_id}' is {status} and cannot be {action}")]
    NotAllowed {
        job_id: String,
        status: String,
        action: &'static str,
    },
}

impl JobError {
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn request_busy(request_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self::RequestBusy {
            request_id: request_id.into(),
            job_id: job_id.into(),
        }
    }

    pub fn superseded(job_id: impl Into<String>, next_job_id: impl Into<String>) -> Self {
        Self::Superseded {
            job_id: job_id.into(),
            next_job_id: next_job_id.into(),
        }
    }

    pub fn not_allowed(
        job_id: impl Into<String>,
        status: impl ToString,
        action: &'static str,
    ) -> Self {
        Self::NotAllowed {
            job_id: job_id.into(),
            status: status.to_string(),
            action,
        }
    }
}

impl From<JobError> for DomainError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidId(_) => DomainError::invalid_id(err.to_string()),
            JobError::NotFound(_) => DomainError::not_found(err.to_string()),
            JobError::InvalidTransition { .. }
            | JobError::RequestBusy { .. }
            | JobError::RetryLimitReached { .. }
            | JobError::Superseded { .. }
            | JobError::NotAllowed { .. } => DomainError::conflict(err.to_string()),
        }
    }
}
