//! Errors surfaced by job lifecycle operations

use thiserror::Error;

use crate::domain::{DomainError, JobError, WorkflowError};

/// Error returned by `JobLifecycleManager` operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl LifecycleError {
    /// Whether the request was refused because of the current job state
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Job(JobError::RequestBusy { .. })
            | Self::Job(JobError::RetryLimitReached { .. })
            | Self::Job(JobError::Superseded { .. })
            | Self::Job(JobError::NotAllowed { .. })
            | Self::Job(JobError::InvalidTransition { .. }) => true,
            Self::Domain(DomainError::Conflict { .. }) => true,
            _ => false,
        }
    }
}
