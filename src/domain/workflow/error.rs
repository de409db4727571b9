//! Workflow error types

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DomainError;

/// Why a job failed; tells the caller whether resubmitting can help
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Broken workflow definition or sequencing. Resubmitting will not help.
    Configuration,
    /// The LLM service kept failing. May succeed later.
    Invocation,
    /// The LLM answered with output that violates the block's schema
    Validation,
    /// Stopped on request
    Cancelled,
    /// Results could not be stored
    Persistence,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Invocation => "invocation",
            Self::Validation => "validation",
            Self::Cancelled => "cancelled",
            Self::Persistence => "persistence",
        }
    }

    /// Whether a fresh attempt has a realistic chance of succeeding
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Invocation | Self::Persistence | Self::Cancelled)
    }

    /// Failures caused by something outside the workflow; eligible for
    /// automatic resubmission
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Invocation | Self::Persistence)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while planning or executing a workflow
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Workflow '{id}' is {status} and cannot be triggered")]
    NotTriggerable { id: String, status: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Variable resolution failed: {0}")]
    VariableResolution(String),

    #[error("Invocation failed in block '{block}' after {attempts} attempt(s): {message}")]
    Invocation {
        block: String,
        attempts: u32,
        message: String,
    },

    #[error("Output validation failed in block '{block}': {message}")]
    OutputValidation { block: String, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl WorkflowError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn not_triggerable(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self::NotTriggerable {
            id: id.into(),
            status: status.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn variable_resolution(message: impl Into<String>) -> Self {
        Self::VariableResolution(message.into())
    }

    pub fn invocation(block: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::Invocation {
            block: block.into(),
            attempts,
            message: message.into(),
        }
    }

    pub fn output_validation(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutputValidation {
            block: block.into(),
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Classify this error for the job record
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_)
            | Self::NotTriggerable { .. }
            | Self::Configuration(_)
            | Self::VariableResolution(_) => FailureKind::Configuration,
            Self::Invocation { .. } => FailureKind::Invocation,
            Self::OutputValidation { .. } => FailureKind::Validation,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Persistence(_) => FailureKind::Persistence,
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { message } => Self::NotFound(message),
            DomainError::Validation { message }
            | DomainError::InvalidId { message }
            | DomainError::Configuration { message } => Self::Configuration(message),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::not_found("essay-review");
        assert_eq!(err.to_string(), "Workflow not found: essay-review");

        let err = WorkflowError::invocation("summary", 3, "timed out after 500ms");
        assert_eq!(
            err.to_string(),
            "Invocation failed in block 'summary' after 3 attempt(s): timed out after 500ms"
        );

        assert_eq!(WorkflowError::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            WorkflowError::configuration("cycle").kind(),
            FailureKind::Configuration
        );
        assert_eq!(
            WorkflowError::variable_resolution("missing").kind(),
            FailureKind::Configuration
        );
        assert_eq!(
            WorkflowError::invocation("a", 1, "x").kind(),
            FailureKind::Invocation
        );
        assert_eq!(
            WorkflowError::output_validation("a", "x").kind(),
            FailureKind::Validation
        );
        assert_eq!(WorkflowError::Cancelled.kind(), FailureKind::Cancelled);
        assert!(!FailureKind::Configuration.is_retryable());
        assert!(!FailureKind::Validation.is_retryable());
        assert!(FailureKind::Invocation.is_retryable());
        assert!(FailureKind::Invocation.is_transient());
        assert!(!FailureKind::Cancelled.is_transient());
    }

    #[test]
    fn test_from_domain_error() {
        let err: WorkflowError = DomainError::storage("disk full").into();
        assert_eq!(err.kind(), FailureKind::Persistence);

        let err: WorkflowError = DomainError::not_found("wf").into();
        assert_eq!(err, WorkflowError::not_found("wf"));
    }
}
