//! Workflow repository trait
//!
//! Workflow definitions are owned by an external authoring collaborator; the
//! engine only reads them. `save` exists so definitions can be seeded.

use async_trait::async_trait;

use super::entity::{Workflow, WorkflowId};
use crate::domain::DomainError;

/// Repository trait for workflow definitions
#[async_trait]
pub trait WorkflowRepository: Send + Sync + std::fmt::Debug {
    /// Get a workflow by ID
    async fn get(&self, id: &WorkflowId) -> Result<Option<Workflow>, DomainError>;

    /// List all workflows
    async fn list(&self) -> Result<Vec<Workflow>, DomainError>;

    /// Insert or replace a workflow
    async fn save(&self, workflow: Workflow) -> Result<Workflow, DomainError>;

    /// Delete a workflow by ID
    async fn delete(&self, id: &WorkflowId) -> Result<bool, DomainError>;
}
