//! In-memory workflow repository implementation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{DomainError, Workflow, WorkflowId, WorkflowRepository};

/// In-memory implementation of WorkflowRepository
#[derive(Debug)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<RwLock<HashMap<String, Workflow>>>,
}

impl InMemoryWorkflowRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a repository pre-populated with workflows
    pub fn with_workflows(workflows: Vec<Workflow>) -> Self {
        let map: HashMap<String, Workflow> = workflows
            .into_iter()
            .map(|w| (w.id().as_str().to_string(), w))
            .collect();

        Self {
            workflows: Arc::new(RwLock::new(map)),
        }
    }
}

impl Default for InMemoryWorkflowRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn get(&self, id: &WorkflowId) -> Result<Option<Workflow>, DomainError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(id.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<Workflow>, DomainError> {
        let workflows = self.workflows.read().await;
        let mut list: Vec<Workflow> = workflows.values().cloned().collect();
        list.sort_by(|a, b| a.id().as_str().cmp(b.id().as_str()));
        Ok(list)
    }

    async fn save(&self, workflow: Workflow) -> Result<Workflow, DomainError> {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id().as_str().to_string(), workflow.clone());
        Ok(workflow)
    }

    async fn delete(&self, id: &WorkflowId) -> Result<bool, DomainError> {
        let mut workflows = self.workflows.write().await;
        Ok(workflows.remove(id.as_str()).is_some())
    }
}
