//! In-memory output record repository

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::job::JobId;
use crate::domain::{DomainError, OutputRecord, OutputRepository, RequestId};

/// Append-only store; each request's records are kept in version order
#[derive(Debug, Default)]
pub struct InMemoryOutputRepository {
    records: Arc<RwLock<HashMap<String, Vec<OutputRecord>>>>,
}

impl InMemoryOutputRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutputRepository for InMemoryOutputRepository {
    async fn append(&self, record: OutputRecord) -> Result<OutputRecord, DomainError> {
        let mut records = self.records.write().await;
        let versions = records
            .entry(record.request_id().as_str().to_string())
            .or_default();

        if versions.iter().any(|r| r.job_id() == record.job_id()) {
            return Err(DomainError::conflict(format!(
                "Job '{}' already wrote an output record",
                record.job_id()
            )));
        }

        let next = versions.last().map(|r| r.version()).unwrap_or(0) + 1;
        let record = record.with_version(next);
        versions.push(record.clone());
        Ok(record)
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<OutputRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records.get(request_id.as_str()).cloned().unwrap_or_default())
    }

    async fn latest(&self, request_id: &RequestId) -> Result<Option<OutputRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records
            .get(request_id.as_str())
            .and_then(|versions| versions.last())
            .cloned())
    }

    async fn find_by_job(&self, job_id: &JobId) -> Result<Option<OutputRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .flatten()
            .find(|r| r.job_id() == job_id)
            .cloned())
    }
}
