//! In-memory job repository

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::request::RequestId;
use crate::domain::{DomainError, Job, JobError, JobId, JobRepository, JobStatus, JobTransition};

/// Job store guarded by a single lock, so every check-then-write is atomic
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn get(&self, id: &JobId) -> Result<Option<Job>, DomainError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(id.as_str()).cloned())
    }

    async fn create_exclusive(&self, job: Job) -> Result<Job, DomainError> {
        let mut jobs = self.jobs.write().await;

        if let Some(active) = jobs
            .values()
            .find(|j| j.request_id() == job.request_id() && j.status().is_active())
        {
            return Err(JobError::request_busy(job.request_id().as_str(), active.id().as_str()).into());
        }

        if jobs.contains_key(job.id().as_str()) {
            return Err(DomainError::conflict(format!(
                "Job '{}' already exists",
                job.id()
            )));
        }

        jobs.insert(job.id().as_str().to_string(), job.clone());
        Ok(job)
    }

    async fn transition(
        &self,
        id: &JobId,
        expected: JobStatus,
        transition: JobTransition,
    ) -> Result<Option<Job>, DomainError> {
        let mut jobs = self.jobs.write().await;

        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| DomainError::from(JobError::not_found(id.as_str())))?;

        if job.status() != expected {
            debug!(
                job_id = %id,
                expected = %expected,
                actual = %job.status(),
                "Job transition lost the race"
            );
            return Ok(None);
        }

        job.apply(transition)?;
        Ok(Some(job.clone()))
    }

    async fn request_cancel(&self, id: &JobId) -> Result<Job, DomainError> {
        let mut jobs = self.jobs.write().await;

        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| DomainError::from(JobError::not_found(id.as_str())))?;

        job.request_cancel()?;
        Ok(job.clone())
    }

    async fn record_progress(
        &self,
        id: &JobId,
        current_block: Option<String>,
        blocks_completed: usize,
    ) -> Result<(), DomainError> {
        let mut jobs = self.jobs.write().await;

        let job = jobs
            .get_mut(id.as_str())
            .ok_or_else(|| DomainError::from(JobError::not_found(id.as_str())))?;

        job.record_progress(current_block, blocks_completed);
        Ok(())
    }

    async fn find_active_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Job>, DomainError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .find(|j| j.request_id() == request_id && j.status().is_active())
            .cloned())
    }

    async fn list_for_request(&self, request_id: &RequestId) -> Result<Vec<Job>, DomainError> {
        let jobs = self.jobs.read().await;
        let mut list: Vec<Job> = jobs
            .values()
            .filter(|j| j.request_id() == request_id)
            .cloned()
            .collect();
        list.sort_by_key(|j| j.created_at());
        Ok(list)
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, DomainError> {
        let jobs = self.jobs.read().await;
        let mut list: Vec<Job> = jobs
            .values()
            .filter(|j| j.status() == status)
            .cloned()
            .collect();
        list.sort_by_key(|j| j.created_at());
        Ok(list)
    }
}
