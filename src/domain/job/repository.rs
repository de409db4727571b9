//! Job repository trait

use std::fmt::Debug;

use async_trait::async_trait;

use super::{Job, JobId, JobStatus, JobTransition};
use crate::domain::error::DomainError;
use crate::domain::request::RequestId;

/// Repository trait for jobs.
///
/// Every status change goes through `transition`, a compare-and-set on the
/// stored status, so two workers can never both finish the same job.
#[async_trait]
pub trait JobRepository: Send + Sync + Debug {
    /// Get a job by ID
    async fn get(&self, id: &JobId) -> Result<Option<Job>, DomainError>;

    /// Insert a pending job unless its request already has an active one.
    ///
    /// Returns `DomainError::Conflict` when the request is busy.
    async fn create_exclusive(&self, job: Job) -> Result<Job, DomainError>;

    /// Apply `transition` only if the stored status equals `expected`.
    ///
    /// `Ok(None)` means another writer changed the status first.
    async fn transition(
        &self,
        id: &JobId,
        expected: JobStatus,
        transition: JobTransition,
    ) -> Result<Option<Job>, DomainError>;

    /// Set the cancellation flag on a running job
    async fn request_cancel(&self, id: &JobId) -> Result<Job, DomainError>;

    /// Record the executing block and completed count of a running job
    async fn record_progress(
        &self,
        id: &JobId,
        current_block: Option<String>,
        blocks_completed: usize,
    ) -> Result<(), DomainError>;

    /// The pending or running job for a request, if any
    async fn find_active_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Job>, DomainError>;

    /// All jobs for a request, oldest first
    async fn list_for_request(&self, request_id: &RequestId) -> Result<Vec<Job>, DomainError>;

    /// List jobs by status
    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, DomainError>;
}
