//! Output record repository trait

use async_trait::async_trait;

use super::entity::OutputRecord;
use crate::domain::error::DomainError;
use crate::domain::job::JobId;
use crate::domain::request::RequestId;

/// Append-only store of output records
#[async_trait]
pub trait OutputRepository: Send + Sync + std::fmt::Debug {
    /// Store `record` as the next version for its request.
    ///
    /// The version is one greater than the highest stored version for the
    /// same request, assigned atomically. Existing versions are never touched.
    async fn append(&self, record: OutputRecord) -> Result<OutputRecord, DomainError>;

    /// All versions for a request, oldest first
    async fn list_for_request(&self, request_id: &RequestId)
        -> Result<Vec<OutputRecord>, DomainError>;

    /// Highest version for a request
    async fn latest(&self, request_id: &RequestId) -> Result<Option<OutputRecord>, DomainError>;

    /// Record written by a job, if any
    async fn find_by_job(&self, job_id: &JobId) -> Result<Option<OutputRecord>, DomainError>;
}
