//! Request repository trait

use async_trait::async_trait;

use super::entity::{ProcessingRequest, RequestId};
use crate::domain::DomainError;

/// Read access to requests, plus `save` for the in-process stand-in
#[async_trait]
pub trait RequestRepository: Send + Sync + std::fmt::Debug {
    async fn get(&self, id: &RequestId) -> Result<Option<ProcessingRequest>, DomainError>;

    /// Insert or replace a request
    async fn save(&self, request: ProcessingRequest) -> Result<ProcessingRequest, DomainError>;
}
