//! In-memory request repository

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{DomainError, ProcessingRequest, RequestId, RequestRepository};

/// In-memory implementation of RequestRepository
#[derive(Debug, Default)]
pub struct InMemoryRequestRepository {
    requests: Arc<RwLock<HashMap<String, ProcessingRequest>>>,
}

impl InMemoryRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn get(&self, id: &RequestId) -> Result<Option<ProcessingRequest>, DomainError> {
        let requests = self.requests.read().await;
        Ok(requests.get(id.as_str()).cloned())
    }

    async fn save(&self, request: ProcessingRequest) -> Result<ProcessingRequest, DomainError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id().as_str().to_string(), request.clone());
        Ok(request)
    }
}
