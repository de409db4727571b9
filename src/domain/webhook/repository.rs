//! Webhook repository traits

use super::{Webhook, WebhookDelivery, WebhookId};
use crate::domain::error::DomainError;
use crate::domain::event::EventType;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

/// Repository for webhook subscriptions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Creates a new webhook
    async fn create(&self, webhook: Webhook) -> Result<Webhook, DomainError>;

    /// Updates an existing webhook
    async fn update(&self, webhook: Webhook) -> Result<Webhook, DomainError>;

    /// Deletes a webhook by ID
    async fn delete(&self, id: &WebhookId) -> Result<(), DomainError>;

    /// Finds a webhook by ID
    async fn find_by_id(&self, id: &WebhookId) -> Result<Option<Webhook>, DomainError>;

    /// Lists all webhooks
    async fn list(&self) -> Result<Vec<Webhook>, DomainError>;

    /// Finds active webhooks subscribed to a specific event type
    async fn find_active_by_event(&self, event: EventType) -> Result<Vec<Webhook>, DomainError>;
}

/// Repository for webhook delivery records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WebhookDeliveryRepository: Send + Sync {
    /// Creates a new delivery record
    async fn create(&self, delivery: WebhookDelivery) -> Result<WebhookDelivery, DomainError>;

    /// Updates an existing delivery record
    async fn update(&self, delivery: WebhookDelivery) -> Result<WebhookDelivery, DomainError>;

    /// Lists deliveries for a webhook, newest first
    async fn find_by_webhook(
        &self,
        webhook_id: &WebhookId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WebhookDelivery>, DomainError>;
}
