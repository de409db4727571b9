//! In-memory webhook repository implementations

use crate::domain::webhook::{
    Webhook, WebhookDelivery, WebhookDeliveryRepository, WebhookId, WebhookRepository,
};
use crate::domain::{DomainError, EventType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory implementation of WebhookRepository
#[derive(Debug, Default)]
pub struct InMemoryWebhookRepository {
    webhooks: RwLock<HashMap<String, Webhook>>,
}

impl InMemoryWebhookRepository {
    /// Creates a new empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookRepository for InMemoryWebhookRepository {
    async fn create(&self, webhook: Webhook) -> Result<Webhook, DomainError> {
        let mut webhooks = self
            .webhooks
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let id = webhook.id.as_str().to_string();

        if webhooks.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "Webhook with id '{}' already exists",
                id
            )));
        }

        webhooks.insert(id, webhook.clone());
        Ok(webhook)
    }

    async fn update(&self, webhook: Webhook) -> Result<Webhook, DomainError> {
        let mut webhooks = self
            .webhooks
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let id = webhook.id.as_str().to_string();

        if !webhooks.contains_key(&id) {
            return Err(DomainError::not_found(format!(
                "Webhook with id '{}' not found",
                id
            )));
        }

        webhooks.insert(id, webhook.clone());
        Ok(webhook)
    }

    async fn delete(&self, id: &WebhookId) -> Result<(), DomainError> {
        let mut webhooks = self
            .webhooks
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        if webhooks.remove(id.as_str()).is_none() {
            return Err(DomainError::not_found(format!(
                "Webhook with id '{}' not found",
                id
            )));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &WebhookId) -> Result<Option<Webhook>, DomainError> {
        let webhooks = self
            .webhooks
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(webhooks.get(id.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<Webhook>, DomainError> {
        let webhooks = self
            .webhooks
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let mut result: Vec<_> = webhooks.values().cloned().collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn find_active_by_event(&self, event: EventType) -> Result<Vec<Webhook>, DomainError> {
        let webhooks = self
            .webhooks
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let mut result: Vec<_> = webhooks
            .values()
            .filter(|w| w.is_active() && w.is_subscribed_to(event))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        Ok(result)
    }
}

/// In-memory implementation of WebhookDeliveryRepository
#[derive(Debug, Default)]
pub struct InMemoryWebhookDeliveryRepository {
    deliveries: RwLock<HashMap<String, WebhookDelivery>>,
}

impl InMemoryWebhookDeliveryRepository {
    /// Creates a new empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookDeliveryRepository for InMemoryWebhookDeliveryRepository {
    async fn create(&self, delivery: WebhookDelivery) -> Result<WebhookDelivery, DomainError> {
        let mut deliveries = self
            .deliveries
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let id = delivery.id.as_str().to_string();

        if deliveries.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "Delivery with id '{}' already exists",
                id
            )));
        }

        deliveries.insert(id, delivery.clone());
        Ok(delivery)
    }

    async fn update(&self, delivery: WebhookDelivery) -> Result<WebhookDelivery, DomainError> {
        let mut deliveries = self
            .deliveries
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let id = delivery.id.as_str().to_string();

        match deliveries.get(&id) {
            None => {
                return Err(DomainError::not_found(format!(
                    "Delivery with id '{}' not found",
                    id
                )));
            }
            Some(existing) if existing.is_complete() => {
                return Err(DomainError::conflict(format!(
                    "Delivery '{}' is already {}",
                    id,
                    existing.status.as_str()
                )));
            }
            Some(_) => {}
        }

        deliveries.insert(id, delivery.clone());
        Ok(delivery)
    }

    async fn find_by_webhook(
        &self,
        webhook_id: &WebhookId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WebhookDelivery>, DomainError> {
        let deliveries = self
            .deliveries
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let mut result: Vec<_> = deliveries
            .values()
            .filter(|d| &d.webhook_id == webhook_id)
            .cloned()
            .collect();

        // Newest first
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(result.into_iter().skip(offset).take(limit).collect())
    }
}
