//! Webhook service for sending HTTP callbacks

use crate::domain::webhook::{
    DeliveryStatus, Webhook, WebhookDelivery, WebhookDeliveryRepository, WebhookId,
    WebhookRepository,
};
use crate::domain::{DomainError, EngineEvent};
use crate::infrastructure::observability::record_webhook_delivery;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Longest response body kept on a delivery record
pub const MAX_RESPONSE_BODY_CHARS: usize = 1000;

/// Trait for webhook service operations
#[async_trait]
pub trait WebhookServiceTrait: Send + Sync {
    /// Creates a new webhook
    async fn create(&self, webhook: Webhook) -> Result<Webhook, DomainError>;

    /// Deletes a webhook
    async fn delete(&self, id: &str) -> Result<(), DomainError>;

    /// Gets a webhook by ID
    async fn get(&self, id: &str) -> Result<Webhook, DomainError>;

    /// Lists all webhooks
    async fn list(&self) -> Result<Vec<Webhook>, DomainError>;

    /// Delivers an event to every active subscribed webhook.
    ///
    /// Returns once every delivery has reached `success` or `failed`.
    async fn dispatch(&self, event: &EngineEvent) -> Result<Vec<WebhookDelivery>, DomainError>;

    /// Gets delivery history for a webhook, newest first
    async fn get_deliveries(
        &self,
        webhook_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WebhookDelivery>, DomainError>;
}

/// HMAC-SHA256 of `payload` keyed with `secret`, hex encoded
pub fn sign_payload(secret: &str, payload: &str) -> Result<String, DomainError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DomainError::internal(format!("Invalid webhook secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check an `X-Webhook-Signature` header value against a received body
pub fn verify_signature(secret: &str, payload: &str, header: &str) -> bool {
    let Some(hex_signature) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Outcome of one HTTP attempt
enum AttemptResult {
    Delivered {
        status: u16,
        body: Option<String>,
    },
    Failed {
        error: String,
        status: Option<u16>,
        body: Option<String>,
    },
}

/// Webhook service implementation
pub struct WebhookService<W: WebhookRepository, D: WebhookDeliveryRepository> {
    webhook_repo: Arc<W>,
    delivery_repo: Arc<D>,
    http_client: Client,
}

impl<W: WebhookRepository, D: WebhookDeliveryRepository> WebhookService<W, D> {
    /// Creates a new webhook service
    pub fn new(webhook_repo: Arc<W>, delivery_repo: Arc<D>) -> Self {
        Self {
            webhook_repo,
            delivery_repo,
            http_client: Client::new(),
        }
    }

    /// Makes a single POST to the webhook target
    async fn attempt(
        &self,
        webhook: &Webhook,
        delivery: &WebhookDelivery,
        body: &str,
        signature: Option<&str>,
    ) -> AttemptResult {
        let mut request = self
            .http_client
            .post(&webhook.url)
            .timeout(Duration::from_millis(webhook.timeout_ms))
            .header("Content-Type", "application/json")
            .header("X-Webhook-Event", delivery.event_type.as_str())
            .header("X-Webhook-Delivery-Id", delivery.id.as_str());

        if let Some(signature) = signature {
            request = request.header("X-Webhook-Signature", format!("sha256={}", signature));
        }

        for (key, value) in &webhook.headers {
            request = request.header(key, value);
        }

        match request.body(body.to_string()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .ok()
                    .map(|b| b.chars().take(MAX_RESPONSE_BODY_CHARS).collect());

                if response_is_success(status) {
                    AttemptResult::Delivered { status, body }
                } else {
                    AttemptResult::Failed {
                        error: format!("HTTP status {}", status),
                        status: Some(status),
                        body,
                    }
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    "Request timed out".to_string()
                } else if e.is_connect() {
                    "Connection failed".to_string()
                } else {
                    format!("Request failed: {}", e)
                };
                AttemptResult::Failed {
                    error,
                    status: None,
                    body: None,
                }
            }
        }
    }

    /// Attempts one delivery until it succeeds or runs out of attempts
    async fn deliver(
        &self,
        webhook: &Webhook,
        mut delivery: WebhookDelivery,
    ) -> Result<WebhookDelivery, DomainError> {
        let body = serde_json::to_string(&delivery.payload)
            .map_err(|e| DomainError::internal(format!("Failed to serialize payload: {}", e)))?;
        let signature = match webhook.secret.as_deref() {
            Some(secret) => Some(sign_payload(secret, &body)?),
            None => None,
        };

        loop {
            let attempt = delivery.attempts + 1;
            match self
                .attempt(webhook, &delivery, &body, signature.as_deref())
                .await
            {
                AttemptResult::Delivered { status, body } => {
                    delivery.record_success(status, body);
                    info!(
                        delivery_id = %delivery.id,
                        webhook_id = %webhook.id,
                        status,
                        attempt,
                        "Webhook delivery succeeded"
                    );
                }
                AttemptResult::Failed {
                    error,
                    status,
                    body,
                } => {
                    warn!(
                        delivery_id = %delivery.id,
                        webhook_id = %webhook.id,
                        attempt,
                        max_attempts = webhook.max_attempts(),
                        error = %error,
                        "Webhook delivery attempt failed"
                    );
                    delivery.record_failure(
                        error,
                        status,
                        body,
                        webhook.max_attempts(),
                        webhook.backoff_after(attempt),
                    );
                }
            }

            // A store failure must not strand the delivery before a terminal state
            if let Err(e) = self.delivery_repo.update(delivery.clone()).await {
                error!(
                    delivery_id = %delivery.id,
                    webhook_id = %webhook.id,
                    attempt,
                    error = %e,
                    "Failed to persist webhook delivery"
                );
            }

            if delivery.is_complete() {
                record_webhook_delivery(delivery.status);
                let success = delivery.status == DeliveryStatus::Success;
                if let Err(e) = self.update_webhook_status(&webhook.id, success).await {
                    error!(
                        webhook_id = %webhook.id,
                        error = %e,
                        "Failed to record webhook delivery outcome"
                    );
                }
                return Ok(delivery);
            }

            tokio::time::sleep(webhook.backoff_after(attempt)).await;
        }
    }

    /// Updates webhook failure tracking based on delivery result
    async fn update_webhook_status(
        &self,
        webhook_id: &WebhookId,
        success: bool,
    ) -> Result<(), DomainError> {
        if let Some(mut webhook) = self.webhook_repo.find_by_id(webhook_id).await? {
            if success {
                webhook.record_success();
            } else {
                webhook.record_failure();
            }
            self.webhook_repo.update(webhook).await?;
        }
        Ok(())
    }
}

fn response_is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn validate_webhook(webhook: &Webhook) -> Result<(), DomainError> {
    if webhook.url.is_empty() {
        return Err(DomainError::validation("URL is required"));
    }

    if !webhook.url.starts_with("http://") && !webhook.url.starts_with("https://") {
        return Err(DomainError::validation(
            "URL must start with http:// or https://",
        ));
    }

    if webhook.events.is_empty() {
        return Err(DomainError::validation(
            "At least one event must be subscribed",
        ));
    }

    Ok(())
}

#[async_trait]
impl<W: WebhookRepository, D: WebhookDeliveryRepository> WebhookServiceTrait
    for WebhookService<W, D>
{
    async fn create(&self, mut webhook: Webhook) -> Result<Webhook, DomainError> {
        validate_webhook(&webhook)?;
        webhook.updated_at = Utc::now();
        self.webhook_repo.create(webhook).await
    }

    async fn delete(&self, id: &str) -> Result<(), DomainError> {
        self.webhook_repo.delete(&WebhookId::new(id)).await
    }

    async fn get(&self, id: &str) -> Result<Webhook, DomainError> {
        self.webhook_repo
            .find_by_id(&WebhookId::new(id))
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Webhook '{}' not found", id)))
    }

    async fn list(&self) -> Result<Vec<Webhook>, DomainError> {
        self.webhook_repo.list().await
    }

    async fn dispatch(&self, event: &EngineEvent) -> Result<Vec<WebhookDelivery>, DomainError> {
        let webhooks = self
            .webhook_repo
            .find_active_by_event(event.event_type)
            .await?;

        if webhooks.is_empty() {
            debug!(event_type = %event.event_type, "No webhooks subscribed");
            return Ok(vec![]);
        }

        let payload = serde_json::to_value(event)
            .map_err(|e| DomainError::internal(format!("Failed to serialize event: {}", e)))?;

        // Every pending row exists before the first attempt is made
        let mut pending = Vec::with_capacity(webhooks.len());
        for webhook in webhooks {
            let delivery = WebhookDelivery::new(webhook.id.clone(), event, payload.clone());
            let delivery = self.delivery_repo.create(delivery).await?;
            pending.push((webhook, delivery));
        }

        let results = join_all(
            pending
                .into_iter()
                .map(|(webhook, delivery)| async move { self.deliver(&webhook, delivery).await }),
        )
        .await;

        let deliveries = results.into_iter().collect::<Result<Vec<_>, _>>()?;

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            deliveries = deliveries.len(),
            "Webhook event dispatched"
        );

        Ok(deliveries)
    }

    async fn get_deliveries(
        &self,
        webhook_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WebhookDelivery>, DomainError> {
        // Verify webhook exists
        self.get(webhook_id).await?;

        self.delivery_repo
            .find_by_webhook(&WebhookId::new(webhook_id), limit, offset)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::{MockWebhookDeliveryRepository, MockWebhookRepository, WebhookStatus};
    use crate::domain::EventType;
    use crate::infrastructure::webhook::{
        InMemoryWebhookDeliveryRepository, InMemoryWebhookRepository,
    };
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type TestService = WebhookService<InMemoryWebhookRepository, InMemoryWebhookDeliveryRepository>;

    fn create_service() -> TestService {
        WebhookService::new(
            Arc::new(InMemoryWebhookRepository::new()),
            Arc::new(InMemoryWebhookDeliveryRepository::new()),
        )
    }

    fn event() -> EngineEvent {
        EngineEvent::new(EventType::JobCompleted, "req-1", json!({"version": 1}))
            .with_job_id("job-1")
    }

    fn hook(url: String) -> Webhook {
        Webhook::new("hook-1", "Test Hook", url)
            .with_event(EventType::JobCompleted)
            .with_secret("s3cret")
            .with_retry_config(3, 1)
            .with_timeout_ms(2000)
    }

    #[tokio::test]
    async fn test_create_webhook_validation() {
        let service = create_service();

        let webhook = Webhook::new("hook-1", "Test Hook", "").with_event(EventType::JobFailed);
        assert!(matches!(
            service.create(webhook).await,
            Err(DomainError::Validation { message: _ })
        ));

        let webhook =
            Webhook::new("hook-1", "Test Hook", "ftp://example.com").with_event(EventType::JobFailed);
        assert!(matches!(
            service.create(webhook).await,
            Err(DomainError::Validation { message: _ })
        ));

        let webhook = Webhook::new("hook-1", "Test Hook", "https://example.com/webhook");
        assert!(matches!(
            service.create(webhook).await,
            Err(DomainError::Validation { message: _ })
        ));
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let service = create_service();
        service
            .create(hook("https://example.com/webhook".into()))
            .await
            .unwrap();

        assert_eq!(service.get("hook-1").await.unwrap().name, "Test Hook");
        assert_eq!(service.list().await.unwrap().len(), 1);

        service.delete("hook-1").await.unwrap();
        assert!(matches!(
            service.get("hook-1").await,
            Err(DomainError::NotFound { message: _ })
        ));
    }

    #[test]
    fn test_signature_roundtrip() {
        let payload = r#"{"event_type":"job.completed"}"#;
        let signature = sign_payload("my-secret", payload).unwrap();

        assert_eq!(signature, sign_payload("my-secret", payload).unwrap());
        assert_ne!(signature, sign_payload("other-secret", payload).unwrap());
        assert!(verify_signature(
            "my-secret",
            payload,
            &format!("sha256={}", signature)
        ));
        assert!(!verify_signature("my-secret", "tampered", &format!("sha256={}", signature)));
        assert!(!verify_signature("my-secret", payload, &signature));
    }

    #[tokio::test]
    async fn test_always_failing_target_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .expect(3)
            .mount(&server)
            .await;

        let service = create_service();
        service
            .create(hook(format!("{}/hook", server.uri())))
            .await
            .unwrap();

        let deliveries = service.dispatch(&event()).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].attempts, 3);
        assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
        assert_eq!(deliveries[0].response_status, Some(500));
        assert_eq!(deliveries[0].response_body.as_deref(), Some("down"));

        let webhook = service.get("hook-1").await.unwrap();
        assert_eq!(webhook.failure_count, 1);
    }

    #[tokio::test]
    async fn test_target_recovers_on_second_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let service = create_service();
        service.create(hook(server.uri())).await.unwrap();

        let deliveries = service.dispatch(&event()).await.unwrap();
        assert_eq!(deliveries[0].attempts, 2);
        assert_eq!(deliveries[0].status, DeliveryStatus::Success);
        assert!(deliveries[0].completed_at.is_some());

        let history = service.get_deliveries("hook-1", 10, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, DeliveryStatus::Success);
    }

    #[tokio::test]
    async fn test_request_is_signed_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/json"))
            .and(header("x-webhook-event", "job.completed"))
            .and(header("x-tenant", "acme"))
            .and(header_exists("x-webhook-delivery-id"))
            .and(header_exists("x-webhook-signature"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let service = create_service();
        service
            .create(hook(server.uri()).with_header("X-Tenant", "acme"))
            .await
            .unwrap();

        let deliveries = service.dispatch(&event()).await.unwrap();
        assert_eq!(deliveries[0].status, DeliveryStatus::Success);

        let received = server.received_requests().await.unwrap();
        let body = String::from_utf8(received[0].body.clone()).unwrap();
        let signature = received[0]
            .headers
            .get("x-webhook-signature")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(verify_signature("s3cret", &body, &signature));

        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(payload["event_type"], "job.completed");
        assert_eq!(payload["subject_id"], "req-1");
    }

    #[tokio::test]
    async fn test_long_response_body_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(5000)))
            .mount(&server)
            .await;

        let service = create_service();
        service.create(hook(server.uri())).await.unwrap();

        let deliveries = service.dispatch(&event()).await.unwrap();
        assert_eq!(
            deliveries[0].response_body.as_ref().unwrap().len(),
            MAX_RESPONSE_BODY_CHARS
        );
    }

    #[tokio::test]
    async fn test_unreachable_target_fails_terminally() {
        let service = create_service();
        service
            .create(hook("http://127.0.0.1:9/unreachable".into()).with_retry_config(2, 1))
            .await
            .unwrap();

        let deliveries = service.dispatch(&event()).await.unwrap();
        assert_eq!(deliveries[0].attempts, 2);
        assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
        assert!(deliveries[0].error_message.is_some());
        assert!(deliveries[0].response_status.is_none());
    }

    #[tokio::test]
    async fn test_paused_and_unsubscribed_webhooks_are_skipped() {
        let service = create_service();
        service
            .create(hook("https://example.com/a".into()).with_status(WebhookStatus::Paused))
            .await
            .unwrap();

        let mut other = hook("https://example.com/b".into());
        other.id = WebhookId::new("hook-2");
        other.events = vec![EventType::JobFailed];
        service.create(other).await.unwrap();

        let deliveries = service.dispatch(&event()).await.unwrap();
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_no_subscribers_creates_no_deliveries() {
        let mut webhooks = MockWebhookRepository::new();
        webhooks
            .expect_find_active_by_event()
            .withf(|event| *event == EventType::JobCompleted)
            .times(1)
            .returning(|_| Ok(vec![]));
        let mut deliveries = MockWebhookDeliveryRepository::new();
        deliveries.expect_create().never();

        let service = WebhookService::new(Arc::new(webhooks), Arc::new(deliveries));
        assert!(service.dispatch(&event()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_store_failure_skips_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let target = hook(format!("{}/hook", server.uri()));
        let mut webhooks = MockWebhookRepository::new();
        webhooks
            .expect_find_active_by_event()
            .returning(move |_| Ok(vec![target.clone()]));
        let mut deliveries = MockWebhookDeliveryRepository::new();
        deliveries
            .expect_create()
            .times(1)
            .returning(|_| Err(DomainError::storage("disk full")));

        let service = WebhookService::new(Arc::new(webhooks), Arc::new(deliveries));
        let err = service.dispatch(&event()).await.unwrap_err();
        assert!(matches!(err, DomainError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_mid_retry_still_reaches_terminal_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let target = hook(format!("{}/hook", server.uri()));
        let mut webhooks = MockWebhookRepository::new();
        webhooks
            .expect_find_active_by_event()
            .returning(move |_| Ok(vec![target.clone()]));
        webhooks
            .expect_find_by_id()
            .returning(|_| Err(DomainError::storage("webhook store offline")));

        let mut deliveries = MockWebhookDeliveryRepository::new();
        deliveries.expect_create().times(1).returning(Ok);
        let mut seq = mockall::Sequence::new();
        deliveries
            .expect_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(DomainError::storage("disk full")));
        deliveries
            .expect_update()
            .withf(|d| d.status == DeliveryStatus::Success)
            .times(1)
            .in_sequence(&mut seq)
            .returning(Ok);

        let service = WebhookService::new(Arc::new(webhooks), Arc::new(deliveries));
        let results = service.dispatch(&event()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, DeliveryStatus::Success);
        assert_eq!(results[0].attempts, 2);
    }
}
