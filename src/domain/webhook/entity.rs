//! Webhook domain entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::event::{EngineEvent, EventType};

/// Unique identifier for a webhook
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookId(String);

impl WebhookId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WebhookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WebhookId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WebhookId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    /// Webhook is active and will receive events
    #[default]
    Active,
    /// Webhook is paused and will not receive events
    Paused,
}

/// Subscription of an HTTP endpoint to engine events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    /// Unique identifier
    pub id: WebhookId,
    /// Display name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Target URL for the webhook
    pub url: String,
    /// Secret for HMAC signature verification
    #[serde(default)]
    pub secret: Option<String>,
    /// Event types to subscribe to
    #[serde(default)]
    pub events: Vec<EventType>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Current status
    #[serde(default)]
    pub status: WebhookStatus,
    /// Total delivery attempts per event, including the first
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Delay before the second attempt; doubles after each failure
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Timeout in milliseconds for each HTTP request
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive failed deliveries
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// When the last successful delivery occurred
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
    /// When the last failed delivery occurred
    #[serde(default)]
    pub last_failure_at: Option<DateTime<Utc>>,
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Webhook {
    /// Creates a new webhook with default settings
    pub fn new(id: impl Into<WebhookId>, name: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            url: url.into(),
            secret: None,
            events: Vec::new(),
            headers: HashMap::new(),
            status: WebhookStatus::Active,
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
            failure_count: 0,
            created_at: now,
            updated_at: now,
            last_success_at: None,
            last_failure_at: None,
        }
    }

    /// Sets the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the secret for HMAC signature
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Adds an event type to subscribe to
    pub fn with_event(mut self, event: EventType) -> Self {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
        self
    }

    /// Sets multiple event types
    pub fn with_events(mut self, events: Vec<EventType>) -> Self {
        self.events = events;
        self
    }

    /// Adds a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the status
    pub fn with_status(mut self, status: WebhookStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets retry configuration
    pub fn with_retry_config(mut self, retry_count: u32, delay_ms: u64) -> Self {
        self.retry_count = retry_count;
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Sets request timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Checks if the webhook is subscribed to an event type
    pub fn is_subscribed_to(&self, event: EventType) -> bool {
        self.events.contains(&event)
    }

    /// Checks if the webhook is active
    pub fn is_active(&self) -> bool {
        self.status == WebhookStatus::Active
    }

    /// Total attempts per delivery; never less than one
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.max(1)
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1).min(16));
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor))
    }

    /// Records a successful delivery
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.last_success_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Records a delivery that exhausted its attempts
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}

/// Unique identifier for a webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookDeliveryId(String);

impl WebhookDeliveryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("dlv-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WebhookDeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WebhookDeliveryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WebhookDeliveryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created or between attempts
    Pending,
    /// Target acknowledged with 2xx
    Success,
    /// All attempts exhausted
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Record of delivering one event to one webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    /// Unique identifier
    pub id: WebhookDeliveryId,
    /// Webhook this delivery belongs to
    pub webhook_id: WebhookId,
    /// Event that triggered the delivery
    pub event_id: String,
    /// Event type that triggered the delivery
    pub event_type: EventType,
    /// Event payload (JSON)
    pub payload: serde_json::Value,
    /// Delivery status
    pub status: DeliveryStatus,
    /// Number of attempts made
    pub attempts: u32,
    /// HTTP response status code (if received)
    pub response_status: Option<u16>,
    /// HTTP response body (truncated if large)
    pub response_body: Option<String>,
    /// Error message of the last failed attempt
    pub error_message: Option<String>,
    /// When the delivery was created
    pub created_at: DateTime<Utc>,
    /// When the last attempt was made
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the next retry is scheduled
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When the delivery reached success or failed
    pub completed_at: Option<DateTime<Utc>>,
}

impl WebhookDelivery {
    /// Creates a new pending delivery for `event`
    pub fn new(webhook_id: WebhookId, event: &EngineEvent, payload: serde_json::Value) -> Self {
        Self {
            id: WebhookDeliveryId::generate(),
            webhook_id,
            event_id: event.id.clone(),
            event_type: event.event_type,
            payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            response_status: None,
            response_body: None,
            error_message: None,
            created_at: Utc::now(),
            last_attempt_at: None,
            next_retry_at: None,
            completed_at: None,
        }
    }

    /// Records a successful attempt
    pub fn record_success(&mut self, status: u16, body: Option<String>) {
        self.attempts += 1;
        self.status = DeliveryStatus::Success;
        self.response_status = Some(status);
        self.response_body = body;
        self.error_message = None;
        self.last_attempt_at = Some(Utc::now());
        self.completed_at = Some(Utc::now());
        self.next_retry_at = None;
    }

    /// Records a failed attempt; the delivery fails for good once
    /// `max_attempts` is reached, otherwise stays pending until `retry_in`
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        status: Option<u16>,
        body: Option<String>,
        max_attempts: u32,
        retry_in: Duration,
    ) {
        self.attempts += 1;
        self.response_status = status;
        self.response_body = body;
        self.error_message = Some(error.into());
        self.last_attempt_at = Some(Utc::now());

        if self.attempts >= max_attempts {
            self.status = DeliveryStatus::Failed;
            self.completed_at = Some(Utc::now());
            self.next_retry_at = None;
        } else {
            self.status = DeliveryStatus::Pending;
            let delay = chrono::Duration::from_std(retry_in).unwrap_or_else(|_| chrono::Duration::zero());
            self.next_retry_at = Some(Utc::now() + delay);
        }
    }

    /// Checks if the delivery is complete
    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> EngineEvent {
        EngineEvent::new(EventType::JobCompleted, "req-1", json!({"version": 1}))
    }

    #[test]
    fn test_webhook_creation() {
        let webhook = Webhook::new("hook-1", "My Webhook", "https://example.com/webhook");

        assert_eq!(webhook.id.as_str(), "hook-1");
        assert_eq!(webhook.url, "https://example.com/webhook");
        assert!(webhook.is_active());
        assert_eq!(webhook.retry_count, 3);
    }

    #[test]
    fn test_webhook_with_events() {
        let webhook = Webhook::new("hook-1", "My Webhook", "https://example.com/webhook")
            .with_event(EventType::JobCompleted)
            .with_event(EventType::JobFailed)
            .with_event(EventType::JobFailed);

        assert_eq!(webhook.events.len(), 2);
        assert!(webhook.is_subscribed_to(EventType::JobFailed));
        assert!(!webhook.is_subscribed_to(EventType::JobProgress));
    }

    #[test]
    fn test_webhook_backoff_doubles() {
        let webhook = Webhook::new("h", "h", "http://x").with_retry_config(4, 100);
        assert_eq!(webhook.backoff_after(1), Duration::from_millis(100));
        assert_eq!(webhook.backoff_after(2), Duration::from_millis(200));
        assert_eq!(webhook.backoff_after(3), Duration::from_millis(400));
        assert_eq!(webhook.max_attempts(), 4);
        assert_eq!(Webhook::new("h", "h", "u").with_retry_config(0, 1).max_attempts(), 1);
    }

    #[test]
    fn test_webhook_failure_tracking() {
        let mut webhook = Webhook::new("hook-1", "My Webhook", "https://example.com/webhook");

        webhook.record_failure();
        webhook.record_failure();
        assert_eq!(webhook.failure_count, 2);
        assert!(webhook.is_active());

        webhook.record_success();
        assert_eq!(webhook.failure_count, 0);
        assert!(webhook.last_success_at.is_some());
    }

    #[test]
    fn test_delivery_creation() {
        let event = event();
        let delivery = WebhookDelivery::new(WebhookId::new("hook-1"), &event, json!({}));

        assert!(delivery.id.as_str().starts_with("dlv-"));
        assert_eq!(delivery.event_id, event.id);
        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.attempts, 0);
    }

    #[test]
    fn test_delivery_success() {
        let mut delivery = WebhookDelivery::new(WebhookId::new("hook-1"), &event(), json!({}));

        delivery.record_success(200, Some("OK".to_string()));

        assert_eq!(delivery.status, DeliveryStatus::Success);
        assert_eq!(delivery.attempts, 1);
        assert!(delivery.is_complete());
    }

    #[test]
    fn test_delivery_failure_with_retry() {
        let mut delivery = WebhookDelivery::new(WebhookId::new("hook-1"), &event(), json!({}));

        delivery.record_failure("Connection refused", None, None, 3, Duration::from_millis(50));

        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.attempts, 1);
        assert!(!delivery.is_complete());
        assert!(delivery.next_retry_at.is_some());
    }

    #[test]
    fn test_delivery_failed_after_max_attempts() {
        let mut delivery = WebhookDelivery::new(WebhookId::new("hook-1"), &event(), json!({}));

        for _ in 0..3 {
            delivery.record_failure("HTTP 500", Some(500), None, 3, Duration::ZERO);
        }

        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.attempts, 3);
        assert!(delivery.is_complete());
        assert!(delivery.next_retry_at.is_none());
    }
}
