//! Webhook infrastructure implementations

mod in_memory;
mod service;

pub use in_memory::{InMemoryWebhookDeliveryRepository, InMemoryWebhookRepository};
pub use service::{
    sign_payload, verify_signature, WebhookService, WebhookServiceTrait, MAX_RESPONSE_BODY_CHARS,
};
