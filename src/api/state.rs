//! Shared handler state

use std::sync::Arc;

use crate::domain::{OutputRepository, RequestRepository, WorkflowRepository};
use crate::infrastructure::event::EventBus;
use crate::infrastructure::job::JobLifecycleManager;
use crate::infrastructure::webhook::WebhookServiceTrait;

/// Application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<JobLifecycleManager>,
    pub requests: Arc<dyn RequestRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub outputs: Arc<dyn OutputRepository>,
    pub webhooks: Arc<dyn WebhookServiceTrait>,
    pub events: EventBus,
}
