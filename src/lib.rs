//! PMP Workflow Engine
//!
//! Runs multi-block LLM workflows against user requests:
//! - Variable resolution and prompt compilation per block
//! - LLM invocation with per-call timeout, retry and schema validation
//! - Job lifecycle with compare-and-set transitions and resubmission
//! - Versioned output history per request
//! - Lifecycle events over server-sent events and signed webhooks

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use api::state::AppState;
use domain::{JobId, LlmProvider, PromptCompiler, WorkflowRepository};
use infrastructure::{
    event::{spawn_webhook_dispatcher, EventBus},
    job::{InMemoryJobRepository, JobLifecycleManager, JobQueue, JobStores, WorkerPool},
    llm::{HttpClient, LlmInvoker, OpenAiProvider},
    output::InMemoryOutputRepository,
    request::InMemoryRequestRepository,
    webhook::{InMemoryWebhookDeliveryRepository, InMemoryWebhookRepository, WebhookService, WebhookServiceTrait},
    workflow::{load_workflow_dir, InMemoryWorkflowRepository, WorkflowExecutorImpl},
};

/// Wired engine before any background task runs
pub struct Engine {
    pub state: AppState,
    job_receiver: mpsc::Receiver<JobId>,
}

/// Background tasks of a started engine
pub struct RunningEngine {
    pub workers: WorkerPool,
    pub dispatcher: JoinHandle<()>,
}

impl RunningEngine {
    /// Wait for workers and the dispatcher after `shutdown` was cancelled
    pub async fn join(self) {
        self.workers.join().await;
        if let Err(e) = self.dispatcher.await {
            tracing::error!(error = %e, "Webhook dispatcher ended abnormally");
        }
    }
}

impl Engine {
    /// Start the worker pool and webhook dispatcher, then requeue jobs
    /// left pending
    pub async fn start(self, config: &AppConfig, shutdown: CancellationToken) -> anyhow::Result<RunningEngine> {
        let workers = WorkerPool::start(
            self.state.lifecycle.clone(),
            self.job_receiver,
            config.engine.worker_count,
            shutdown.clone(),
        );
        let dispatcher = spawn_webhook_dispatcher(
            &self.state.events,
            self.state.webhooks.clone(),
            config.events.webhook_concurrency,
            shutdown,
        );

        self.state.lifecycle.requeue_pending().await?;

        Ok(RunningEngine { workers, dispatcher })
    }

    /// Take the queue receiver to drive jobs by hand
    pub fn into_parts(self) -> (AppState, mpsc::Receiver<JobId>) {
        (self.state, self.job_receiver)
    }
}

/// Build the OpenAI-compatible provider from configuration
pub fn create_llm_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let client = HttpClient::with_timeout(Duration::from_millis(config.llm.timeout_ms))?;
    let api_key = config.llm.api_key.clone().filter(|k| !k.is_empty());

    info!(base_url = %config.llm.base_url, "LLM provider configured");
    Ok(Arc::new(OpenAiProvider::with_base_url(
        client,
        api_key,
        config.llm.base_url.clone(),
    )))
}

/// Wire stores, engine and services, and load seed definitions
pub async fn build_engine(config: &AppConfig, provider: Arc<dyn LlmProvider>) -> anyhow::Result<Engine> {
    let engine_config = &config.engine;

    let workflows = Arc::new(InMemoryWorkflowRepository::new());
    if let Some(dir) = &config.seed.workflows_dir {
        for workflow in load_workflow_dir(dir)? {
            info!(workflow_id = %workflow.id(), status = %workflow.status(), "Loaded workflow");
            workflows.save(workflow).await?;
        }
    }

    let webhooks: Arc<dyn WebhookServiceTrait> = Arc::new(WebhookService::new(
        Arc::new(InMemoryWebhookRepository::new()),
        Arc::new(InMemoryWebhookDeliveryRepository::new()),
    ));
    for seed in &config.seed.webhooks {
        let webhook = webhooks.create(seed.to_webhook()).await?;
        info!(webhook_id = %webhook.id, url = %webhook.url, "Registered webhook");
    }

    let requests = Arc::new(InMemoryRequestRepository::new());
    let outputs = Arc::new(InMemoryOutputRepository::new());
    let events = EventBus::new(config.events.capacity);

    let executor = Arc::new(WorkflowExecutorImpl::new(
        PromptCompiler::new(
            engine_config.default_model.clone(),
            engine_config.default_parameters.clone(),
        ),
        LlmInvoker::new(provider, engine_config.invoker_config()),
    ));

    let (queue, job_receiver) = JobQueue::bounded(engine_config.queue_capacity);
    let lifecycle = Arc::new(JobLifecycleManager::new(
        JobStores {
            jobs: Arc::new(InMemoryJobRepository::new()),
            requests: requests.clone(),
            workflows: workflows.clone(),
            outputs: outputs.clone(),
        },
        executor,
        events.clone(),
        queue,
        engine_config.lifecycle_config(),
    ));

    Ok(Engine {
        state: AppState {
            lifecycle,
            requests,
            workflows,
            outputs,
            webhooks,
            events,
        },
        job_receiver,
    })
}
