//! Job lifecycle manager
//!
//! Owns every job state change: triggering, cancellation, resubmission and
//! the execution of a claimed job. Status changes go through the job
//! repository's compare-and-set so a job is finished by exactly one writer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::LifecycleError;
use super::worker::JobQueue;
use crate::domain::{
    BlockResult, DomainError, EngineEvent, EventType, ExecutionObserver, ExecutionRequest,
    FailureKind, Job, JobError, JobId, JobRepository, JobStatus, JobTransition, OutputRecord,
    OutputRepository, RequestId, RequestRepository, ResolutionWarning, WorkflowError,
    WorkflowExecutor, WorkflowId, WorkflowRepository,
};
use crate::infrastructure::event::EventBus;
use crate::infrastructure::observability::record_job_transition;

/// Resubmission limits
#[derive(Debug, Clone)]
pub struct JobLifecycleConfig {
    /// How many times a chain of attempts may be resubmitted
    pub max_job_retries: u32,
    /// Resubmit jobs that failed for a transient reason without waiting for
    /// a caller
    pub auto_resubmit: bool,
}

impl Default for JobLifecycleConfig {
    fn default() -> Self {
        Self {
            max_job_retries: 3,
            auto_resubmit: true,
        }
    }
}

/// Stores the lifecycle manager reads and writes
#[derive(Debug, Clone)]
pub struct JobStores {
    pub jobs: Arc<dyn JobRepository>,
    pub requests: Arc<dyn RequestRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub outputs: Arc<dyn OutputRepository>,
}

/// Coordinates jobs from trigger to terminal state
#[derive(Debug)]
pub struct JobLifecycleManager {
    stores: JobStores,
    executor: Arc<dyn WorkflowExecutor>,
    events: EventBus,
    queue: JobQueue,
    config: JobLifecycleConfig,
    /// Cancellation tokens of jobs currently executing on this instance
    running: RwLock<HashMap<String, CancellationToken>>,
}

impl JobLifecycleManager {
    pub fn new(
        stores: JobStores,
        executor: Arc<dyn WorkflowExecutor>,
        events: EventBus,
        queue: JobQueue,
        config: JobLifecycleConfig,
    ) -> Self {
        Self {
            stores,
            executor,
            events,
            queue,
            config,
            running: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &JobLifecycleConfig {
        &self.config
    }

    /// Create a pending job for `request_id` and queue it.
    ///
    /// Instructions stored on the request apply first; `custom_instructions`
    /// given here override them per block.
    pub async fn trigger(
        &self,
        request_id: RequestId,
        workflow_id: WorkflowId,
        custom_instructions: HashMap<String, String>,
    ) -> Result<Job, LifecycleError> {
        let request = self
            .stores
            .requests
            .get(&request_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Request not found: {}", request_id)))?;

        let workflow = self
            .stores
            .workflows
            .get(&workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(workflow_id.as_str()))?;

        if !workflow.is_triggerable() {
            return Err(
                WorkflowError::not_triggerable(workflow_id.as_str(), workflow.status().as_str())
                    .into(),
            );
        }

        if let Some(active) = self.stores.jobs.find_active_for_request(&request_id).await? {
            return Err(JobError::request_busy(request_id.as_str(), active.id().as_str()).into());
        }

        let mut instructions = request.active_instructions();
        instructions.extend(custom_instructions);

        let job = Job::new(request_id, workflow_id).with_custom_instructions(instructions);
        let job = self.stores.jobs.create_exclusive(job).await?;

        self.submit(job).await
    }

    pub async fn get(&self, id: &JobId) -> Result<Job, LifecycleError> {
        self.stores
            .jobs
            .get(id)
            .await?
            .ok_or_else(|| JobError::not_found(id.as_str()).into())
    }

    pub async fn list_for_request(&self, request_id: &RequestId) -> Result<Vec<Job>, LifecycleError> {
        Ok(self.stores.jobs.list_for_request(request_id).await?)
    }

    /// Cancel a job.
    ///
    /// A pending job fails right away. A running job is flagged and stops
    /// before its next block.
    pub async fn cancel(&self, id: &JobId) -> Result<Job, LifecycleError> {
        let job = self.get(id).await?;

        match job.status() {
            JobStatus::Pending => {
                let cancelled = self
                    .stores
                    .jobs
                    .transition(
                        id,
                        JobStatus::Pending,
                        JobTransition::Fail {
                            kind: FailureKind::Cancelled,
                            message: WorkflowError::Cancelled.to_string(),
                        },
                    )
                    .await?;

                match cancelled {
                    Some(failed) => {
                        record_job_transition(JobStatus::Failed);
                        info!(job_id = %id, request_id = %failed.request_id(), "Pending job cancelled");
                        self.publish_failed(&failed, false);
                        Ok(failed)
                    }
                    // A worker claimed it in the meantime
                    None => self.cancel_running(id).await,
                }
            }
            JobStatus::Running => self.cancel_running(id).await,
            status => Err(JobError::not_allowed(id.as_str(), status, "cancelled").into()),
        }
    }

    async fn cancel_running(&self, id: &JobId) -> Result<Job, LifecycleError> {
        let job = self.stores.jobs.request_cancel(id).await?;

        if let Some(token) = self.running.read().await.get(id.as_str()) {
            token.cancel();
        }

        info!(job_id = %id, request_id = %job.request_id(), "Cancellation requested");
        Ok(job)
    }

    /// Resubmit a failed job as a new attempt
    pub async fn retry(&self, id: &JobId) -> Result<Job, LifecycleError> {
        let job = self.get(id).await?;
        self.resubmit(&job).await
    }

    async fn resubmit(&self, job: &Job) -> Result<Job, LifecycleError> {
        if job.status() != JobStatus::Failed {
            return Err(JobError::not_allowed(job.id().as_str(), job.status(), "retried").into());
        }

        if job.retry_count() >= self.config.max_job_retries {
            return Err(JobError::RetryLimitReached {
                job_id: job.id().to_string(),
                max_retries: self.config.max_job_retries,
                reason: job.error().unwrap_or("unknown error").to_string(),
            }
            .into());
        }

        // Only the newest attempt of a chain may be resubmitted
        let jobs = self.stores.jobs.list_for_request(job.request_id()).await?;
        if let Some(next) = jobs.iter().find(|j| j.previous_job_id() == Some(job.id())) {
            return Err(JobError::superseded(job.id().as_str(), next.id().as_str()).into());
        }

        let next = self.stores.jobs.create_exclusive(job.resubmission()?).await?;
        info!(
            job_id = %next.id(),
            previous_job_id = %job.id(),
            request_id = %next.request_id(),
            attempt = next.attempt(),
            "Job resubmitted"
        );

        self.submit(next).await
    }

    async fn submit(&self, job: Job) -> Result<Job, LifecycleError> {
        record_job_transition(JobStatus::Pending);

        if let Err(err) = self.queue.enqueue(job.id().clone()) {
            warn!(job_id = %job.id(), error = %err, "Could not queue job");
            self.stores
                .jobs
                .transition(
                    job.id(),
                    JobStatus::Pending,
                    JobTransition::Fail {
                        kind: FailureKind::Persistence,
                        message: err.to_string(),
                    },
                )
                .await?;
            record_job_transition(JobStatus::Failed);
            return Err(err.into());
        }

        debug!(job_id = %job.id(), request_id = %job.request_id(), "Job queued");
        Ok(job)
    }

    /// Queue every job left pending, e.g. after a restart
    pub async fn requeue_pending(&self) -> Result<usize, LifecycleError> {
        let pending = self.stores.jobs.list_by_status(JobStatus::Pending).await?;
        for job in &pending {
            self.queue.enqueue(job.id().clone())?;
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "Requeued pending jobs");
        }
        Ok(pending.len())
    }

    /// Claim and execute a job.
    ///
    /// Does nothing when the job is no longer pending, so an id that was
    /// queued twice runs once.
    pub async fn run_job(&self, id: &JobId) -> Result<(), LifecycleError> {
        let claimed = self
            .stores
            .jobs
            .transition(id, JobStatus::Pending, JobTransition::Start)
            .await?;

        let Some(job) = claimed else {
            debug!(job_id = %id, "Job is no longer pending, skipping");
            return Ok(());
        };

        // Only the claiming call registers a token, so a duplicate run of the
        // same id cannot replace or remove it
        let token = CancellationToken::new();
        self.running
            .write()
            .await
            .insert(id.as_str().to_string(), token.clone());

        let result = self.run_claimed(job, &token).await;

        self.running.write().await.remove(id.as_str());
        result
    }

    async fn run_claimed(&self, job: Job, token: &CancellationToken) -> Result<(), LifecycleError> {
        let id = job.id();

        record_job_transition(JobStatus::Running);
        info!(
            job_id = %id,
            request_id = %job.request_id(),
            workflow_id = %job.workflow_id(),
            attempt = job.attempt(),
            "Job started"
        );
        self.publish(
            &job,
            EventType::JobStarted,
            json!({
                "job_id": job.id(),
                "request_id": job.request_id(),
                "workflow_id": job.workflow_id(),
                "attempt": job.attempt(),
            }),
        );

        match self.execute(&job, token).await {
            Ok(record) => self.complete(&job, &record).await,
            Err(err) => self.fail(&job, err).await,
        }
    }

    async fn execute(&self, job: &Job, token: &CancellationToken) -> Result<OutputRecord, WorkflowError> {
        let request = self
            .stores
            .requests
            .get(job.request_id())
            .await?
            .ok_or_else(|| {
                WorkflowError::configuration(format!("Request '{}' no longer exists", job.request_id()))
            })?;

        let workflow = self
            .stores
            .workflows
            .get(job.workflow_id())
            .await?
            .ok_or_else(|| WorkflowError::not_found(job.workflow_id().as_str()))?;

        let execution = ExecutionRequest::new(request.text())
            .with_custom_instructions(job.custom_instructions().clone());
        let observer = JobObserver {
            manager: self,
            job,
            token,
        };

        let outcome = self.executor.execute(&workflow, &execution, &observer).await?;

        let record = OutputRecord::from_outcome(
            job.request_id().clone(),
            job.id().clone(),
            workflow.id().clone(),
            workflow.version(),
            outcome,
        );

        self.stores
            .outputs
            .append(record)
            .await
            .map_err(|e| WorkflowError::persistence(e.to_string()))
    }

    async fn complete(&self, job: &Job, record: &OutputRecord) -> Result<(), LifecycleError> {
        let completed = self
            .stores
            .jobs
            .transition(
                job.id(),
                JobStatus::Running,
                JobTransition::Complete {
                    output_version: record.version(),
                },
            )
            .await?;

        let Some(completed) = completed else {
            warn!(job_id = %job.id(), "Job left running state before completion was recorded");
            return Ok(());
        };

        record_job_transition(JobStatus::Completed);
        info!(
            job_id = %job.id(),
            request_id = %job.request_id(),
            output_version = record.version(),
            total_tokens = record.usage().total_tokens,
            duration_ms = record.duration_ms(),
            "Job completed"
        );
        self.publish(
            &completed,
            EventType::JobCompleted,
            json!({
                "job_id": completed.id(),
                "output_version": record.version(),
                "total_tokens": record.usage().total_tokens,
                "duration_ms": record.duration_ms(),
            }),
        );
        Ok(())
    }

    async fn fail(&self, job: &Job, err: WorkflowError) -> Result<(), LifecycleError> {
        let kind = err.kind();
        let failed = self
            .stores
            .jobs
            .transition(
                job.id(),
                JobStatus::Running,
                JobTransition::Fail {
                    kind,
                    message: err.to_string(),
                },
            )
            .await?;

        let Some(failed) = failed else {
            warn!(job_id = %job.id(), "Job left running state before failure was recorded");
            return Ok(());
        };

        let will_retry = self.config.auto_resubmit
            && kind.is_transient()
            && failed.retry_count() < self.config.max_job_retries;

        record_job_transition(JobStatus::Failed);
        warn!(
            job_id = %job.id(),
            request_id = %job.request_id(),
            failure_kind = %kind,
            error = %err,
            will_retry,
            "Job failed"
        );
        self.publish_failed(&failed, will_retry);

        if will_retry {
            if let Err(err) = self.resubmit(&failed).await {
                warn!(job_id = %job.id(), error = %err, "Automatic resubmission failed");
            }
        }
        Ok(())
    }

    fn publish_failed(&self, job: &Job, will_retry: bool) {
        self.publish(
            job,
            EventType::JobFailed,
            json!({
                "job_id": job.id(),
                "failure_kind": job.failure_kind(),
                "error": job.error(),
                "attempt": job.attempt(),
                "retry_count": job.retry_count(),
                "will_retry": will_retry,
            }),
        );
    }

    fn publish(&self, job: &Job, event_type: EventType, data: Value) {
        self.events.publish(
            EngineEvent::new(event_type, job.request_id().as_str(), data)
                .with_job_id(job.id().as_str()),
        );
    }
}

/// Bridges executor callbacks to job progress and cancellation
struct JobObserver<'a> {
    manager: &'a JobLifecycleManager,
    job: &'a Job,
    token: &'a CancellationToken,
}

#[async_trait]
impl<'a> ExecutionObserver for JobObserver<'a> {
    /// The local token covers cancels made through this manager; the stored
    /// flag covers cancels recorded by any other instance
    async fn is_cancelled(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }

        match self.manager.stores.jobs.get(self.job.id()).await {
            Ok(Some(job)) => job.cancel_requested(),
            Ok(None) => false,
            Err(err) => {
                warn!(job_id = %self.job.id(), error = %err, "Failed to read cancellation flag");
                false
            }
        }
    }

    async fn block_started(&self, block: &str, index: usize, total: usize) {
        debug!(job_id = %self.job.id(), block, index, total, "Block started");
        if let Err(err) = self
            .manager
            .stores
            .jobs
            .record_progress(self.job.id(), Some(block.to_string()), index)
            .await
        {
            warn!(job_id = %self.job.id(), error = %err, "Failed to record progress");
        }
    }

    async fn block_completed(&self, result: &BlockResult, total: usize, warnings: &[ResolutionWarning]) {
        let blocks_completed = result.index + 1;
        if let Err(err) = self
            .manager
            .stores
            .jobs
            .record_progress(self.job.id(), None, blocks_completed)
            .await
        {
            warn!(job_id = %self.job.id(), error = %err, "Failed to record progress");
        }

        self.manager.publish(
            self.job,
            EventType::JobProgress,
            json!({
                "job_id": self.job.id(),
                "block": result.block,
                "index": result.index,
                "total": total,
                "blocks_completed": blocks_completed,
                "model": result.model,
                "tokens": result.usage.total_tokens,
                "duration_ms": result.duration_ms,
                "attempts": result.attempts,
                "warnings": warnings,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::domain::llm::{MockLlmProvider, MockReply};
    use crate::domain::{
        Block, BlockInput, ModelParameters, ProcessingRequest, PromptCompiler, RetryPolicy,
        Workflow, WorkflowStatus,
    };
    use crate::infrastructure::llm::{LlmInvoker, LlmInvokerConfig};
    use crate::infrastructure::output::InMemoryOutputRepository;
    use crate::infrastructure::request::InMemoryRequestRepository;
    use crate::infrastructure::workflow::{InMemoryWorkflowRepository, WorkflowExecutorImpl};
    use crate::infrastructure::job::InMemoryJobRepository;

    struct Harness {
        manager: Arc<JobLifecycleManager>,
        jobs: Arc<InMemoryJobRepository>,
        outputs: Arc<InMemoryOutputRepository>,
        events: EventBus,
        receiver: mpsc::Receiver<JobId>,
    }

    impl Harness {
        /// Run queued jobs until the queue is empty
        async fn drain(&mut self) {
            while let Ok(id) = self.receiver.try_recv() {
                self.manager.run_job(&id).await.unwrap();
            }
        }
    }

    fn two_block_workflow(id: &str, status: WorkflowStatus) -> Workflow {
        Workflow::new(WorkflowId::new(id).unwrap(), "Review")
            .with_status(status)
            .with_blocks(vec![
                Block::new("draft", 0, "Draft: {text}").with_input(BlockInput::request_text("text")),
                Block::new("final", 1, "Polish: {draft}")
                    .with_input(BlockInput::block_field("draft", "draft", "content")),
            ])
    }

    async fn harness(provider: Arc<MockLlmProvider>, timeout_ms: u64, config: JobLifecycleConfig) -> Harness {
        let requests = Arc::new(InMemoryRequestRepository::new());
        requests
            .save(ProcessingRequest::new(RequestId::new("req-1").unwrap(), "Hello"))
            .await
            .unwrap();

        let workflows = Arc::new(InMemoryWorkflowRepository::with_workflows(vec![
            two_block_workflow("wf-review", WorkflowStatus::Active),
            two_block_workflow("wf-draft", WorkflowStatus::Draft),
        ]));

        let outputs = Arc::new(InMemoryOutputRepository::new());
        let invoker = LlmInvoker::new(
            provider,
            LlmInvokerConfig {
                call_timeout: Duration::from_millis(timeout_ms),
                retry: RetryPolicy::new(2).with_initial_delay(1).with_max_delay(2),
            },
        );
        let executor = Arc::new(WorkflowExecutorImpl::new(
            PromptCompiler::new("test-model", ModelParameters::default()),
            invoker,
        ));

        let events = EventBus::new(64);
        let (queue, receiver) = JobQueue::bounded(32);
        let jobs = Arc::new(InMemoryJobRepository::new());
        let stores = JobStores {
            jobs: jobs.clone(),
            requests,
            workflows,
            outputs: outputs.clone(),
        };

        Harness {
            manager: Arc::new(JobLifecycleManager::new(stores, executor, events.clone(), queue, config)),
            jobs,
            outputs,
            events,
            receiver,
        }
    }

    fn req() -> RequestId {
        RequestId::new("req-1").unwrap()
    }

    fn wf(id: &str) -> WorkflowId {
        WorkflowId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_job_runs_to_completion_with_events_in_order() {
        let provider = Arc::new(MockLlmProvider::echo());
        let mut h = harness(provider.clone(), 1000, JobLifecycleConfig::default()).await;
        let mut rx = h.events.subscribe();

        let job = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
        h.drain().await;

        let job = h.manager.get(job.id()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.output_version(), Some(1));
        assert_eq!(job.blocks_completed(), 2);

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.subject_id, "req-1");
            assert_eq!(event.job_id.as_deref(), Some(job.id().as_str()));
            types.push(event.event_type);
        }
        assert_eq!(
            types,
            vec![
                EventType::JobStarted,
                EventType::JobProgress,
                EventType::JobProgress,
                EventType::JobCompleted,
            ]
        );

        let latest = h.outputs.latest(&req()).await.unwrap().unwrap();
        assert_eq!(latest.results().len(), 2);
        assert_eq!(provider.prompts()[1], "Polish: Draft: Hello");
    }

    #[tokio::test]
    async fn test_trigger_rejects_busy_request() {
        let h = harness(Arc::new(MockLlmProvider::echo()), 1000, JobLifecycleConfig::default()).await;

        let first = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        let err = h
            .manager
            .trigger(req(), wf("wf-review"), HashMap::new())
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(err.to_string().contains(first.id().as_str()));
    }

    #[tokio::test]
    async fn test_trigger_validates_request_and_workflow() {
        let h = harness(Arc::new(MockLlmProvider::echo()), 1000, JobLifecycleConfig::default()).await;

        let err = h
            .manager
            .trigger(RequestId::new("req-missing").unwrap(), wf("wf-review"), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Domain(DomainError::NotFound { .. })));

        let err = h
            .manager
            .trigger(req(), wf("wf-missing"), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Workflow(WorkflowError::NotFound(_))));

        let err = h
            .manager
            .trigger(req(), wf("wf-draft"), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Workflow(WorkflowError::NotTriggerable { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_triggers_admit_one_job() {
        let h = harness(Arc::new(MockLlmProvider::echo()), 1000, JobLifecycleConfig::default()).await;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let manager = h.manager.clone();
                tokio::spawn(async move { manager.trigger(req(), wf("wf-review"), HashMap::new()).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(err) => assert!(err.is_conflict()),
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_trigger_instructions_override_stored_ones() {
        let provider = Arc::new(MockLlmProvider::echo());
        let mut h = harness(provider.clone(), 1000, JobLifecycleConfig::default()).await;

        let mut instructions = HashMap::new();
        instructions.insert("final".to_string(), "Keep it short.".to_string());
        let job = h.manager.trigger(req(), wf("wf-review"), instructions).await.unwrap();
        assert_eq!(job.custom_instructions().get("final").map(String::as_str), Some("Keep it short."));

        h.drain().await;
        assert!(provider.prompts()[1].contains("Keep it short."));
        assert!(!provider.prompts()[0].contains("Keep it short."));
    }

    #[tokio::test]
    async fn test_each_completion_appends_a_new_version() {
        let mut h = harness(Arc::new(MockLlmProvider::echo()), 1000, JobLifecycleConfig::default()).await;

        for expected in 1..=2 {
            let job = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
            h.drain().await;
            let job = h.manager.get(job.id()).await.unwrap();
            assert_eq!(job.output_version(), Some(expected));
        }

        let versions: Vec<u32> = h
            .outputs
            .list_for_request(&req())
            .await
            .unwrap()
            .iter()
            .map(|r| r.version())
            .collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_timeouts_exhaust_automatic_resubmission() {
        // Block one answers, block two times out on every call
        let mut replies = Vec::new();
        for _ in 0..3 {
            replies.push(MockReply::Text("ok".into()));
            replies.push(MockReply::Delayed(Duration::from_millis(200), "late".into()));
            replies.push(MockReply::Delayed(Duration::from_millis(200), "late".into()));
        }
        let provider = Arc::new(MockLlmProvider::scripted(
            replies,
            MockReply::Delayed(Duration::from_millis(200), "late".into()),
        ));
        let config = JobLifecycleConfig {
            max_job_retries: 2,
            auto_resubmit: true,
        };
        let mut h = harness(provider.clone(), 20, config).await;
        let mut rx = h.events.subscribe();

        h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        h.drain().await;

        let jobs = h.manager.list_for_request(&req()).await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.status() == JobStatus::Failed));

        let last = jobs.last().unwrap();
        assert_eq!(last.retry_count(), 2);
        assert_eq!(last.attempt(), 3);
        assert_eq!(last.failure_kind(), Some(FailureKind::Invocation));
        assert_eq!(last.previous_job_id(), Some(jobs[1].id()));
        assert!(h.outputs.list_for_request(&req()).await.unwrap().is_empty());
        assert_eq!(provider.call_count(), 9);

        let mut will_retry = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.event_type == EventType::JobFailed {
                will_retry.push(event.data["will_retry"].as_bool().unwrap());
            }
        }
        assert_eq!(will_retry, vec![true, true, false]);
    }

    #[tokio::test]
    async fn test_manual_retry_respects_limit() {
        let provider = Arc::new(MockLlmProvider::scripted(
            vec![],
            MockReply::Failure("model not found".into()),
        ));
        let config = JobLifecycleConfig {
            max_job_retries: 1,
            auto_resubmit: false,
        };
        let mut h = harness(provider, 1000, config).await;

        let first = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        h.drain().await;
        assert_eq!(h.manager.get(first.id()).await.unwrap().status(), JobStatus::Failed);

        let second = h.manager.retry(first.id()).await.unwrap();
        assert_eq!(second.attempt(), 2);
        assert_eq!(second.previous_job_id(), Some(first.id()));
        h.drain().await;

        let err = h.manager.retry(second.id()).await.unwrap_err();
        match err {
            LifecycleError::Job(JobError::RetryLimitReached { max_retries, reason, .. }) => {
                assert_eq!(max_retries, 1);
                assert!(reason.contains("model not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_superseded_attempt_cannot_be_retried() {
        let provider = Arc::new(MockLlmProvider::scripted(
            vec![],
            MockReply::Failure("model not found".into()),
        ));
        let config = JobLifecycleConfig {
            max_job_retries: 1,
            auto_resubmit: false,
        };
        let mut h = harness(provider, 1000, config).await;

        let first = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        h.drain().await;

        let second = h.manager.retry(first.id()).await.unwrap();
        h.drain().await;

        for _ in 0..3 {
            let err = h.manager.retry(first.id()).await.unwrap_err();
            assert!(err.is_conflict());
            match err {
                LifecycleError::Job(JobError::Superseded { next_job_id, .. }) => {
                    assert_eq!(next_job_id, second.id().as_str());
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        assert!(matches!(
            h.manager.retry(second.id()).await.unwrap_err(),
            LifecycleError::Job(JobError::RetryLimitReached { .. })
        ));
        assert_eq!(h.manager.list_for_request(&req()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_requires_failed_job() {
        let mut h = harness(Arc::new(MockLlmProvider::echo()), 1000, JobLifecycleConfig::default()).await;

        let job = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        h.drain().await;

        let err = h.manager.retry(job.id()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Job(JobError::NotAllowed { .. })));

        let err = h.manager.cancel(job.id()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Job(JobError::NotAllowed { .. })));
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let provider = Arc::new(MockLlmProvider::echo());
        let mut h = harness(provider.clone(), 1000, JobLifecycleConfig::default()).await;

        let job = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        let cancelled = h.manager.cancel(job.id()).await.unwrap();
        assert_eq!(cancelled.status(), JobStatus::Failed);
        assert_eq!(cancelled.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(cancelled.error(), Some("cancelled"));

        // The queued id is skipped by the worker
        h.drain().await;
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_running_job_stops_between_blocks() {
        let provider = Arc::new(MockLlmProvider::scripted(
            vec![MockReply::Delayed(Duration::from_millis(150), "draft".into())],
            MockReply::Text("final".into()),
        ));
        let mut h = harness(provider.clone(), 1000, JobLifecycleConfig::default()).await;

        let job = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        let id = h.receiver.recv().await.unwrap();

        let manager = h.manager.clone();
        let running = tokio::spawn(async move { manager.run_job(&id).await });

        tokio::time::sleep(Duration::from_millis(40)).await;
        let flagged = h.manager.cancel(job.id()).await.unwrap();
        assert!(flagged.cancel_requested());

        running.await.unwrap().unwrap();

        let job = h.manager.get(job.id()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(provider.call_count(), 1);
        assert!(h.outputs.latest(&req()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_run_keeps_job_cancellable() {
        let provider = Arc::new(MockLlmProvider::scripted(
            vec![MockReply::Delayed(Duration::from_millis(150), "draft".into())],
            MockReply::Text("final".into()),
        ));
        let mut h = harness(provider.clone(), 1000, JobLifecycleConfig::default()).await;

        let job = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        let id = h.receiver.recv().await.unwrap();

        let manager = h.manager.clone();
        let first_id = id.clone();
        let running = tokio::spawn(async move { manager.run_job(&first_id).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        // Same id delivered again, e.g. by a requeue
        h.manager.run_job(&id).await.unwrap();
        h.manager.cancel(job.id()).await.unwrap();

        running.await.unwrap().unwrap();

        let job = h.manager.get(job.id()).await.unwrap();
        assert_eq!(job.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stored_cancel_flag_stops_execution() {
        let provider = Arc::new(MockLlmProvider::scripted(
            vec![MockReply::Delayed(Duration::from_millis(150), "draft".into())],
            MockReply::Text("final".into()),
        ));
        let mut h = harness(provider.clone(), 1000, JobLifecycleConfig::default()).await;

        let job = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        let id = h.receiver.recv().await.unwrap();

        let manager = h.manager.clone();
        let running = tokio::spawn(async move { manager.run_job(&id).await });

        // Flag set by another instance sharing the store; no local token fires
        tokio::time::sleep(Duration::from_millis(40)).await;
        h.jobs.request_cancel(job.id()).await.unwrap();

        running.await.unwrap().unwrap();

        let job = h.manager.get(job.id()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_run_job_twice_executes_once() {
        let provider = Arc::new(MockLlmProvider::echo());
        let h = harness(provider.clone(), 1000, JobLifecycleConfig::default()).await;

        let job = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        h.manager.run_job(job.id()).await.unwrap();
        h.manager.run_job(job.id()).await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert_eq!(h.outputs.list_for_request(&req()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_requeue_pending() {
        let mut h = harness(Arc::new(MockLlmProvider::echo()), 1000, JobLifecycleConfig::default()).await;

        let job = h.manager.trigger(req(), wf("wf-review"), HashMap::new()).await.unwrap();
        assert_eq!(h.receiver.recv().await.unwrap(), *job.id());

        assert_eq!(h.manager.requeue_pending().await.unwrap(), 1);
        h.drain().await;
        assert_eq!(h.manager.get(job.id()).await.unwrap().status(), JobStatus::Completed);
    }
}
