//! Job queue and worker pool

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::service::JobLifecycleManager;
use crate::domain::{DomainError, JobId};

/// Sending half of the bounded job queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<JobId>,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` job ids
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<JobId>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a job without waiting; a full queue is reported as unavailable
    pub fn enqueue(&self, id: JobId) -> Result<(), DomainError> {
        self.sender.try_send(id).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                DomainError::unavailable("job-queue", "Job queue is full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                DomainError::unavailable("job-queue", "Job queue is closed")
            }
        })
    }
}

/// Fixed set of tasks pulling job ids off the queue
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers. They stop once `shutdown` is cancelled,
    /// after finishing the job in hand.
    pub fn start(
        manager: Arc<JobLifecycleManager>,
        receiver: mpsc::Receiver<JobId>,
        worker_count: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let worker_count = worker_count.max(1);

        let handles = (0..worker_count)
            .map(|worker| {
                let manager = manager.clone();
                let receiver = receiver.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(Box::pin(async move {
                    run_worker(worker, manager, receiver, shutdown).await;
                }))
            })
            .collect();

        info!(worker_count, "Worker pool started");
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    manager: Arc<JobLifecycleManager>,
    receiver: Arc<Mutex<mpsc::Receiver<JobId>>>,
    shutdown: CancellationToken,
) {
    debug!(worker, "Worker started");

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => None,
            id = async { receiver.lock().await.recv().await } => id,
        };

        let Some(job_id) = next else {
            break;
        };

        if let Err(e) = manager.run_job(&job_id).await {
            error!(worker, job_id = %job_id, error = %e, "Job execution failed");
        }
    }

    debug!(worker, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::domain::llm::MockLlmProvider;
    use crate::domain::{
        Block, BlockInput, JobRepository, JobStatus, ModelParameters, ProcessingRequest,
        PromptCompiler, RequestId, RequestRepository, RetryPolicy, Workflow, WorkflowId,
        WorkflowStatus,
    };
    use crate::infrastructure::event::EventBus;
    use crate::infrastructure::job::{InMemoryJobRepository, JobLifecycleConfig, JobStores};
    use crate::infrastructure::llm::{LlmInvoker, LlmInvokerConfig};
    use crate::infrastructure::output::InMemoryOutputRepository;
    use crate::infrastructure::request::InMemoryRequestRepository;
    use crate::infrastructure::workflow::{InMemoryWorkflowRepository, WorkflowExecutorImpl};

    #[test]
    fn test_enqueue_full_and_closed() {
        let (queue, receiver) = JobQueue::bounded(1);
        queue.enqueue(JobId::generate()).unwrap();

        let err = queue.enqueue(JobId::generate()).unwrap_err();
        assert!(err.to_string().contains("full"));

        drop(receiver);
        let err = queue.enqueue(JobId::generate()).unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn test_pool_runs_jobs_for_several_requests() {
        let requests = Arc::new(InMemoryRequestRepository::new());
        for n in 1..=3 {
            requests
                .save(ProcessingRequest::new(
                    RequestId::new(format!("req-{}", n)).unwrap(),
                    format!("text {}", n),
                ))
                .await
                .unwrap();
        }

        let workflow = Workflow::new(WorkflowId::new("wf-echo").unwrap(), "Echo")
            .with_status(WorkflowStatus::Active)
            .with_block(Block::new("echo", 0, "Echo: {text}").with_input(BlockInput::request_text("text")));

        let jobs = Arc::new(InMemoryJobRepository::new());
        let invoker = LlmInvoker::new(
            Arc::new(MockLlmProvider::echo()),
            LlmInvokerConfig {
                call_timeout: Duration::from_secs(1),
                retry: RetryPolicy::new(1),
            },
        );
        let (queue, receiver) = JobQueue::bounded(8);
        let manager = Arc::new(JobLifecycleManager::new(
            JobStores {
                jobs: jobs.clone(),
                requests,
                workflows: Arc::new(InMemoryWorkflowRepository::with_workflows(vec![workflow])),
                outputs: Arc::new(InMemoryOutputRepository::new()),
            },
            Arc::new(WorkflowExecutorImpl::new(
                PromptCompiler::new("test-model", ModelParameters::default()),
                invoker,
            )),
            EventBus::default(),
            queue,
            JobLifecycleConfig::default(),
        ));

        let shutdown = CancellationToken::new();
        let pool = WorkerPool::start(manager.clone(), receiver, 2, shutdown.clone());
        assert_eq!(pool.size(), 2);

        for n in 1..=3 {
            manager
                .trigger(
                    RequestId::new(format!("req-{}", n)).unwrap(),
                    WorkflowId::new("wf-echo").unwrap(),
                    HashMap::new(),
                )
                .await
                .unwrap();
        }

        let mut done = false;
        for _ in 0..100 {
            let completed = jobs.list_by_status(JobStatus::Completed).await.unwrap();
            if completed.len() == 3 {
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(done, "jobs did not complete");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), pool.join())
            .await
            .unwrap();
    }
}
