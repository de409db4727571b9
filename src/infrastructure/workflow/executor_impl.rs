//! Block execution engine

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{
    BlockResult, ExecutionContext, ExecutionObserver, ExecutionOutcome, ExecutionPlan,
    ExecutionRequest, PromptCompiler, TokenUsage, Workflow, WorkflowError, WorkflowExecutor,
};
use crate::infrastructure::llm::LlmInvoker;

/// Runs workflow blocks strictly one after another
#[derive(Debug)]
pub struct WorkflowExecutorImpl {
    compiler: PromptCompiler,
    invoker: LlmInvoker,

    /// Plans keyed by workflow id and version
    plans: Arc<RwLock<HashMap<(String, u32), Arc<ExecutionPlan>>>>,
}

impl WorkflowExecutorImpl {
    pub fn new(compiler: PromptCompiler, invoker: LlmInvoker) -> Self {
        Self {
            compiler,
            invoker,
            plans: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build or reuse the plan for this workflow version
    async fn plan_for(&self, workflow: &Workflow) -> Result<Arc<ExecutionPlan>, WorkflowError> {
        let key = (workflow.id().as_str().to_string(), workflow.version());

        if let Some(plan) = self.plans.read().await.get(&key) {
            return Ok(plan.clone());
        }

        let plan = Arc::new(ExecutionPlan::build(workflow)?);
        self.plans.write().await.insert(key, plan.clone());
        Ok(plan)
    }
}

#[async_trait]
impl WorkflowExecutor for WorkflowExecutorImpl {
    async fn execute(
        &self,
        workflow: &Workflow,
        request: &ExecutionRequest,
        observer: &dyn ExecutionObserver,
    ) -> Result<ExecutionOutcome, WorkflowError> {
        let started = Instant::now();
        let plan = self.plan_for(workflow).await?;
        let total = plan.len();

        info!(
            workflow_id = %workflow.id(),
            version = workflow.version(),
            blocks = total,
            "Executing workflow"
        );

        let mut context = ExecutionContext::new(request.request_text.clone());
        let mut usage = TokenUsage::default();
        let mut results = Vec::with_capacity(total);

        for (index, block) in plan.blocks().iter().enumerate() {
            if observer.is_cancelled().await {
                info!(
                    workflow_id = %workflow.id(),
                    block = %block.name(),
                    "Execution cancelled before block"
                );
                return Err(WorkflowError::Cancelled);
            }

            observer.block_started(block.name(), index, total).await;

            let warnings_before = context.warnings().len();
            let variables = context.resolve_inputs(block)?;
            let compiled = self.compiler.compile(
                workflow,
                block,
                &variables,
                request.instruction_for(block.name()),
            );

            debug!(block = %block.name(), model = %compiled.model, "Invoking block");
            let invocation = self.invoker.invoke(&compiled).await?;

            usage.add(&invocation.usage);
            context.set_output(block.name(), invocation.output.clone());

            let result = BlockResult {
                block: block.name().to_string(),
                index,
                model: invocation.model,
                output: invocation.output,
                usage: invocation.usage.into(),
                duration_ms: invocation.duration.as_millis() as u64,
                attempts: invocation.attempts,
            };

            observer
                .block_completed(&result, total, &context.warnings()[warnings_before..])
                .await;
            results.push(result);
        }

        let (outputs, warnings) = context.into_parts();
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            workflow_id = %workflow.id(),
            duration_ms,
            total_tokens = usage.total_tokens,
            "Workflow execution completed"
        );

        Ok(ExecutionOutcome {
            results: outputs,
            blocks: results,
            usage,
            duration_ms,
            warnings,
        })
    }
}
