//! Workflow executor trait and result types

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::ResolutionWarning;
use super::entity::Workflow;
use super::error::WorkflowError;
use crate::domain::llm::Usage;

/// Token usage summed over all blocks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, usage: &Usage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
    }
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        let mut total = Self::default();
        total.add(&usage);
        total
    }
}

/// What to run a workflow against
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub request_text: String,

    /// Extra instruction per block name, appended for this execution only
    pub custom_instructions: HashMap<String, String>,
}

impl ExecutionRequest {
    pub fn new(request_text: impl Into<String>) -> Self {
        Self {
            request_text: request_text.into(),
            custom_instructions: HashMap::new(),
        }
    }

    pub fn with_custom_instructions(mut self, instructions: HashMap<String, String>) -> Self {
        self.custom_instructions = instructions;
        self
    }

    pub fn instruction_for(&self, block: &str) -> Option<&str> {
        self.custom_instructions.get(block).map(String::as_str)
    }
}

/// Result of one successfully executed block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResult {
    pub block: String,

    /// Position in execution order (0-based)
    pub index: usize,

    pub model: String,

    pub output: Value,

    pub usage: TokenUsage,

    pub duration_ms: u64,

    /// LLM calls made, including the successful one
    pub attempts: u32,
}

/// Result of executing every block of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Block name -> output, in execution order
    pub results: IndexMap<String, Value>,

    pub blocks: Vec<BlockResult>,

    pub usage: TokenUsage,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ResolutionWarning>,
}

/// Hooks the executor calls while it runs
#[async_trait]
pub trait ExecutionObserver: Send + Sync {
    /// Polled before each block; `true` stops execution with `Cancelled`
    async fn is_cancelled(&self) -> bool {
        false
    }

    async fn block_started(&self, _block: &str, _index: usize, _total: usize) {}

    async fn block_completed(
        &self,
        _result: &BlockResult,
        _total: usize,
        _warnings: &[ResolutionWarning],
    ) {
    }
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

/// Trait for workflow execution
#[async_trait]
pub trait WorkflowExecutor: Send + Sync + std::fmt::Debug {
    /// Run every block of `workflow` in order.
    ///
    /// On error nothing is returned for the blocks that did finish; partial
    /// context is dropped.
    async fn execute(
        &self,
        workflow: &Workflow,
        request: &ExecutionRequest,
        observer: &dyn ExecutionObserver,
    ) -> Result<ExecutionOutcome, WorkflowError>;
}
