//! Domain layer - Core business logic and entities

pub mod error;
pub mod event;
pub mod job;
pub mod llm;
pub mod output;
pub mod request;
pub mod retry;
pub mod webhook;
pub mod workflow;

pub use error::DomainError;
pub use event::{EngineEvent, EventType};
pub use job::{Job, JobError, JobId, JobRepository, JobStatus, JobTransition};
pub use llm::{
    FinishReason, LlmProvider, LlmRequest, LlmRequestBuilder, LlmResponse, LlmResponseFormat,
    Message, MessageRole, Usage,
};
pub use output::{OutputRecord, OutputRepository};
pub use request::{CustomInstruction, ProcessingRequest, RequestId, RequestRepository};
pub use retry::RetryPolicy;
pub use workflow::{
    Block, BlockInput, BlockKind, BlockResult, CompiledPrompt, ExecutionContext,
    ExecutionObserver, ExecutionOutcome, ExecutionPlan, ExecutionRequest, FailureKind,
    InputSource, ModelParameters, NoopObserver, PromptCompiler, ResolutionWarning, TokenUsage, Workflow,
    WorkflowError, WorkflowExecutor, WorkflowId, WorkflowRepository, WorkflowStatus,
};
