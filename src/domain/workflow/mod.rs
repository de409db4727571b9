//! Workflow domain module
//!
//! A workflow is an ordered list of blocks. Each block compiles a prompt from
//! its template and declared inputs, then calls the LLM service. Inputs bind
//! either to the request text or to the output of an earlier block:
//!
//! - `request_text` - the full request body
//! - `block_output` - another block's output, optionally narrowed with a
//!   dot-separated field path (`result.items.0.name`)

mod context;
mod entity;
mod error;
mod executor;
mod plan;
mod prompt;
pub mod repository;

pub use context::{
    get_nested_field, value_to_string, ExecutionContext, ResolutionWarning, ResolvedVariables,
};
pub use entity::{
    is_valid_name, validate_workflow_id, Block, BlockInput, BlockKind, InputSource, Workflow,
    WorkflowId, WorkflowStatus, MAX_ID_LENGTH,
};
pub use error::{FailureKind, WorkflowError};
pub use executor::{
    BlockResult, ExecutionObserver, ExecutionOutcome, ExecutionRequest, NoopObserver, TokenUsage,
    WorkflowExecutor,
};
pub use plan::{DependencyEdge, ExecutionPlan};
pub use prompt::{render_template, CompiledPrompt, ModelParameters, PromptCompiler, SCHEMA_FRAMING};
pub use repository::WorkflowRepository;
