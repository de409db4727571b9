//! Workflow infrastructure implementations

mod executor_impl;
mod in_memory_repository;
mod loader;

pub use executor_impl::WorkflowExecutorImpl;
pub use in_memory_repository::InMemoryWorkflowRepository;
pub use loader::{load_workflow_dir, load_workflow_file, parse_workflow};
