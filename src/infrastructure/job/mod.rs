//! Job storage, lifecycle management and workers

mod error;
mod in_memory_repository;
mod service;
mod worker;

pub use error::LifecycleError;
pub use in_memory_repository::InMemoryJobRepository;
pub use service::{JobLifecycleConfig, JobLifecycleManager, JobStores};
pub use worker::{JobQueue, WorkerPool};
