//! Infrastructure layer - Adapters for storage, the LLM service, events and
//! webhooks

pub mod event;
pub mod job;
pub mod llm;
pub mod logging;
pub mod observability;
pub mod output;
pub mod request;
pub mod webhook;
pub mod workflow;
