//! Processing request domain module

mod entity;
pub mod repository;

pub use entity::{CustomInstruction, ProcessingRequest, RequestId, MAX_ID_LENGTH};
pub use repository::RequestRepository;
