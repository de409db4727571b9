//! Job domain module
//!
//! A job is one execution attempt of (request, workflow). Its status moves
//! `pending -> running -> completed | failed`; a pending job may also fail
//! directly when cancelled before a worker picks it up.

mod entity;
mod error;
pub mod repository;

pub use entity::{Job, JobId, JobStatus, JobTransition};
pub use error::JobError;
pub use repository::JobRepository;
