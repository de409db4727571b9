//! Output record domain module

mod entity;
pub mod repository;

pub use entity::OutputRecord;
pub use repository::OutputRepository;
