//! Engine event domain module

mod entity;

pub use entity::{EngineEvent, EventType};
