//! Event fan-out: the broadcast bus and its webhook subscriber

mod bus;
mod dispatcher;

pub use bus::{EventBus, DEFAULT_EVENT_CAPACITY};
pub use dispatcher::spawn_webhook_dispatcher;
