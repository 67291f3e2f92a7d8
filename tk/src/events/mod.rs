//! Loop activity events

mod bus;
mod types;

pub use bus::{create_event_bus, spawn_log_subscriber, EventBus, DEFAULT_CHANNEL_CAPACITY};
pub use types::{LoopEvent, Phase, PhaseOutcome};
