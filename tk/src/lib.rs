//! troika - a three-actor orchestration loop over a file-backed state store
//!
//! A run cycles through four phases until the judge calls a stop or the
//! iteration cap is hit:
//!
//! ```text
//! PLAN   planner reads the plan + open tasks, emits new tasks
//! WORK   a worker pool claims pending tasks and executes them
//! JUDGE  the judge reads recent results and issues a verdict
//! DECIDE apply the verdict, reclaim stale locks, pace the next pass
//! ```
//!
//! All durable state lives under the `.troika/` directory managed by the
//! `statestore` crate, so a run can be inspected (or resumed) at any point
//! with the `ss` binary.

pub mod actors;
pub mod cli;
pub mod config;
pub mod engine;
pub mod events;
pub mod orchestrator;
pub mod prompts;
pub mod retry;

pub use config::Config;
pub use engine::{EngineHandle, create_engine};
pub use events::{EventBus, LoopEvent, create_event_bus, spawn_log_subscriber};
pub use orchestrator::{Orchestrator, RunSummary, StopReason};
pub use prompts::{Actor, Prompts};
