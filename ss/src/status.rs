//! Run status snapshot
//!
//! Owned by the orchestration loop, written once per phase; actors only read
//! it. On restart the loop trusts task records, not this snapshot, so it is
//! purely an aggregate view for operators and the judge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate snapshot of a run (`status.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    /// Current loop iteration (1-indexed; 0 before the first PLAN)
    #[serde(default)]
    pub iteration: u32,

    #[serde(default)]
    pub last_planner_run: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_worker_run: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_judge_run: Option<DateTime<Utc>>,

    /// Continuation verdict from the last DECIDE
    #[serde(default = "default_continue")]
    pub should_continue: bool,

    /// Human-readable rationale for the verdict (or the last failure)
    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub total_tasks: u32,

    #[serde(default)]
    pub completed_tasks: u32,

    #[serde(default)]
    pub failed_tasks: u32,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    /// Bumped on every accepted write
    #[serde(default)]
    pub version: u64,
}

fn default_continue() -> bool {
    true
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            iteration: 0,
            last_planner_run: None,
            last_worker_run: None,
            last_judge_run: None,
            should_continue: default_continue(),
            reason: String::new(),
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            last_updated: None,
            version: 0,
        }
    }
}

impl RunStatus {
    /// Tasks neither completed nor failed
    pub fn open_tasks(&self) -> u32 {
        self.total_tasks
            .saturating_sub(self.completed_tasks)
            .saturating_sub(self.failed_tasks)
    }
}
