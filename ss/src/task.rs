//! Task domain types and lifecycle state machine
//!
//! A task lives in two places: a summary in the index (`tasks.json`, append
//! only, no execution status) and a full record (`tasks/<id>.json`) that
//! carries the lifecycle state. Transition rules are enforced here, inside
//! the mutation closures passed to `StateStore::update_task_record`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created by the planner, waiting to be claimed
    #[default]
    Pending,
    /// Claimed by a worker (lock marker held)
    Assigned,
    /// Worker is executing
    InProgress,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Assigned => write!(f, "assigned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Terminal states are absorbing: no further transition is valid
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Task priority, used by workers to order claim attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Input for creating a task: everything except the fields the store assigns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,
}

impl NewTask {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority: Priority::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Summary entry in the task index
///
/// Deliberately carries no execution status: the index is an append log of
/// task identities, so the planner never contends with running workers on
/// the index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// The task index document (`tasks.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIndex {
    /// Insertion-ordered task summaries
    #[serde(default)]
    pub tasks: Vec<TaskSummary>,

    /// Counter for monotonic id assignment
    #[serde(default = "default_next_id")]
    pub next_task_id: u32,

    /// Bumped on every accepted write
    #[serde(default)]
    pub version: u64,
}

fn default_next_id() -> u32 {
    1
}

impl Default for TaskIndex {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            next_task_id: default_next_id(),
            version: 0,
        }
    }
}

impl TaskIndex {
    /// Format a task id from the counter, zero-padded (`task_001`)
    pub fn format_id(n: u32) -> String {
        format!("task_{n:03}")
    }
}

/// Full per-task lifecycle record (`tasks/<id>.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: TaskStatus,

    /// Worker currently (or last) holding the task
    #[serde(default)]
    pub assigned_to: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub failure_reason: Option<String>,

    /// Number of abandoned claims recovered so far
    #[serde(default)]
    pub attempt_count: u32,

    /// Relative path of the worker's report, if any
    #[serde(default)]
    pub result_file: Option<String>,

    /// Monotonic version stamp for optimistic concurrency
    #[serde(default)]
    pub version: u64,
}

impl TaskRecord {
    /// Create a fresh pending record
    pub fn new(id: impl Into<String>, task: &NewTask) -> Self {
        Self {
            id: id.into(),
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            status: TaskStatus::Pending,
            assigned_to: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failure_reason: None,
            attempt_count: 0,
            result_file: None,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn invalid(&self, to: TaskStatus) -> StoreError {
        StoreError::InvalidTransition {
            task: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// `pending -> assigned`: claim by a worker. The caller must already
    /// hold the lock marker for this task.
    pub fn assign(&mut self, worker: impl Into<String>) -> Result<(), StoreError> {
        if self.status != TaskStatus::Pending {
            return Err(self.invalid(TaskStatus::Assigned));
        }
        self.status = TaskStatus::Assigned;
        self.assigned_to = Some(worker.into());
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `assigned -> in_progress`: execution begins
    pub fn start(&mut self) -> Result<(), StoreError> {
        if self.status != TaskStatus::Assigned {
            return Err(self.invalid(TaskStatus::InProgress));
        }
        self.status = TaskStatus::InProgress;
        Ok(())
    }

    /// `in_progress -> completed`: finalize successfully
    pub fn complete(&mut self, result_file: Option<String>) -> Result<(), StoreError> {
        if self.status != TaskStatus::InProgress {
            return Err(self.invalid(TaskStatus::Completed));
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result_file = result_file;
        Ok(())
    }

    /// `{assigned, in_progress} -> failed`: finalize with an error.
    /// Allowed from `assigned` too, so a claim whose execution never got
    /// off the ground can still be finalized.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), StoreError> {
        if !matches!(self.status, TaskStatus::Assigned | TaskStatus::InProgress) {
            return Err(self.invalid(TaskStatus::Failed));
        }
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Recovery edge: `{assigned, in_progress} -> pending` when the owning
    /// worker's lock marker has gone stale. Increments `attempt_count`.
    pub fn reset_to_pending(&mut self) -> Result<(), StoreError> {
        if !matches!(self.status, TaskStatus::Assigned | TaskStatus::InProgress) {
            return Err(self.invalid(TaskStatus::Pending));
        }
        self.status = TaskStatus::Pending;
        self.assigned_to = None;
        self.started_at = None;
        self.attempt_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_task() -> TaskRecord {
        TaskRecord::new("task_001", &NewTask::new("Test task", "Do the thing"))
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut task = pending_task();
        assert_eq!(task.status, TaskStatus::Pending);

        task.assign("worker-1").unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_to.as_deref(), Some("worker-1"));
        assert!(task.started_at.is_some());

        task.start().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);

        task.complete(Some("results/task_001.md".to_string())).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert_eq!(task.result_file.as_deref(), Some("results/task_001.md"));
    }

    #[test]
    fn test_fail_from_in_progress() {
        let mut task = pending_task();
        task.assign("worker-1").unwrap();
        task.start().unwrap();
        task.fail("build error").unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.failure_reason.as_deref(), Some("build error"));
    }

    #[test]
    fn test_fail_from_assigned() {
        let mut task = pending_task();
        task.assign("worker-1").unwrap();
        task.fail("engine unavailable").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let mut task = pending_task();
        task.assign("worker-1").unwrap();
        task.start().unwrap();
        task.complete(None).unwrap();

        assert!(task.assign("worker-2").is_err());
        assert!(task.start().is_err());
        assert!(task.fail("nope").is_err());
        assert!(task.reset_to_pending().is_err());
        assert_eq!(task.status, TaskStatus::Completed);

        let mut failed = pending_task();
        failed.assign("worker-1").unwrap();
        failed.fail("broken").unwrap();
        assert!(failed.assign("worker-2").is_err());
        assert!(failed.complete(None).is_err());
    }

    #[test]
    fn test_cannot_skip_states() {
        let mut task = pending_task();
        // pending -> in_progress is not a legal edge
        assert!(task.start().is_err());
        // pending -> completed either
        assert!(task.complete(None).is_err());
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_double_assign_rejected() {
        let mut task = pending_task();
        task.assign("worker-1").unwrap();
        let err = task.assign("worker-2").unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(task.assigned_to.as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_reset_to_pending_increments_attempts() {
        let mut task = pending_task();
        task.assign("worker-1").unwrap();
        task.reset_to_pending().unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt_count, 1);
        assert!(task.assigned_to.is_none());
        assert!(task.started_at.is_none());

        // Reclaimable again, and a second recovery bumps the count again
        task.assign("worker-2").unwrap();
        task.start().unwrap();
        task.reset_to_pending().unwrap();
        assert_eq!(task.attempt_count, 2);
    }

    #[test]
    fn test_reset_from_pending_rejected() {
        let mut task = pending_task();
        assert!(task.reset_to_pending().is_err());
        assert_eq!(task.attempt_count, 0);
    }

    #[test]
    fn test_index_id_format() {
        assert_eq!(TaskIndex::format_id(1), "task_001");
        assert_eq!(TaskIndex::format_id(42), "task_042");
        assert_eq!(TaskIndex::format_id(1234), "task_1234");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let mut task = pending_task();
        task.assign("worker-1").unwrap();

        let json = serde_json::to_string_pretty(&task).unwrap();
        assert!(json.contains("\"status\": \"assigned\""));

        let back: TaskRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, TaskStatus::Assigned);
        assert_eq!(back.id, task.id);
    }
}
