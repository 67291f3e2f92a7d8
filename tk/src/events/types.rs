//! Event types emitted by the orchestration loop

use serde::{Deserialize, Serialize};

/// The four phases of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Plan,
    Work,
    Judge,
    Decide,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Work => "work",
            Phase::Judge => "judge",
            Phase::Decide => "decide",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseOutcome {
    Succeeded,
    /// The phase's actor failed; the iteration moves on without its output
    Failed,
    /// Nothing for the phase to do
    Skipped,
}

/// Events emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    RunStarted {
        run_id: String,
        goal: String,
    },
    IterationStarted {
        iteration: u32,
    },
    PhaseStarted {
        iteration: u32,
        phase: Phase,
    },
    PhaseCompleted {
        iteration: u32,
        phase: Phase,
        outcome: PhaseOutcome,
    },
    TasksPlanned {
        iteration: u32,
        new_tasks: usize,
    },
    TaskClaimed {
        task_id: String,
        worker: String,
    },
    TaskCompleted {
        task_id: String,
        worker: String,
    },
    TaskFailed {
        task_id: String,
        worker: String,
        reason: String,
    },
    TasksReclaimed {
        reset: usize,
        exhausted: usize,
    },
    Verdict {
        iteration: u32,
        should_continue: bool,
        progress_score: f64,
        drift_detected: bool,
    },
    RunCompleted {
        run_id: String,
        iterations: u32,
        reason: String,
    },
    Error {
        context: String,
        message: String,
    },
}

impl LoopEvent {
    /// Event type name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            LoopEvent::RunStarted { .. } => "RunStarted",
            LoopEvent::IterationStarted { .. } => "IterationStarted",
            LoopEvent::PhaseStarted { .. } => "PhaseStarted",
            LoopEvent::PhaseCompleted { .. } => "PhaseCompleted",
            LoopEvent::TasksPlanned { .. } => "TasksPlanned",
            LoopEvent::TaskClaimed { .. } => "TaskClaimed",
            LoopEvent::TaskCompleted { .. } => "TaskCompleted",
            LoopEvent::TaskFailed { .. } => "TaskFailed",
            LoopEvent::TasksReclaimed { .. } => "TasksReclaimed",
            LoopEvent::Verdict { .. } => "Verdict",
            LoopEvent::RunCompleted { .. } => "RunCompleted",
            LoopEvent::Error { .. } => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Plan.to_string(), "plan");
        assert_eq!(Phase::Decide.to_string(), "decide");
    }

    #[test]
    fn test_event_serializes_tagged() {
        let event = LoopEvent::TaskClaimed {
            task_id: "task_001".to_string(),
            worker: "worker-1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_claimed");
        assert_eq!(json["task_id"], "task_001");
    }
}
