//! The orchestration loop
//!
//! Each iteration walks four phases: PLAN (planner updates the plan and
//! board), WORK (pending tasks fan out to a bounded worker pool), JUDGE
//! (verdict on continuing), DECIDE (persist the verdict and either loop
//! or stop). A failed PLAN or JUDGE phase ends the iteration without
//! stopping the run; storage failures abort the run.

mod work;

pub use work::{run_work_phase, WorkReport};

use chrono::Utc;
use eyre::{Context, Result};
use statestore::{StateStore, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::actors::{Judge, Planner, Verdict};
use crate::config::Config;
use crate::engine::EngineHandle;
use crate::events::{EventBus, LoopEvent, Phase, PhaseOutcome};
use crate::prompts::Prompts;

/// Why the run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The judge ruled the loop done
    Verdict(String),
    /// The iteration budget ran out
    MaxIterations,
    /// A shutdown signal arrived
    Shutdown,
}

impl StopReason {
    pub fn describe(&self) -> String {
        match self {
            StopReason::Verdict(reason) => reason.clone(),
            StopReason::MaxIterations => "maximum iterations reached".to_string(),
            StopReason::Shutdown => "shutdown requested".to_string(),
        }
    }
}

/// Outcome of a full run
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub iterations: u32,
    pub stop_reason: StopReason,
}

pub struct Orchestrator {
    config: Config,
    store: StateStore,
    engine: EngineHandle,
    prompts: Arc<Prompts>,
    bus: Arc<EventBus>,
    planner: Planner,
    judge: Judge,
    run_id: String,
}

impl Orchestrator {
    pub fn new(config: Config, store: StateStore, engine: EngineHandle, bus: Arc<EventBus>) -> Result<Self> {
        let prompts = Arc::new(Prompts::load(config.prompts.dir.as_deref())?);
        let planner = Planner::new(engine.clone(), prompts.clone(), &config);
        let judge = Judge::new(engine.clone(), prompts.clone(), &config);
        Ok(Self {
            config,
            store,
            engine,
            prompts,
            bus,
            planner,
            judge,
            run_id: uuid::Uuid::now_v7().to_string(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Drive the loop until the judge stops it, the iteration budget runs
    /// out, or a shutdown signal arrives.
    pub async fn run(&self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<RunSummary> {
        info!(run_id = %self.run_id, project = %self.config.project.name, goal = %self.config.project.goal, "Run starting");
        self.bus.emit(LoopEvent::RunStarted {
            run_id: self.run_id.clone(),
            goal: self.config.project.goal.clone(),
        });

        let mut iterations = 0u32;
        let stop_reason = loop {
            let status = self.store.read_status()?;
            let iteration = status.iteration + 1;

            if iteration > self.config.orchestrator.max_iterations {
                break StopReason::MaxIterations;
            }

            // Shutdown between iterations, not mid-phase
            if shutdown_rx.try_recv().is_ok() {
                break StopReason::Shutdown;
            }

            iterations = iteration;
            self.bus.emit(LoopEvent::IterationStarted { iteration });
            self.store.update_status(|s| s.iteration = iteration)?;

            match self.run_iteration(iteration).await? {
                Some(verdict) if !verdict.should_continue => {
                    break StopReason::Verdict(verdict.reason);
                }
                _ => {}
            }

            // Pace the loop, but wake immediately on shutdown
            tokio::select! {
                _ = tokio::time::sleep(self.config.orchestrator.wait_time()) => {}
                _ = shutdown_rx.recv() => break StopReason::Shutdown,
            }
        };

        let reason = stop_reason.describe();
        self.store.update_status(|s| {
            s.should_continue = false;
            s.reason = reason.clone();
        })?;

        self.bus.emit(LoopEvent::RunCompleted {
            run_id: self.run_id.clone(),
            iterations,
            reason: reason.clone(),
        });
        info!(run_id = %self.run_id, iterations, %reason, "Run complete");

        Ok(RunSummary {
            run_id: self.run_id.clone(),
            iterations,
            stop_reason,
        })
    }

    /// One PLAN -> WORK -> JUDGE -> DECIDE pass. Returns the verdict, or
    /// None when the iteration ended early (planner or judge failure).
    async fn run_iteration(&self, iteration: u32) -> Result<Option<Verdict>> {
        // PLAN
        self.bus.emit(LoopEvent::PhaseStarted { iteration, phase: Phase::Plan });
        match self.planner.run(&self.store).await {
            Ok(outcome) => {
                self.store.update_status(|s| s.last_planner_run = Some(Utc::now()))?;
                self.bus.emit(LoopEvent::TasksPlanned {
                    iteration,
                    new_tasks: outcome.new_task_ids.len(),
                });
                self.bus.emit(LoopEvent::PhaseCompleted {
                    iteration,
                    phase: Phase::Plan,
                    outcome: PhaseOutcome::Succeeded,
                });
            }
            Err(e) => {
                if is_fatal(&e) {
                    return Err(e.wrap_err("Planner hit a storage failure"));
                }
                error!(iteration, error = %e, "Planner failed; ending iteration");
                self.emit_phase_failure(iteration, Phase::Plan, &e);
                return Ok(None);
            }
        }

        // WORK
        self.bus.emit(LoopEvent::PhaseStarted { iteration, phase: Phase::Work });
        let work = run_work_phase(
            &self.store,
            &self.config,
            self.engine.clone(),
            self.prompts.clone(),
            self.bus.clone(),
        )
        .await
        .context("Work phase failed")?;
        self.store.update_status(|s| s.last_worker_run = Some(Utc::now()))?;
        self.store.refresh_status_counts()?;
        self.bus.emit(LoopEvent::PhaseCompleted {
            iteration,
            phase: Phase::Work,
            outcome: if work.claimed > 0 { PhaseOutcome::Succeeded } else { PhaseOutcome::Skipped },
        });

        // JUDGE
        self.bus.emit(LoopEvent::PhaseStarted { iteration, phase: Phase::Judge });
        let verdict = match self.judge.run(&self.store).await {
            Ok(verdict) => {
                self.store.update_status(|s| s.last_judge_run = Some(Utc::now()))?;
                self.bus.emit(LoopEvent::PhaseCompleted {
                    iteration,
                    phase: Phase::Judge,
                    outcome: PhaseOutcome::Succeeded,
                });
                verdict
            }
            Err(e) => {
                if is_fatal(&e) {
                    return Err(e.wrap_err("Judge hit a storage failure"));
                }
                // No verdict means no stop: the loop keeps running
                warn!(iteration, error = %e, "Judge failed; continuing without a verdict");
                self.emit_phase_failure(iteration, Phase::Judge, &e);
                return Ok(None);
            }
        };

        // DECIDE
        self.bus.emit(LoopEvent::PhaseStarted { iteration, phase: Phase::Decide });
        self.store.update_status(|s| {
            s.should_continue = verdict.should_continue;
            s.reason = verdict.reason.clone();
        })?;
        self.bus.emit(LoopEvent::Verdict {
            iteration,
            should_continue: verdict.should_continue,
            progress_score: verdict.progress_score,
            drift_detected: verdict.drift_detected,
        });
        self.bus.emit(LoopEvent::PhaseCompleted {
            iteration,
            phase: Phase::Decide,
            outcome: PhaseOutcome::Succeeded,
        });

        Ok(Some(verdict))
    }

    fn emit_phase_failure(&self, iteration: u32, phase: Phase, error: &eyre::Report) {
        self.bus.emit(LoopEvent::Error {
            context: phase.to_string(),
            message: error.to_string(),
        });
        self.bus.emit(LoopEvent::PhaseCompleted {
            iteration,
            phase,
            outcome: PhaseOutcome::Failed,
        });
    }
}

/// Storage failures are not survivable; everything else degrades
fn is_fatal(error: &eyre::Report) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<StoreError>().is_some_and(|e| e.is_fatal()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::events::create_event_bus;
    use statestore::TaskStatus;
    use tempfile::tempdir;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.project.goal = "finish the demo".to_string();
        config.orchestrator.wait_time_secs = 0;
        config.orchestrator.max_iterations = 10;
        config.orchestrator.max_workers = 2;
        config
    }

    fn planner_reply(tasks: &[&str]) -> String {
        let tasks: Vec<String> = tasks
            .iter()
            .map(|t| format!(r#"{{"title": "{t}", "description": "do it"}}"#))
            .collect();
        format!(
            r##"```json
{{"plan_update": "# Plan", "new_tasks": [{}]}}
```"##,
            tasks.join(",")
        )
    }

    fn judge_reply(should_continue: bool, score: f64) -> String {
        format!(
            r#"{{"should_continue": {should_continue}, "reason": "verdict", "progress_score": {score}}}"#
        )
    }

    #[tokio::test]
    async fn test_single_iteration_to_done() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();

        let engine = Arc::new(MockEngine::new());
        engine.push_response(planner_reply(&["build the demo"]));
        engine.push_response(r#"{"status": "completed", "report": "built"}"#);
        engine.push_response(judge_reply(false, 1.0));

        let orchestrator =
            Orchestrator::new(fast_config(), store.clone(), engine, create_event_bus()).unwrap();
        let (_tx, rx) = mpsc::channel(1);
        let summary = orchestrator.run(rx).await.unwrap();

        assert_eq!(summary.iterations, 1);
        assert!(matches!(summary.stop_reason, StopReason::Verdict(_)));

        let status = store.read_status().unwrap();
        assert!(!status.should_continue);
        assert_eq!(status.completed_tasks, 1);
        assert_eq!(
            store.read_task_record("task_001").unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_runs_until_judge_stops() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();

        let engine = Arc::new(MockEngine::new());
        // Iteration 1: one task, judge continues
        engine.push_response(planner_reply(&["first task"]));
        engine.push_response(r#"{"status": "completed", "report": "ok"}"#);
        engine.push_response(judge_reply(true, 0.5));
        // Iteration 2: no new tasks, judge stops
        engine.push_response(planner_reply(&[]));
        engine.push_response(judge_reply(false, 1.0));

        let orchestrator =
            Orchestrator::new(fast_config(), store.clone(), engine, create_event_bus()).unwrap();
        let (_tx, rx) = mpsc::channel(1);
        let summary = orchestrator.run(rx).await.unwrap();

        assert_eq!(summary.iterations, 2);
        assert_eq!(store.read_status().unwrap().iteration, 2);
    }

    #[tokio::test]
    async fn test_max_iterations_stops_run() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();

        let mut config = fast_config();
        config.orchestrator.max_iterations = 2;

        let engine = Arc::new(MockEngine::new());
        for _ in 0..2 {
            engine.push_response(planner_reply(&[]));
            engine.push_response(judge_reply(true, 0.1));
        }

        let orchestrator =
            Orchestrator::new(config, store.clone(), engine, create_event_bus()).unwrap();
        let (_tx, rx) = mpsc::channel(1);
        let summary = orchestrator.run(rx).await.unwrap();

        assert_eq!(summary.stop_reason, StopReason::MaxIterations);
        assert_eq!(summary.iterations, 2);
        let status = store.read_status().unwrap();
        assert!(!status.should_continue);
        assert!(status.reason.contains("maximum iterations"));
    }

    #[tokio::test]
    async fn test_planner_failure_does_not_stop_run() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();

        let engine = Arc::new(MockEngine::new());
        // Iteration 1: planner returns malformed JSON (fatal parse error)
        engine.push_response("```json\n{\"new_tasks\": \"not an array\"}\n```");
        // Iteration 2: healthy pass, judge stops
        engine.push_response(planner_reply(&[]));
        engine.push_response(judge_reply(false, 1.0));

        let orchestrator =
            Orchestrator::new(fast_config(), store.clone(), engine, create_event_bus()).unwrap();
        let (_tx, rx) = mpsc::channel(1);
        let summary = orchestrator.run(rx).await.unwrap();

        assert_eq!(summary.iterations, 2);
        assert!(matches!(summary.stop_reason, StopReason::Verdict(_)));
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_run() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();

        let mut config = fast_config();
        config.orchestrator.wait_time_secs = 30;

        let engine = Arc::new(MockEngine::new());
        engine.push_response(planner_reply(&[]));
        engine.push_response(judge_reply(true, 0.1));

        let orchestrator =
            Orchestrator::new(config, store.clone(), engine, create_event_bus()).unwrap();
        let (tx, rx) = mpsc::channel(1);

        let run = tokio::spawn(async move { orchestrator.run(rx).await });
        // Let iteration 1 finish, then signal during the wait
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        tx.send(()).await.unwrap();

        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.stop_reason, StopReason::Shutdown);
        assert!(store.read_status().unwrap().reason.contains("shutdown"));
    }
}
