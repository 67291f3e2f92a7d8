//! WORK phase: reclaim stale claims, then fan pending tasks out to a
//! bounded worker pool
//!
//! The orchestrator is the single arbiter for stale-claim reclaim, so the
//! sweep runs here at the start of every WORK phase, before any worker
//! claims. Workers race for pending tasks via the store's claim markers;
//! losing a claim is normal and just means another worker got there first.

use eyre::Result;
use statestore::{ReclaimReport, StateStore, StoreError};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::actors::Worker;
use crate::config::Config;
use crate::engine::EngineHandle;
use crate::events::{EventBus, LoopEvent};
use crate::prompts::Prompts;

/// What one WORK phase accomplished
#[derive(Debug, Default)]
pub struct WorkReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub reclaimed: ReclaimReport,
}

impl WorkReport {
    pub fn worked(&self) -> usize {
        self.completed + self.failed
    }
}

pub async fn run_work_phase(
    store: &StateStore,
    config: &Config,
    engine: EngineHandle,
    prompts: Arc<Prompts>,
    bus: Arc<EventBus>,
) -> Result<WorkReport> {
    let mut report = WorkReport::default();

    report.reclaimed = store.reclaim_stale(
        config.orchestrator.lock_stale_threshold(),
        config.orchestrator.max_task_attempts,
    )?;
    if !report.reclaimed.is_empty() {
        bus.emit(LoopEvent::TasksReclaimed {
            reset: report.reclaimed.reset.len(),
            exhausted: report.reclaimed.exhausted.len(),
        });
    }

    let mut pending = store.pending_task_ids()?;
    let cap = config.orchestrator.tasks_per_iteration;
    if cap > 0 && pending.len() > cap {
        pending.truncate(cap);
    }
    if pending.is_empty() {
        debug!("No pending tasks this iteration");
        return Ok(report);
    }

    info!(pending = pending.len(), workers = config.orchestrator.max_workers, "Dispatching tasks");

    let semaphore = Arc::new(Semaphore::new(config.orchestrator.max_workers));
    let mut jobs = JoinSet::new();

    for (slot, task_id) in pending.into_iter().enumerate() {
        let permit = semaphore.clone().acquire_owned().await?;
        let store = store.clone();
        let bus = bus.clone();
        let worker = Worker::new(
            engine.clone(),
            prompts.clone(),
            config,
            format!("worker-{slot}"),
        );

        jobs.spawn(async move {
            let _permit = permit;
            run_one(&store, &worker, &task_id, &bus).await
        });
    }

    let mut fatal = None;
    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok(Ok(Some(completed))) => {
                report.claimed += 1;
                if completed {
                    report.completed += 1;
                } else {
                    report.failed += 1;
                }
            }
            Ok(Ok(None)) => {} // claim lost or task no longer pending
            Ok(Err(e)) => {
                fatal.get_or_insert(e);
            }
            Err(e) => error!(error = %e, "Worker task panicked"),
        }
    }

    // Let the other workers finish their writes, then halt the loop
    if let Some(e) = fatal {
        return Err(e);
    }

    Ok(report)
}

/// Claim and work one task. Returns Ok(None) if the claim was lost,
/// otherwise whether the task completed. Err only on a fatal storage
/// failure; anything else leaves the task recoverable.
async fn run_one(store: &StateStore, worker: &Worker, task_id: &str, bus: &EventBus) -> Result<Option<bool>> {
    let record = match store.claim_task(task_id, &worker.name) {
        Ok(record) => record,
        Err(StoreError::AlreadyClaimed { task, owner }) => {
            debug!(task_id = %task, %owner, "Claim lost to another worker");
            return Ok(None);
        }
        Err(StoreError::InvalidTransition { .. }) => {
            // Record moved out of pending between listing and claiming
            debug!(task_id, "Task no longer pending");
            return Ok(None);
        }
        Err(e) if e.is_fatal() => {
            return Err(eyre::Report::new(e).wrap_err(format!("Storage failure claiming {task_id}")));
        }
        Err(e) => {
            warn!(task_id, error = %e, "Failed to claim task");
            return Ok(None);
        }
    };

    bus.emit(LoopEvent::TaskClaimed {
        task_id: record.id.clone(),
        worker: worker.name.clone(),
    });

    match worker.run(store, &record).await {
        Ok(finished) if finished.status == statestore::TaskStatus::Completed => {
            bus.emit(LoopEvent::TaskCompleted {
                task_id: finished.id,
                worker: worker.name.clone(),
            });
            Ok(Some(true))
        }
        Ok(finished) => {
            bus.emit(LoopEvent::TaskFailed {
                task_id: finished.id,
                worker: worker.name.clone(),
                reason: finished.failure_reason.unwrap_or_default(),
            });
            Ok(Some(false))
        }
        Err(e) => record_worker_error(store, &worker.name, task_id, e, bus),
    }
}

/// A worker errored without finalizing its record. Finalize the task as
/// failed so it stays visible; if even that fails, keep the claim marker
/// so the stale sweep can recover the task later. Fatal storage failures
/// propagate and halt the run.
fn record_worker_error(
    store: &StateStore,
    worker_name: &str,
    task_id: &str,
    error: eyre::Report,
    bus: &EventBus,
) -> Result<Option<bool>> {
    if super::is_fatal(&error) {
        return Err(error.wrap_err(format!("Storage failure while working {task_id}")));
    }

    let reason = format!("worker error: {error:#}");
    match store.finalize_task(task_id, |r| r.fail(&reason)) {
        Ok(_) => {
            warn!(task_id, worker = worker_name, %reason, "Worker errored; task finalized as failed");
            bus.emit(LoopEvent::TaskFailed {
                task_id: task_id.to_string(),
                worker: worker_name.to_string(),
                reason,
            });
            Ok(Some(false))
        }
        Err(e) if e.is_fatal() => {
            Err(eyre::Report::new(e).wrap_err(format!("Storage failure finalizing {task_id}")))
        }
        Err(e) => {
            // The marker stays put so the stale sweep finds the task
            warn!(task_id, error = %e, "Could not finalize errored task; leaving claim for the stale sweep");
            Ok(None)
        }
    }
}
