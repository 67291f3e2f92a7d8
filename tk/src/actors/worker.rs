//! Worker actor
//!
//! Executes one claimed task: marks it in progress, asks the engine to do
//! the work, stores the report, and finalizes the record. The claim is
//! released as part of finalization.

use eyre::{Context, Result};
use serde::Deserialize;
use statestore::{StateStore, TaskRecord, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::extract_json;
use crate::config::Config;
use crate::engine::{EngineHandle, GenerationRequest};
use crate::prompts::{Actor, Prompts};
use crate::retry::with_retries;

const SYSTEM: &str = "You are a worker in a planner/workers/judge loop. \
You complete one assigned task end to end and report what you did.";

#[derive(Debug, Deserialize)]
struct WorkerReply {
    status: String,
    #[serde(default)]
    report: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

pub struct Worker {
    engine: EngineHandle,
    prompts: Arc<Prompts>,
    goal: String,
    max_tokens: u32,
    max_retries: u32,
    /// Identity used for claims and lock markers
    pub name: String,
}

impl Worker {
    pub fn new(engine: EngineHandle, prompts: Arc<Prompts>, config: &Config, name: impl Into<String>) -> Self {
        Self {
            engine,
            prompts,
            goal: config.project.goal.clone(),
            max_tokens: config.engine.max_tokens,
            max_retries: config.engine.max_retries,
            name: name.into(),
        }
    }

    /// Execute a task this worker has already claimed. Returns the final
    /// record; on engine failure the task is finalized as failed rather
    /// than left claimed.
    pub async fn run(&self, store: &StateStore, task: &TaskRecord) -> Result<TaskRecord> {
        store.update_task_record(&task.id, |r| r.start())?;
        info!(task_id = %task.id, worker = %self.name, "Task started");

        let plan = store.read_plan()?;
        let mut context = HashMap::new();
        context.insert("goal".to_string(), self.goal.clone());
        context.insert(
            "plan".to_string(),
            if plan.is_empty() { "(no plan yet)".to_string() } else { plan },
        );
        context.insert("task_id".to_string(), task.id.clone());
        context.insert("task_title".to_string(), task.title.clone());
        context.insert("task_description".to_string(), task.description.clone());

        let prompt = self.prompts.render(Actor::Worker, &context);
        let request = GenerationRequest::new(SYSTEM, prompt).with_max_tokens(self.max_tokens);

        let response = match with_retries(self.max_retries, "worker", || {
            self.engine.generate(request.clone())
        })
        .await
        {
            Ok(r) => r,
            Err(e) => {
                let reason = format!("engine call failed: {e}");
                warn!(task_id = %task.id, worker = %self.name, %reason, "Task failed");
                return store
                    .finalize_task(&task.id, |r| r.fail(&reason))
                    .context("Failed to finalize task after engine error");
            }
        };

        let (completed, report, reason) = match extract_json(&response.text) {
            Some(value) => match serde_json::from_value::<WorkerReply>(value) {
                Ok(reply) => (
                    reply.status == "completed",
                    reply.report.unwrap_or_default(),
                    reply.reason,
                ),
                Err(_) => {
                    // JSON present but wrong shape; keep the raw reply as the report
                    (true, response.text.clone(), None)
                }
            },
            // Plain-text reply counts as a completed report
            None => (true, response.text.clone(), None),
        };

        if completed {
            let result_file = if report.is_empty() {
                None
            } else {
                Some(store.write_result(&task.id, &report)?)
            };
            let record = store.finalize_task(&task.id, |r| r.complete(result_file.clone()))?;
            info!(task_id = %task.id, worker = %self.name, "Task completed");
            Ok(record)
        } else {
            let reason = reason.unwrap_or_else(|| "worker reported failure without a reason".to_string());
            if !report.is_empty() {
                store.write_result(&task.id, &report)?;
            }
            let record = store.finalize_task(&task.id, |r| r.fail(&reason))?;
            warn!(task_id = %task.id, worker = %self.name, %reason, "Task failed");
            Ok(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, MockEngine};
    use statestore::NewTask;
    use std::time::Duration;
    use tempfile::tempdir;

    fn worker_with(engine: Arc<MockEngine>) -> Worker {
        let mut config = Config::default();
        config.project.goal = "ship it".to_string();
        Worker::new(engine, Arc::new(Prompts::default()), &config, "worker-1")
    }

    fn claimed_task(store: &StateStore) -> TaskRecord {
        let task = store.append_task(NewTask::new("do the thing", "details")).unwrap();
        store.claim_task(&task.id, "worker-1").unwrap()
    }

    #[tokio::test]
    async fn test_worker_completes_and_stores_report() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let task = claimed_task(&store);

        let engine = Arc::new(MockEngine::new());
        engine.push_response(
            r##"```json
{"status": "completed", "report": "# Done\nbuilt the thing"}
```"##,
        );

        let record = worker_with(engine).run(&store, &task).await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(store.read_result(&task.id).unwrap().contains("built the thing"));
        assert!(!store.locks().is_claimed(&task.id));
    }

    #[tokio::test]
    async fn test_worker_reported_failure() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let task = claimed_task(&store);

        let engine = Arc::new(MockEngine::new());
        engine.push_response(r#"{"status": "failed", "reason": "missing credentials"}"#);

        let record = worker_with(engine).run(&store, &task).await.unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.failure_reason.as_deref(), Some("missing credentials"));
        assert!(!store.locks().is_claimed(&task.id));
    }

    #[tokio::test]
    async fn test_worker_plain_text_counts_as_completed() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let task = claimed_task(&store);

        let engine = Arc::new(MockEngine::new());
        engine.push_response("I did the thing and it works.");

        let record = worker_with(engine).run(&store, &task).await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.result_file.is_some());
    }

    #[tokio::test]
    async fn test_worker_engine_error_fails_task() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let task = claimed_task(&store);

        let engine = Arc::new(MockEngine::new());
        engine.push_error(EngineError::InvalidResponse("garbage".to_string()));

        let record = worker_with(engine).run(&store, &task).await.unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.failure_reason.unwrap().contains("engine call failed"));
        assert!(!store.locks().is_claimed(&task.id));
    }

    #[tokio::test]
    async fn test_worker_retries_transient_errors() {
        let temp = tempdir().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let task = claimed_task(&store);

        let engine = Arc::new(MockEngine::new());
        engine.push_error(EngineError::Timeout(Duration::from_millis(1)));
        engine.push_response(r#"{"status": "completed", "report": "eventually"}"#);

        let record = worker_with(engine.clone()).run(&store, &task).await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(engine.request_count(), 2);
    }
}
