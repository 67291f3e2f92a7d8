//! Judge actor
//!
//! Reviews the plan, the board, and recent results, and issues a verdict
//! on whether the loop should keep running.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use statestore::{StateStore, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::{extract_json, task_summary};
use crate::config::Config;
use crate::engine::{EngineHandle, GenerationRequest};
use crate::prompts::{Actor, Prompts};
use crate::retry::with_retries;

const SYSTEM: &str = "You are the judge in a planner/workers/judge loop. \
You decide whether the loop is making progress toward its goal and whether it should continue.";

/// How many recent worker reports to show the judge
const RECENT_RESULTS: usize = 5;

/// Cap per report so one chatty worker cannot crowd out the rest
const RESULT_EXCERPT_CHARS: usize = 2_000;

/// The judge's decision for one iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub should_continue: bool,
    pub reason: String,
    #[serde(default)]
    pub progress_score: f64,
    #[serde(default)]
    pub drift_detected: bool,
}

pub struct Judge {
    engine: EngineHandle,
    prompts: Arc<Prompts>,
    goal: String,
    max_tokens: u32,
    max_retries: u32,
}

impl Judge {
    pub fn new(engine: EngineHandle, prompts: Arc<Prompts>, config: &Config) -> Self {
        Self {
            engine,
            prompts,
            goal: config.project.goal.clone(),
            max_tokens: config.engine.max_tokens,
            max_retries: config.engine.max_retries,
        }
    }

    /// Run one judging pass against the store
    pub async fn run(&self, store: &StateStore) -> Result<Verdict> {
        let plan = store.read_plan()?;
        let mut context = HashMap::new();
        context.insert("goal".to_string(), self.goal.clone());
        context.insert(
            "plan".to_string(),
            if plan.is_empty() { "(no plan yet)".to_string() } else { plan },
        );
        context.insert("task_summary".to_string(), task_summary(store)?);
        context.insert("recent_results".to_string(), recent_results(store)?);

        let prompt = self.prompts.render(Actor::Judge, &context);
        let request = GenerationRequest::new(SYSTEM, prompt).with_max_tokens(self.max_tokens);

        let response = with_retries(self.max_retries, "judge", || {
            self.engine.generate(request.clone())
        })
        .await
        .context("Judge engine call failed")?;

        let verdict = match extract_json(&response.text).and_then(|v| serde_json::from_value::<Verdict>(v).ok()) {
            Some(verdict) => verdict,
            None => {
                // Plain-text verdict: only an explicit stop is a stop
                warn!("Judge replied without JSON; falling back to text heuristic");
                let lower = response.text.to_lowercase();
                let stop = lower.contains("should_continue: false") || lower.contains("stop the loop");
                Verdict {
                    should_continue: !stop,
                    reason: response.text.clone(),
                    progress_score: 0.0,
                    drift_detected: false,
                }
            }
        };

        info!(
            should_continue = verdict.should_continue,
            progress_score = verdict.progress_score,
            drift = verdict.drift_detected,
            "Judge verdict"
        );
        Ok(verdict)
    }
}

/// Most recent completed reports, newest last, each truncated
fn recent_results(store: &StateStore) -> Result<String> {
    let records = store.task_records()?;
    let mut completed: Vec<_> = records
        .iter()
        .filter(|r| r.status == TaskStatus::Completed && r.result_file.is_some())
        .collect();
    completed.sort_by_key(|r| r.completed_at);

    let mut sections = Vec::new();
    for record in completed.iter().rev().take(RECENT_RESULTS).rev() {
        let mut body = store.read_result(&record.id)?;
        if body.len() > RESULT_EXCERPT_CHARS {
            let mut cut = RESULT_EXCERPT_CHARS;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("\n[truncated]");
        }
        sections.push(format!("### {} - {}\n\n{}", record.id, record.title, body));
    }

    if sections.is_empty() {
        Ok("(no results yet)".to_string())
    } else {
        Ok(sections.join("\n\n"))
    }
}
