//! Planner actor
//!
//! Reads the plan and the task board, asks the engine for an updated plan
//! and new tasks, and writes both back to the store.

use eyre::{Context, Result};
use serde::Deserialize;
use statestore::{NewTask, Priority, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::{extract_json, task_summary};
use crate::config::Config;
use crate::engine::{EngineHandle, GenerationRequest};
use crate::prompts::{Actor, Prompts};
use crate::retry::with_retries;

const SYSTEM: &str = "You are the planner in a planner/workers/judge loop. \
You decompose a goal into small, independent tasks and keep the plan current.";

/// What a planner run produced
#[derive(Debug, Clone, Default)]
pub struct PlannerOutcome {
    /// Ids of tasks appended this run
    pub new_task_ids: Vec<String>,
    /// Whether the plan document changed
    pub plan_updated: bool,
    pub reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlannerResponse {
    #[serde(default)]
    plan_update: Option<String>,
    #[serde(default)]
    new_tasks: Vec<PlannedTask>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlannedTask {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: Option<String>,
}

impl PlannedTask {
    fn into_new_task(self) -> NewTask {
        let priority = match self.priority.as_deref() {
            Some("low") => Priority::Low,
            Some("high") => Priority::High,
            _ => Priority::Medium,
        };
        NewTask::new(self.title, self.description).with_priority(priority)
    }
}

pub struct Planner {
    engine: EngineHandle,
    prompts: Arc<Prompts>,
    goal: String,
    max_tokens: u32,
    max_retries: u32,
}

impl Planner {
    pub fn new(engine: EngineHandle, prompts: Arc<Prompts>, config: &Config) -> Self {
        Self {
            engine,
            prompts,
            goal: config.project.goal.clone(),
            max_tokens: config.engine.max_tokens,
            max_retries: config.engine.max_retries,
        }
    }

    /// Run one planning pass against the store
    pub async fn run(&self, store: &StateStore) -> Result<PlannerOutcome> {
        let plan = store.read_plan()?;
        let mut context = HashMap::new();
        context.insert("goal".to_string(), self.goal.clone());
        context.insert(
            "plan".to_string(),
            if plan.is_empty() { "(no plan yet)".to_string() } else { plan.clone() },
        );
        context.insert("task_summary".to_string(), task_summary(store)?);

        let prompt = self.prompts.render(Actor::Planner, &context);
        let request = GenerationRequest::new(SYSTEM, prompt).with_max_tokens(self.max_tokens);

        let response = with_retries(self.max_retries, "planner", || {
            self.engine.generate(request.clone())
        })
        .await
        .context("Planner engine call failed")?;

        let parsed = match extract_json(&response.text) {
            Some(value) => serde_json::from_value::<PlannerResponse>(value)
                .context("Planner reply JSON did not match the expected shape")?,
            None => {
                // Plain-text reply: treat the whole thing as a plan update
                warn!("Planner replied without JSON; treating reply as plan text");
                PlannerResponse {
                    plan_update: Some(response.text.clone()),
                    new_tasks: Vec::new(),
                    reasoning: None,
                }
            }
        };

        let mut outcome = PlannerOutcome {
            reasoning: parsed.reasoning,
            ..Default::default()
        };

        if let Some(update) = parsed.plan_update
            && update != plan
        {
            store.write_plan(&update)?;
            outcome.plan_updated = true;
        }

        // Skip tasks whose title is already on the board, so a planner that
        // re-proposes existing work does not duplicate it
        let existing: Vec<String> = store.read_task_index()?.tasks.into_iter().map(|t| t.title).collect();
        for planned in parsed.new_tasks {
            if planned.title.trim().is_empty() {
                continue;
            }
            if existing.iter().any(|t| t == &planned.title) {
                continue;
            }
            let record = store.append_task(planned.into_new_task())?;
            outcome.new_task_ids.push(record.id);
        }

        info!(
            new_tasks = outcome.new_task_ids.len(),
            plan_updated = outcome.plan_updated,
            "Planner pass complete"
        );
        Ok(outcome)
    }
}
