//! Prompt templates for the three actors
//!
//! Built-in templates can be overridden per-actor by dropping a file named
//! `planner.md`, `worker.md`, or `judge.md` into the configured prompts
//! directory. Templates use `{{placeholder}}` substitution.

use eyre::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const WORKER_TEMPLATE: &str = include_str!("prompts/worker.md");
const JUDGE_TEMPLATE: &str = include_str!("prompts/judge.md");

/// Which actor a template belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Planner,
    Worker,
    Judge,
}

impl Actor {
    fn file_name(&self) -> &'static str {
        match self {
            Actor::Planner => "planner.md",
            Actor::Worker => "worker.md",
            Actor::Judge => "judge.md",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            Actor::Planner => PLANNER_TEMPLATE,
            Actor::Worker => WORKER_TEMPLATE,
            Actor::Judge => JUDGE_TEMPLATE,
        }
    }
}

/// Loaded prompt templates for one run
#[derive(Debug, Clone)]
pub struct Prompts {
    planner: String,
    worker: String,
    judge: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            planner: PLANNER_TEMPLATE.to_string(),
            worker: WORKER_TEMPLATE.to_string(),
            judge: JUDGE_TEMPLATE.to_string(),
        }
    }
}

impl Prompts {
    /// Load templates, preferring files in `dir` over the built-ins
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let Some(dir) = dir else {
            return Ok(Self::default());
        };

        let load_one = |actor: Actor| -> Result<String> {
            let path = dir.join(actor.file_name());
            if path.exists() {
                fs::read_to_string(&path).context(format!("Failed to read prompt template {}", path.display()))
            } else {
                Ok(actor.builtin().to_string())
            }
        };

        Ok(Self {
            planner: load_one(Actor::Planner)?,
            worker: load_one(Actor::Worker)?,
            judge: load_one(Actor::Judge)?,
        })
    }

    pub fn template(&self, actor: Actor) -> &str {
        match actor {
            Actor::Planner => &self.planner,
            Actor::Worker => &self.worker,
            Actor::Judge => &self.judge,
        }
    }

    /// Render a template with `{{placeholder}}` substitution
    pub fn render(&self, actor: Actor, context: &HashMap<String, String>) -> String {
        let mut result = self.template(actor).to_string();
        for (key, value) in context {
            let placeholder = format!("{{{{{}}}}}", key);
            result = result.replace(&placeholder, value);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_templates_have_placeholders() {
        let prompts = Prompts::default();
        assert!(prompts.template(Actor::Planner).contains("{{goal}}"));
        assert!(prompts.template(Actor::Worker).contains("{{task_description}}"));
        assert!(prompts.template(Actor::Judge).contains("{{plan}}"));
    }

    #[test]
    fn test_render_substitutes_context() {
        let prompts = Prompts::default();
        let mut context = HashMap::new();
        context.insert("goal".to_string(), "ship the widget service".to_string());
        context.insert("plan".to_string(), "(no plan yet)".to_string());
        context.insert("task_summary".to_string(), "(no tasks yet)".to_string());

        let rendered = prompts.render(Actor::Planner, &context);
        assert!(rendered.contains("ship the widget service"));
        assert!(!rendered.contains("{{goal}}"));
    }

    #[test]
    fn test_dir_override_wins() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("worker.md"), "custom worker: {{task_description}}").unwrap();

        let prompts = Prompts::load(Some(temp.path())).unwrap();
        assert!(prompts.template(Actor::Worker).starts_with("custom worker"));
        // Others still the built-ins
        assert!(prompts.template(Actor::Planner).contains("{{goal}}"));
    }
}
