//! The three actors of the loop: planner, workers, judge
//!
//! Each actor renders a prompt, calls the reasoning engine, and parses a
//! structured response out of the reply. Replies are expected to carry a
//! fenced ```json block; actors degrade to documented fallbacks when the
//! engine answers in plain text instead.

mod judge;
mod planner;
mod worker;

pub use judge::{Judge, Verdict};
pub use planner::{Planner, PlannerOutcome};
pub use worker::Worker;

use regex::Regex;
use statestore::{StateStore, TaskRecord};
use std::sync::OnceLock;

/// Pull a JSON object out of an engine reply: a fenced ```json block if
/// present, otherwise the outermost brace-delimited span.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"```(?:json)?\s*\n([\s\S]*?)\n\s*```").unwrap());

    if let Some(caps) = fence.captures(text)
        && let Ok(value) = serde_json::from_str(caps.get(1).map_or("", |m| m.as_str()))
    {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// One-line-per-task board rendering shared by planner and judge prompts
pub(crate) fn task_summary(store: &StateStore) -> statestore::StoreResult<String> {
    let records = store.task_records()?;
    if records.is_empty() {
        return Ok("(no tasks yet)".to_string());
    }
    Ok(records.iter().map(summary_line).collect::<Vec<_>>().join("\n"))
}

fn summary_line(record: &TaskRecord) -> String {
    let mut line = format!("{} [{}] {}", record.id, record.status, record.title);
    if let Some(reason) = &record.failure_reason {
        line.push_str(&format!(" (failed: {reason})"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_fenced() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_json_unlabeled_fence() {
        let text = "```\n{\"a\": 2}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["a"], 2);
    }

    #[test]
    fn test_extract_json_bare_braces() {
        let text = "Sure! {\"status\": \"completed\", \"report\": \"done\"} hope that helps";
        let value = extract_json(text).unwrap();
        assert_eq!(value["status"], "completed");
    }

    #[test]
    fn test_extract_json_none_for_plain_text() {
        assert!(extract_json("just words, no structure").is_none());
        assert!(extract_json("unbalanced } then {").is_none());
    }

    #[test]
    fn test_extract_json_prefers_fence_over_surrounding_braces() {
        let text = "{not json}\n```json\n{\"picked\": true}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["picked"], true);
    }
}
