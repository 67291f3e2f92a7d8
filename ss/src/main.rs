use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::time::Duration;

use statestore::cli::{Cli, Command};
use statestore::{StateStore, TaskRecord, TaskStatus};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
    Ok(())
}

fn status_colored(status: TaskStatus) -> ColoredString {
    let s = status.to_string();
    match status {
        TaskStatus::Pending => s.yellow(),
        TaskStatus::Assigned => s.blue(),
        TaskStatus::InProgress => s.cyan(),
        TaskStatus::Completed => s.green(),
        TaskStatus::Failed => s.red(),
    }
}

fn print_record(record: &TaskRecord) {
    println!("{}  [{}] {}", record.id.cyan(), status_colored(record.status), record.title);
    println!("  priority: {}", record.priority);
    if let Some(worker) = &record.assigned_to {
        println!("  assigned to: {worker}");
    }
    println!("  attempts: {}  version: {}", record.attempt_count, record.version);
    println!("  created: {}", record.created_at);
    if let Some(started) = record.started_at {
        println!("  started: {started}");
    }
    if let Some(completed) = record.completed_at {
        println!("  finished: {completed}");
    }
    if let Some(reason) = &record.failure_reason {
        println!("  failure: {}", reason.red());
    }
    if let Some(result) = &record.result_file {
        println!("  result: {result}");
    }
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let store = StateStore::open(&cli.state_dir)
        .context(format!("Failed to open state dir {}", cli.state_dir.display()))?;

    info!("statestore inspecting {}", cli.state_dir.display());

    match cli.command {
        Command::Status => {
            let status = store.read_status()?;
            println!("iteration: {}", status.iteration);
            println!(
                "should continue: {}",
                if status.should_continue { "yes".green() } else { "no".red() }
            );
            if !status.reason.is_empty() {
                println!("reason: {}", status.reason);
            }
            println!(
                "tasks: {} total, {} completed, {} failed, {} open",
                status.total_tasks,
                status.completed_tasks.to_string().green(),
                status.failed_tasks.to_string().red(),
                status.open_tasks()
            );
            if let Some(t) = status.last_planner_run {
                println!("last planner run: {t}");
            }
            if let Some(t) = status.last_worker_run {
                println!("last worker run: {t}");
            }
            if let Some(t) = status.last_judge_run {
                println!("last judge run: {t}");
            }
            if let Some(updated) = status.last_updated {
                println!("updated: {updated}");
            }
        }
        Command::Tasks { filter } => {
            let records = store.task_records()?;
            let filtered: Vec<&TaskRecord> = records
                .iter()
                .filter(|r| filter.as_deref().is_none_or(|f| r.status.to_string() == f))
                .collect();
            if filtered.is_empty() {
                println!("No tasks found");
            } else {
                for record in filtered {
                    println!(
                        "{}  [{}] {}",
                        record.id.cyan(),
                        status_colored(record.status),
                        record.title
                    );
                }
            }
        }
        Command::Show { task_id, result } => {
            let record = store.read_task_record(&task_id)?;
            print_record(&record);
            if result {
                match store.read_result(&task_id) {
                    Ok(content) => {
                        println!();
                        println!("{content}");
                    }
                    Err(_) => println!("  (no result recorded)"),
                }
            }
        }
        Command::Locks { stale_after, clean_stale, max_attempts } => {
            if clean_stale {
                let threshold = Duration::from_secs(stale_after.unwrap_or(300));
                let report = store.reclaim_stale(threshold, max_attempts)?;
                if report.is_empty() {
                    println!("No stale claims to clean");
                } else {
                    for id in &report.reset {
                        println!("{}  {}", id.cyan(), "reset to pending".yellow());
                    }
                    for id in &report.exhausted {
                        println!("{}  {}", id.cyan(), "failed: no attempts remaining".red());
                    }
                    for id in &report.released {
                        println!("{}  marker removed", id.cyan());
                    }
                }
            } else {
                let markers = match stale_after {
                    Some(secs) => store.locks().stale_markers(Duration::from_secs(secs))?,
                    None => store.locks().markers()?,
                };
                if markers.is_empty() {
                    println!("No claims held");
                } else {
                    for marker in markers {
                        println!(
                            "{}  held by {} since {} ({}s)",
                            marker.task_id.cyan(),
                            marker.owner.yellow(),
                            marker.claimed_at,
                            marker.age().as_secs()
                        );
                    }
                }
            }
        }
        Command::Plan => {
            let plan = store.read_plan()?;
            if plan.is_empty() {
                println!("No plan written yet");
            } else {
                println!("{plan}");
            }
        }
    }

    Ok(())
}
