use clap::Parser;
use eyre::{Context, Result};
use statestore::StateStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use troika::actors::Planner;
use troika::cli::{Cli, Command};
use troika::config::Config;
use troika::engine::create_engine;
use troika::events::{create_event_bus, spawn_log_subscriber};
use troika::orchestrator::Orchestrator;
use troika::prompts::Prompts;

fn setup_logging(log_level: Option<&str>, config_level: Option<&str>) -> Result<()> {
    // Priority: CLI arg > config > default (info)
    let level_str = log_level.or(config_level).unwrap_or("info");

    let level = match level_str.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref())?;
    if let Some(dir) = &cli.state_dir {
        config.storage.state_dir = dir.clone();
    }

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref())?;

    match cli.command {
        Command::Run {
            goal,
            max_iterations,
            once,
        } => {
            if let Some(goal) = goal {
                config.project.goal = goal;
            }
            if let Some(max) = max_iterations {
                config.orchestrator.max_iterations = max;
            }
            if once {
                config.orchestrator.max_iterations = 1;
            }
            run_loop(config).await
        }
        Command::Plan { goal } => {
            if let Some(goal) = goal {
                config.project.goal = goal;
            }
            run_plan(config).await
        }
        Command::Status => show_status(&config),
        Command::Tasks => list_tasks(&config),
    }
}

async fn run_loop(config: Config) -> Result<()> {
    config.validate()?;

    let store = StateStore::open(&config.storage.state_dir)
        .context("failed to open state directory")?;
    let engine = create_engine(&config)?;
    let bus = create_event_bus();
    spawn_log_subscriber(&bus);

    let orchestrator = Orchestrator::new(config, store, engine, bus.clone())?;
    info!(run_id = orchestrator.run_id(), "starting run");

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    spawn_signal_handler(shutdown_tx);

    let summary = orchestrator.run(shutdown_rx).await?;

    println!(
        "run {} stopped after {} iteration(s): {}",
        summary.run_id,
        summary.iterations,
        summary.stop_reason.describe()
    );
    Ok(())
}

async fn run_plan(config: Config) -> Result<()> {
    config.validate()?;

    let store = StateStore::open(&config.storage.state_dir)
        .context("failed to open state directory")?;
    let engine = create_engine(&config)?;
    let prompts = Arc::new(Prompts::load(config.prompts.dir.as_deref())?);

    let planner = Planner::new(engine, prompts, &config);
    let outcome = planner.run(&store).await?;

    if outcome.new_task_ids.is_empty() {
        println!("planner added no tasks");
    } else {
        println!("planner added {} task(s):", outcome.new_task_ids.len());
        for id in &outcome.new_task_ids {
            let record = store.read_task_record(id)?;
            println!("  {}  {}", id, record.title);
        }
    }
    if outcome.plan_updated {
        println!("plan document updated");
    }
    if let Some(reasoning) = outcome.reasoning {
        println!("reasoning: {reasoning}");
    }
    Ok(())
}

fn show_status(config: &Config) -> Result<()> {
    let store = StateStore::open(&config.storage.state_dir)
        .context("failed to open state directory")?;
    let status = store.read_status()?;

    println!("iteration:   {}", status.iteration);
    println!("continue:    {}", status.should_continue);
    if !status.reason.is_empty() {
        println!("reason:      {}", status.reason);
    }
    println!(
        "tasks:       {} total, {} completed, {} failed, {} open",
        status.total_tasks,
        status.completed_tasks,
        status.failed_tasks,
        status.open_tasks()
    );
    if let Some(updated) = status.last_updated {
        println!("updated:     {}", updated.to_rfc3339());
    }
    Ok(())
}

fn list_tasks(config: &Config) -> Result<()> {
    let store = StateStore::open(&config.storage.state_dir)
        .context("failed to open state directory")?;
    let records = store.task_records()?;

    if records.is_empty() {
        println!("no tasks");
        return Ok(());
    }
    for record in records {
        let owner = record.assigned_to.as_deref().unwrap_or("-");
        println!(
            "{}  {:<11}  attempts={}  owner={}  {}",
            record.id, record.status, record.attempt_count, owner, record.title
        );
    }
    Ok(())
}

fn spawn_signal_handler(shutdown_tx: mpsc::Sender<()>) {
    tokio::spawn(async move {
        let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to install SIGINT handler: {e}");
                return;
            }
        };
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
        let _ = shutdown_tx.send(()).await;
    });
}
