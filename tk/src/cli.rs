//! CLI argument parsing for troika

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tk")]
#[command(author, version, about = "Planner/workers/judge orchestration loop", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Override the state directory from config
    #[arg(short, long)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the orchestration loop until the judge stops it
    Run {
        /// Goal for the run (overrides project.goal from config)
        #[arg(short, long)]
        goal: Option<String>,

        /// Maximum iterations (overrides config)
        #[arg(short, long)]
        max_iterations: Option<u32>,

        /// Run exactly one iteration, then stop
        #[arg(long)]
        once: bool,
    },

    /// Run a single planner pass and show what it produced
    Plan {
        /// Goal for the pass (overrides project.goal from config)
        #[arg(short, long)]
        goal: Option<String>,
    },

    /// Show the run status snapshot
    Status,

    /// List tasks with their lifecycle state
    Tasks,
}
