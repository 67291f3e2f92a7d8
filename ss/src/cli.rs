//! CLI argument parsing for statestore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ss")]
#[command(author, version, about = "Inspect a troika state directory", long_about = None)]
pub struct Cli {
    /// Path to the state directory
    #[arg(short, long, default_value = ".troika")]
    pub state_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the run status snapshot
    Status,

    /// List tasks with their lifecycle state
    Tasks {
        /// Only show tasks in this state (pending, assigned, in_progress, completed, failed)
        #[arg(short = 'f', long)]
        filter: Option<String>,
    },

    /// Show one task record in full
    Show {
        /// Task ID (e.g. task_001)
        #[arg(required = true)]
        task_id: String,

        /// Also print the worker report, if any
        #[arg(short, long)]
        result: bool,
    },

    /// List current claim markers
    Locks {
        /// Only show markers older than this many seconds
        #[arg(long)]
        stale_after: Option<u64>,

        /// Reclaim tasks behind stale markers (older than --stale-after,
        /// default 300s) and remove the markers
        #[arg(long)]
        clean_stale: bool,

        /// Attempt budget used when cleaning: a task past it is finalized
        /// as failed instead of going back to pending
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,
    },

    /// Print the current plan document
    Plan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_locks() {
        let cli = Cli::parse_from(["ss", "locks"]);
        assert!(matches!(
            cli.command,
            Command::Locks { stale_after: None, clean_stale: false, max_attempts: 3 }
        ));
    }

    #[test]
    fn test_cli_parse_locks_clean_stale() {
        let cli = Cli::parse_from(["ss", "locks", "--clean-stale", "--stale-after", "60"]);
        assert!(matches!(
            cli.command,
            Command::Locks { stale_after: Some(60), clean_stale: true, .. }
        ));
    }
}
