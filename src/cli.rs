use crate::constants::MAX_ALLOWED_ITERATIONS;
use crate::core::OutputFormat;
use clap::{Parser, Subcommand};

/// Command line interface for the application
#[derive(Parser)]
#[command(name = "delver", version, about = "Resumable research workflows with human plan approval")]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Sets the logging verbosity level for the application
    /// Possible values: "error", "warn", "info", "debug", "trace"
    /// Default: "info"
    #[arg(long, global = true, default_value_t = String::from("info"))]
    pub logging_level: String,

    /// Also write logs to logs/delver.log
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Research a query in this process, approving the plan interactively
    Run {
        query: String,
        /// Cap on research iterations (1-20)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_ALLOWED_ITERATIONS as i64))]
        max_iterations: Option<u32>,
        /// Skip the interactive plan approval
        #[arg(long)]
        auto_approve: bool,
        #[arg(long, default_value = "markdown")]
        format: OutputFormat,
    },
    /// Start the HTTP API
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,
        /// Execute tasks in the API process instead of leaving them to workers
        #[arg(long)]
        execute: bool,
    },
    /// Claim and execute pending tasks from the shared database
    Worker {
        #[arg(long)]
        worker_id: Option<String>,
    },
    /// Record a decision on the plan of a task awaiting approval
    Approve {
        task_id: String,
        #[arg(long)]
        reject: bool,
        #[arg(long)]
        feedback: Option<String>,
        /// Approval round the decision answers (defaults to the open one)
        #[arg(long)]
        round: Option<u32>,
    },
    /// Cancel a task that has not finished
    Cancel { task_id: String },
    /// Show the status and progress of a task
    Status { task_id: String },
    /// List tasks, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Continue a task from its checkpoint in this process
    Resume { task_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_max_iterations(value: &str) -> Result<Option<u32>, clap::Error> {
        let cli = Cli::try_parse_from(["delver", "run", "rust", "--max-iterations", value])?;
        match cli.command {
            Command::Run { max_iterations, .. } => Ok(max_iterations),
            _ => panic!("expected the run command"),
        }
    }

    #[test]
    fn run_accepts_iterations_within_range() {
        assert_eq!(run_max_iterations("1").unwrap(), Some(1));
        assert_eq!(run_max_iterations("20").unwrap(), Some(20));
    }

    #[test]
    fn run_rejects_iterations_out_of_range() {
        assert!(run_max_iterations("0").is_err());
        assert!(run_max_iterations("21").is_err());
        assert!(run_max_iterations("4294967295").is_err());
    }
}
