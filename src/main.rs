//! Main entry point for the application.
//!
//! This module initializes logging, loads environment variables and
//! configuration, and dispatches the requested subcommand:
//! - `run` / `resume`: execute one task in-process with interactive approval
//! - `serve`: the HTTP API, optionally executing tasks itself
//! - `worker`: claim and execute tasks from the shared database
//! - `approve` / `cancel` / `status` / `history`: operate on stored tasks

mod agents;
mod api;
mod bridge;
mod cli;
mod config;
mod constants;
mod core;
mod db;
mod errors;
mod event;
mod llm;
mod schema;
mod tools;
mod utils;

use crate::agents::{LlmCoordinator, LlmPlanner, LlmRapporteur};
use crate::api::ApiState;
use crate::bridge::{build_bridge, EventBridge};
use crate::cli::{Cli, Command};
use crate::config::AppConfig;
use crate::constants::{BRIDGE_POLL_INTERVAL, WORKER_POLL_INTERVAL};
use crate::core::{
    ApprovalCallback, ApprovalDecision, ApprovalGate, ApprovalMode, Collaborators,
    DecideOutcome, EngineSettings, NewTask, OutputFormat, RunOutcome, TaskManager, TaskRecord,
    TaskStatus, WorkflowEngine,
};
use crate::db::{Database, TaskRepository};
use crate::event::{EventKind, TaskEvent};
use crate::llm::LlmClient;
use crate::tools::ToolRegistry;
use chrono::Utc;
use clap::Parser;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use indicatif::ProgressBar;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

type AppResult<T> = Result<T, Box<dyn Error>>;

/// Handles shared by every subcommand
struct Components {
    config: AppConfig,
    store: TaskRepository,
    gate: Arc<ApprovalGate>,
    bridge: Arc<dyn EventBridge>,
}

impl Components {
    fn open(config: AppConfig) -> AppResult<Self> {
        let database = Database::open(&config.database_path)?;
        let store = TaskRepository::new(database.clone());
        let gate = Arc::new(ApprovalGate::new(
            store.clone(),
            config.workflow.approval_poll_interval,
        ));
        let bridge = build_bridge(config.event_bridge, &database, BRIDGE_POLL_INTERVAL);
        Ok(Components {
            config,
            store,
            gate,
            bridge,
        })
    }

    /// Builds the engine with LLM-backed collaborators
    fn engine(&self) -> AppResult<Arc<WorkflowEngine>> {
        let llm = Arc::new(LlmClient::new(&self.config.llm)?);
        let collaborators = Collaborators {
            coordinator: Arc::new(LlmCoordinator::new(llm.clone())),
            planner: Arc::new(LlmPlanner::new(llm.clone())),
            rapporteur: Arc::new(LlmRapporteur::new(llm)),
            tools: Arc::new(ToolRegistry::from_config(&self.config.search)),
        };
        let engine = WorkflowEngine::new(
            self.store.clone(),
            self.gate.clone(),
            self.bridge.clone(),
            collaborators,
            EngineSettings {
                output_dir: PathBuf::from(&self.config.workflow.output_dir),
                default_source: self.config.search.default_source.clone(),
            },
        )?;
        Ok(Arc::new(engine))
    }
}

/// Main entry point that initializes and runs the application.
///
/// # Initialization steps:
/// 1. Parse CLI arguments
/// 2. Initialize logging system
/// 3. Load environment variables and configuration
/// 4. Dispatch the subcommand
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    utils::init_logging(&cli.logging_level, cli.log_file);

    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = config::load_app_config(cli.config.as_deref())?;
    let components = Components::open(config)?;

    match cli.command {
        Command::Run {
            query,
            max_iterations,
            auto_approve,
            format,
        } => run_query(&components, query, max_iterations, auto_approve, format).await,
        Command::Serve { port, execute } => serve(components, port, execute).await,
        Command::Worker { worker_id } => work(&components, worker_id).await,
        Command::Approve {
            task_id,
            reject,
            feedback,
            round,
        } => approve(&components, &task_id, !reject, feedback, round).await,
        Command::Cancel { task_id } => cancel(&components, &task_id).await,
        Command::Status { task_id } => {
            print_status(&components.store.get(&task_id)?);
            Ok(())
        }
        Command::History { limit, offset } => history(&components, limit, offset),
        Command::Resume { task_id } => {
            let engine = components.engine()?;
            execute_interactively(&components, &engine, &task_id, true).await
        }
    }
}

async fn run_query(
    components: &Components,
    query: String,
    max_iterations: Option<u32>,
    auto_approve: bool,
    format: OutputFormat,
) -> AppResult<()> {
    let engine = components.engine()?;
    let workflow = &components.config.workflow;
    let record = TaskRecord::new(
        Uuid::new_v4().to_string(),
        NewTask {
            query,
            max_iterations: max_iterations.unwrap_or(workflow.max_iterations),
            output_format: format,
            auto_approve: auto_approve || workflow.auto_approve_plan,
            approval_timeout_secs: workflow.approval_timeout.as_secs(),
        },
    );
    components.store.create(&record)?;
    components.store.claim(&record.id, "cli")?;
    println!("{} {}", "🔎 Task".bold().cyan(), record.id);

    execute_interactively(components, &engine, &record.id, false).await
}

/// Runs a task in this process, asking for plan approval on the terminal
async fn execute_interactively(
    components: &Components,
    engine: &WorkflowEngine,
    task_id: &str,
    resume: bool,
) -> AppResult<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("Working...");

    let mut events = components.bridge.subscribe(Some(task_id));
    let progress = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Some(message) = describe(&event) {
                    spinner.set_message(message);
                }
            }
        })
    };

    let prompt_spinner = spinner.clone();
    let callback: ApprovalCallback =
        Arc::new(move |record: &TaskRecord| prompt_spinner.suspend(|| ask_approval(record)));
    let mode = ApprovalMode::Callback(callback);

    let outcome = if resume {
        engine.resume(task_id, mode).await
    } else {
        engine.run(task_id, mode).await
    };
    progress.abort();
    spinner.finish_and_clear();

    match outcome? {
        RunOutcome::Completed(record) => {
            println!("{}", "\n✅ Research completed\n".green().bold());
            println!("{}", record.final_report.unwrap_or_default());
            if let Some(path) = record.output_path {
                println!("\n{} {}", "📄 Report saved to".cyan(), path);
            }
        }
        RunOutcome::Failed(record) => {
            let reason = record
                .failure
                .map(|f| f.message)
                .unwrap_or_else(|| "unknown reason".to_string());
            println!("{} {}", "❌ Research failed:".red().bold(), reason);
        }
        RunOutcome::Cancelled(_) => println!("{}", "🛑 Task cancelled".yellow()),
        RunOutcome::Suspended(record) => println!(
            "{} {} ({})",
            "⏸ Task suspended:".yellow(),
            record.id,
            record.status
        ),
    }
    Ok(())
}

fn describe(event: &TaskEvent) -> Option<String> {
    match &event.kind {
        EventKind::StatusUpdate { message, .. } => Some(message.clone()),
        EventKind::Progress {
            iteration,
            max_iterations,
            current_task,
            ..
        } => Some(format!(
            "Iteration {}/{}: {}",
            iteration,
            max_iterations,
            current_task.as_deref().unwrap_or("")
        )),
        _ => None,
    }
}

/// Interactive approval callback; a prompt error cancels the task
fn ask_approval(record: &TaskRecord) -> Result<(bool, Option<String>), String> {
    let plan = record
        .plan
        .as_ref()
        .ok_or_else(|| "no plan to approve".to_string())?;

    println!(
        "{}",
        format!("\n📋 Research plan (round {})", record.approval_round)
            .bold()
            .cyan()
    );
    println!("{} {}", "Goal:".bold(), plan.research_goal);
    for sub_task in &plan.sub_tasks {
        println!(
            "  {}. {} {}",
            sub_task.id,
            sub_task.description,
            format!("[{}]", sub_task.search_queries.join(", ")).dimmed()
        );
    }
    if !plan.completion_criteria.is_empty() {
        println!("{} {}", "Done when:".bold(), plan.completion_criteria);
    }

    let approved = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Approve this plan?")
        .default(true)
        .interact()
        .map_err(|e| e.to_string())?;
    if approved {
        return Ok((true, None));
    }

    let feedback: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("What should change?")
        .allow_empty(true)
        .interact_text()
        .map_err(|e| e.to_string())?;
    Ok((false, Some(feedback).filter(|f| !f.trim().is_empty())))
}

async fn serve(components: Components, port: u16, execute: bool) -> AppResult<()> {
    let executor = if execute {
        let manager = Arc::new(TaskManager::new(
            &format!("api-{}", port),
            components.engine()?,
            components.bridge.clone(),
            WORKER_POLL_INTERVAL,
        ));
        let background = manager.clone();
        tokio::spawn(async move { background.run(shutdown_signal()).await });
        Some(manager)
    } else {
        None
    };

    let state = Arc::new(ApiState {
        store: components.store,
        gate: components.gate,
        bridge: components.bridge,
        defaults: components.config.workflow,
        executor,
    });
    info!("Starting API server on port {}", port);
    api::server::launch_server(port, state).await
}

async fn work(components: &Components, worker_id: Option<String>) -> AppResult<()> {
    let worker_id = worker_id.unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));
    let manager = TaskManager::new(
        &worker_id,
        components.engine()?,
        components.bridge.clone(),
        WORKER_POLL_INTERVAL,
    );
    manager.run(shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn approve(
    components: &Components,
    task_id: &str,
    approved: bool,
    feedback: Option<String>,
    round: Option<u32>,
) -> AppResult<()> {
    let decision = ApprovalDecision {
        approved,
        feedback: feedback.filter(|f| !f.trim().is_empty()),
        round,
        decided_at: Utc::now(),
    };

    match components.gate.decide(task_id, decision.clone())? {
        DecideOutcome::Ignored(reason) => {
            println!("{} {}", "Decision ignored:".yellow(), reason);
        }
        _ => {
            components
                .bridge
                .publish(&TaskEvent::new(
                    task_id,
                    EventKind::ApprovalReceived {
                        approved: decision.approved,
                        feedback: decision.feedback,
                        round: decision.round,
                    },
                ))
                .await;
            let verdict = if approved { "approved" } else { "rejected" };
            println!("{} {}", "✅ Plan".green(), verdict);
        }
    }
    Ok(())
}

async fn cancel(components: &Components, task_id: &str) -> AppResult<()> {
    if components.gate.cancel(task_id)? {
        components
            .bridge
            .publish(&TaskEvent::new(
                task_id,
                EventKind::StatusUpdate {
                    step: TaskStatus::Cancelled,
                    message: "Task cancelled".to_string(),
                },
            ))
            .await;
        println!("{} {}", "🛑 Cancelled".yellow(), task_id);
    } else {
        println!("Task {} has already finished", task_id);
    }
    Ok(())
}

fn history(components: &Components, limit: i64, offset: i64) -> AppResult<()> {
    let (total, records) = components.store.list(limit.max(1), offset.max(0))?;
    println!("{} {}", "Tasks:".bold(), total);
    for record in &records {
        println!(
            "{}  {:<18} {}  {}",
            record.id,
            record.status.to_string(),
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.query
        );
    }
    Ok(())
}

fn print_status(record: &TaskRecord) {
    let progress = record.progress();
    println!("{} {}", "Task:".bold(), record.id);
    println!("{} {}", "Query:".bold(), record.query);
    let status = match record.status {
        TaskStatus::Completed => record.status.to_string().green(),
        TaskStatus::Failed | TaskStatus::Cancelled => record.status.to_string().red(),
        _ => record.status.to_string().yellow(),
    };
    println!("{} {}", "Status:".bold(), status);
    println!(
        "{} {}/{}",
        "Iterations:".bold(),
        progress.iteration,
        progress.max_iterations
    );
    if let Some(current) = progress.current_task {
        println!("{} {}", "Current subtask:".bold(), current);
    }
    if record.status == TaskStatus::AwaitingApproval {
        println!("{} {}", "Approval round:".bold(), record.approval_round);
    }
    if let Some(failure) = &record.failure {
        println!("{} {} ({})", "Failure:".bold(), failure.message, failure.reason);
    }
    if let Some(path) = &record.output_path {
        println!("{} {}", "Report:".bold(), path);
    }
    println!(
        "{} {}   {} {}",
        "Created:".bold(),
        record.created_at.to_rfc3339(),
        "Updated:".bold(),
        record.updated_at.to_rfc3339()
    );
}
