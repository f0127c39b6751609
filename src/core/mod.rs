//! Core module containing the research orchestration engine
//!
//! This module contains:
//! - The task record, plan and checkpoint model
//! - The approval gate suspending tasks on human decisions
//! - The iteration controller and plan builder
//! - The workflow engine driving the fixed pipeline
//! - The worker loop executing tasks from the shared store

mod approval;
mod checkpoint;
mod engine;
mod iteration;
mod manager;
mod plan_builder;
mod task;
mod task_state;

pub use approval::*;
pub use checkpoint::*;
pub use engine::*;
pub use iteration::*;
pub use manager::*;
pub use plan_builder::*;
pub use task::*;
pub use task_state::*;
