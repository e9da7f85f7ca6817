//! Multi-agent coordination: capability-matched task assignment over a
//! dependency graph, and weighted voting on proposals.
//!
//! Everything here is in-memory; callers persist outcomes (for example as
//! `event` memories) if they need them to outlive the process.

pub mod orchestrator;
pub mod types;
pub mod voting;

use thiserror::Error;

pub use orchestrator::{Assignment, AssignmentReport, Progress, TaskOrchestrator};
pub use types::{AgentProfile, Task, TaskPriority, TaskStatus};
pub use voting::{Decision, DecisionBoard, Tally};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinationError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task already exists: {0}")]
    DuplicateTask(String),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("dependency cycle among tasks: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("task {task} is waiting on unfinished dependencies: {}", .pending.join(", "))]
    Blocked { task: String, pending: Vec<String> },

    #[error("task {task} cannot move from {from} to {to}")]
    InvalidTransition {
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("no agent has capacity and enough keyword overlap for task {0}")]
    NoEligibleAgent(String),

    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("proposal already exists: {0}")]
    DuplicateProposal(String),

    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("proposal {0} is closed")]
    ProposalClosed(String),

    #[error("{agent} already voted on proposal {proposal}")]
    DuplicateVote { proposal: String, agent: String },

    #[error("proposal {proposal} has no option {option:?}")]
    UnknownOption { proposal: String, option: String },

    #[error("weight must be a positive finite number, got {0}")]
    InvalidWeight(f64),
}
