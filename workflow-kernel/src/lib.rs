//! Human-in-the-loop orchestration core.
//!
//! Agents propose tool calls, human reviewers approve, reject or edit them, and
//! only approved calls reach the [`ToolExecutor`](workflow_tools::ToolExecutor).
//! Every state change lands in an append-only audit log. A separate parallel path
//! fans low-risk calls out concurrently without review.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod execution;
mod orchestrator;
mod parallel;
mod proposal;
mod registry;
mod scheduler;
mod surface;

pub use error::{EntityKind, OrchestrationError, OrchestrationResult};
pub use execution::{Execution, ExecutionEngine, ExecutionOutcome};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use parallel::{CallResult, ParallelCoordinator, ParallelExecution};
pub use proposal::{
    Proposal, ProposalEvent, ProposalMachine, ProposalStatus, ReviewDecision, ReviewOutcome,
};
pub use registry::{Actor, Registry, Workflow, WorkflowStatus};
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerResult, TaskScheduler};
pub use surface::{
    ConnectorSurface, Operation, OperationDescriptor, SurfaceError, SurfaceResult,
};
