//! Core shared types for the workflow orchestration core.

#![warn(missing_docs, clippy::pedantic)]

mod call;
mod error;
mod ids;

/// Tool call payloads and review-time edits.
pub use call::{Params, ToolCall, ToolCallEdits};
/// Error type for identifier parsing.
pub use error::IdError;
/// Typed entity identifiers and their allocator.
pub use ids::{
    ActorId, AuditEntryId, EntityId, ExecutionId, ParallelExecutionId, ProposalId, Sequence,
    WorkflowId,
};
