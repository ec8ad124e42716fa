//! Error taxonomy for orchestration operations.

use std::fmt::{self, Display};

use thiserror::Error;
use workflow_primitives::ProposalId;

/// Entity kinds that can be looked up in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A registered actor.
    Actor,
    /// A workflow.
    Workflow,
    /// A proposal.
    Proposal,
    /// A single proposal execution.
    Execution,
    /// A parallel batch execution.
    ParallelExecution,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Actor => "actor",
            Self::Workflow => "workflow",
            Self::Proposal => "proposal",
            Self::Execution => "execution",
            Self::ParallelExecution => "parallel execution",
        })
    }
}

/// Errors surfaced synchronously by mutating and query operations.
///
/// None of these are audited: only successful transitions reach the log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    /// An identifier did not resolve.
    #[error("{kind} `{id}` not found")]
    NotFound {
        /// Kind of entity that was looked up.
        kind: EntityKind,
        /// The unresolved identifier.
        id: String,
    },
    /// The entity is not in a state that permits the operation.
    #[error("invalid state for {subject}: {reason}")]
    InvalidState {
        /// Entity the operation targeted.
        subject: String,
        /// Human-readable explanation.
        reason: String,
    },
    /// The proposal has already been executed (or is executing).
    #[error("proposal `{proposal_id}` has already been executed")]
    AlreadyExecuted {
        /// Proposal that was executed before.
        proposal_id: ProposalId,
    },
    /// A required field was missing or malformed.
    #[error("invalid `{field}`: {reason}")]
    Validation {
        /// Field that failed validation.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
}

impl OrchestrationError {
    /// Builds a [`OrchestrationError::NotFound`].
    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Builds a [`OrchestrationError::InvalidState`].
    #[must_use]
    pub fn invalid_state(subject: impl Display, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }

    /// Builds a [`OrchestrationError::Validation`].
    #[must_use]
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// Result alias for orchestration operations.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

pub(crate) fn require_non_blank(field: &'static str, value: &str) -> OrchestrationResult<()> {
    if value.trim().is_empty() {
        return Err(OrchestrationError::validation(field, "must not be empty"));
    }
    Ok(())
}
