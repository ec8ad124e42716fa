//! Proposal lifecycle: creation, review and the transition table.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use workflow_audit::{AuditDraft, AuditKind};
use workflow_primitives::{ActorId, ExecutionId, ProposalId, ToolCall, ToolCallEdits, WorkflowId};

use crate::error::{OrchestrationError, OrchestrationResult, require_non_blank};
use crate::registry::{Registry, WorkflowStatus};

/// States a proposal can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    /// Awaiting a review decision.
    Pending,
    /// Approved (possibly with edits) and ready to execute.
    Approved,
    /// Rejected; can never be executed.
    Rejected,
    /// Executed exactly once.
    Executed,
}

impl ProposalStatus {
    /// Returns `true` for states that accept no further events.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Executed)
    }

    /// Returns the state reached by applying `event`, or `None` when the pair is
    /// not a permitted transition.
    #[must_use]
    pub const fn next(self, event: ProposalEvent) -> Option<Self> {
        match (self, event) {
            (Self::Pending, ProposalEvent::Approve | ProposalEvent::Edit) => Some(Self::Approved),
            (Self::Pending, ProposalEvent::Reject) => Some(Self::Rejected),
            (Self::Approved, ProposalEvent::Execute) => Some(Self::Executed),
            _ => None,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
        })
    }
}

/// Events driving [`ProposalStatus`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalEvent {
    /// Reviewer accepts the call as proposed.
    Approve,
    /// Reviewer refuses the call.
    Reject,
    /// Reviewer accepts the call with amendments.
    Edit,
    /// The approved call was dispatched.
    Execute,
}

impl fmt::Display for ProposalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Edit => "edit",
            Self::Execute => "execute",
        })
    }
}

/// A reviewer's decision. Edits can only accompany [`ReviewDecision::Edit`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    /// Approve the call unchanged.
    Approve,
    /// Reject the call.
    Reject,
    /// Approve the call with the given amendments.
    Edit(ToolCallEdits),
}

impl ReviewDecision {
    /// Event the decision applies to the proposal.
    #[must_use]
    pub const fn event(&self) -> ProposalEvent {
        match self {
            Self::Approve => ProposalEvent::Approve,
            Self::Reject => ProposalEvent::Reject,
            Self::Edit(_) => ProposalEvent::Edit,
        }
    }

    /// Edits carried by the decision, if any.
    #[must_use]
    pub const fn edits(&self) -> Option<&ToolCallEdits> {
        match self {
            Self::Edit(edits) => Some(edits),
            Self::Approve | Self::Reject => None,
        }
    }
}

/// A request by an actor to invoke a tool, pending or past human review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    id: ProposalId,
    workflow_id: WorkflowId,
    actor_id: ActorId,
    #[serde(flatten)]
    call: ToolCall,
    reason: String,
    status: ProposalStatus,
    final_tool_call: Option<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reviewer_id: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    edits: Option<ToolCallEdits>,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "reviewedAt", skip_serializing_if = "Option::is_none")]
    reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_id: Option<ExecutionId>,
}

impl Proposal {
    fn new(
        id: ProposalId,
        workflow_id: WorkflowId,
        actor_id: ActorId,
        call: ToolCall,
        reason: String,
    ) -> Self {
        Self {
            id,
            workflow_id,
            actor_id,
            call,
            reason,
            status: ProposalStatus::Pending,
            final_tool_call: None,
            reviewer_id: None,
            edits: None,
            created_at: Utc::now(),
            reviewed_at: None,
            execution_id: None,
        }
    }

    /// Returns the proposal identifier.
    #[must_use]
    pub fn id(&self) -> ProposalId {
        self.id
    }

    /// Workflow the proposal belongs to.
    #[must_use]
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Proposing actor.
    #[must_use]
    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    /// The call as originally proposed.
    #[must_use]
    pub fn tool_call(&self) -> &ToolCall {
        &self.call
    }

    /// Justification given by the proposer.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    /// The call that will be executed; present once approved.
    #[must_use]
    pub fn final_tool_call(&self) -> Option<&ToolCall> {
        self.final_tool_call.as_ref()
    }

    /// Reviewer who decided on the proposal.
    #[must_use]
    pub fn reviewer_id(&self) -> Option<ActorId> {
        self.reviewer_id
    }

    /// Edits applied at review time.
    #[must_use]
    pub fn edits(&self) -> Option<&ToolCallEdits> {
        self.edits.as_ref()
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Review time.
    #[must_use]
    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    /// Execution record, set once the proposal has been executed.
    #[must_use]
    pub fn execution_id(&self) -> Option<ExecutionId> {
        self.execution_id
    }

    /// Applies `event`, returning the resulting status.
    pub(crate) fn transition(&mut self, event: ProposalEvent) -> OrchestrationResult<ProposalStatus> {
        let Some(next) = self.status.next(event) else {
            return Err(OrchestrationError::invalid_state(
                self.id,
                format!("cannot {event} a {} proposal", self.status),
            ));
        };

        debug!(
            proposal_id = %self.id,
            from = %self.status,
            to = %next,
            %event,
            "proposal transition"
        );
        self.status = next;
        Ok(next)
    }

    pub(crate) fn record_execution(&mut self, execution_id: ExecutionId) -> OrchestrationResult<()> {
        self.transition(ProposalEvent::Execute)?;
        self.execution_id = Some(execution_id);
        Ok(())
    }
}

/// Result of a review decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewOutcome {
    /// Reviewed proposal.
    pub proposal_id: ProposalId,
    /// Status after the review.
    pub status: ProposalStatus,
    /// Call to execute; `None` after a rejection.
    pub final_tool_call: Option<ToolCall>,
}

/// Creates and reviews proposals against the shared [`Registry`].
#[derive(Debug, Clone)]
pub struct ProposalMachine {
    registry: Arc<Registry>,
}

impl ProposalMachine {
    /// Creates a machine bound to `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Records a new pending proposal.
    ///
    /// # Errors
    ///
    /// Checked in order: [`OrchestrationError::Validation`] for a blank tool or
    /// reason, [`OrchestrationError::NotFound`] for an unknown workflow,
    /// [`OrchestrationError::InvalidState`] when the workflow is not active, and
    /// [`OrchestrationError::NotFound`] for an unknown actor.
    pub fn propose(
        &self,
        workflow_id: WorkflowId,
        actor_id: ActorId,
        call: ToolCall,
        reason: impl Into<String>,
    ) -> OrchestrationResult<Proposal> {
        let reason = reason.into();
        require_non_blank("tool", &call.tool)?;
        require_non_blank("reason", &reason)?;

        self.registry.transact(|state| {
            let workflow = state.workflow(workflow_id)?;
            if workflow.status() != WorkflowStatus::Active {
                return Err(OrchestrationError::invalid_state(
                    workflow_id,
                    format!("workflow is {}", workflow.status()),
                ));
            }
            state.actor(actor_id)?;

            let proposal = Proposal::new(
                state.ids.proposals.next_id(),
                workflow_id,
                actor_id,
                call,
                reason,
            );
            state.audit.append(
                AuditDraft::new(AuditKind::ProposalCreated)
                    .workflow(workflow_id)
                    .actor(actor_id)
                    .detail("proposal_id", proposal.id.to_string())
                    .detail("tool", proposal.call.tool.clone())
                    .detail("params", proposal.call.params.clone())
                    .detail("reason", proposal.reason.clone()),
            );
            state.proposals.insert(proposal.id, proposal.clone());

            debug!(
                proposal_id = %proposal.id,
                workflow_id = %workflow_id,
                tool = %proposal.call.tool,
                "proposal created"
            );
            Ok(proposal)
        })
    }

    /// Applies a review decision to a pending proposal.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for an unknown proposal or
    /// reviewer, [`OrchestrationError::InvalidState`] when the proposal is no
    /// longer pending, and [`OrchestrationError::Validation`] when an edit
    /// overrides the tool with a blank name.
    pub fn review(
        &self,
        proposal_id: ProposalId,
        reviewer_id: ActorId,
        decision: ReviewDecision,
    ) -> OrchestrationResult<ReviewOutcome> {
        self.registry.transact(|state| {
            let proposal = state.proposal(proposal_id)?;
            if proposal.status.next(decision.event()).is_none() {
                return Err(OrchestrationError::invalid_state(
                    proposal_id,
                    format!("proposal is already {}", proposal.status),
                ));
            }
            state.actor(reviewer_id)?;
            if let Some(tool) = decision.edits().and_then(|edits| edits.tool.as_deref()) {
                require_non_blank("edits.tool", tool)?;
            }

            let proposal = state.proposal_mut(proposal_id)?;
            let status = proposal.transition(decision.event())?;
            proposal.final_tool_call = match &decision {
                ReviewDecision::Approve => Some(proposal.call.clone()),
                ReviewDecision::Edit(edits) => Some(proposal.call.with_edits(edits)),
                ReviewDecision::Reject => None,
            };
            proposal.reviewer_id = Some(reviewer_id);
            proposal.edits = decision.edits().cloned();
            proposal.reviewed_at = Some(Utc::now());

            let outcome = ReviewOutcome {
                proposal_id,
                status,
                final_tool_call: proposal.final_tool_call.clone(),
            };
            let workflow_id = proposal.workflow_id;

            state.audit.append(
                AuditDraft::new(AuditKind::ProposalReviewed)
                    .workflow(workflow_id)
                    .actor(reviewer_id)
                    .detail("proposal_id", proposal_id.to_string())
                    .detail("decision", decision.event().to_string())
                    .detail("edits", to_detail(decision.edits()))
                    .detail("final_tool_call", to_detail(outcome.final_tool_call.as_ref())),
            );
            Ok(outcome)
        })
    }
}

fn to_detail<T: Serialize>(value: Option<&T>) -> Value {
    value
        .and_then(|value| serde_json::to_value(value).ok())
        .unwrap_or(Value::Null)
}
