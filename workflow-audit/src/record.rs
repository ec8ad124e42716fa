//! Audit entry types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use workflow_primitives::{ActorId, AuditEntryId, WorkflowId};

/// Kind of state-changing operation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// An actor was registered.
    ActorRegistered,
    /// A workflow was started.
    WorkflowStarted,
    /// A proposal entered the pending state.
    ProposalCreated,
    /// A reviewer decided on a proposal.
    ProposalReviewed,
    /// An approved proposal was executed (or simulated).
    ActionExecuted,
    /// A batch of unreviewed calls was fanned out.
    ParallelExecuted,
    /// The dispatch policy was updated.
    PolicyChanged,
}

impl AuditKind {
    /// Returns the wire label of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActorRegistered => "actor_registered",
            Self::WorkflowStarted => "workflow_started",
            Self::ProposalCreated => "proposal_created",
            Self::ProposalReviewed => "proposal_reviewed",
            Self::ActionExecuted => "action_executed",
            Self::ParallelExecuted => "parallel_executed",
            Self::PolicyChanged => "policy_changed",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    id: AuditEntryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workflow_id: Option<WorkflowId>,
    #[serde(rename = "type")]
    kind: AuditKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    actor_id: Option<ActorId>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    details: Map<String, Value>,
}

impl AuditEntry {
    pub(crate) fn from_draft(id: AuditEntryId, timestamp: DateTime<Utc>, draft: AuditDraft) -> Self {
        Self {
            id,
            workflow_id: draft.workflow_id,
            kind: draft.kind,
            actor_id: draft.actor_id,
            timestamp,
            details: draft.details,
        }
    }

    /// Returns the entry identifier.
    #[must_use]
    pub fn id(&self) -> AuditEntryId {
        self.id
    }

    /// Workflow the entry belongs to, if it is workflow-scoped.
    #[must_use]
    pub fn workflow_id(&self) -> Option<WorkflowId> {
        self.workflow_id
    }

    /// Kind of operation recorded.
    #[must_use]
    pub fn kind(&self) -> AuditKind {
        self.kind
    }

    /// Actor that performed the operation, when one is known.
    #[must_use]
    pub fn actor_id(&self) -> Option<ActorId> {
        self.actor_id
    }

    /// Time the entry was appended.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Operation-specific details.
    #[must_use]
    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    /// Returns a single detail value.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}

/// Entry contents prior to id and timestamp assignment.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    kind: AuditKind,
    workflow_id: Option<WorkflowId>,
    actor_id: Option<ActorId>,
    details: Map<String, Value>,
}

impl AuditDraft {
    /// Starts a draft of the given kind.
    #[must_use]
    pub fn new(kind: AuditKind) -> Self {
        Self {
            kind,
            workflow_id: None,
            actor_id: None,
            details: Map::new(),
        }
    }

    /// Scopes the entry to a workflow.
    #[must_use]
    pub fn workflow(mut self, workflow_id: WorkflowId) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    /// Attributes the entry to an actor.
    #[must_use]
    pub fn actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Adds a detail value.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns the kind of the draft.
    #[must_use]
    pub fn kind(&self) -> AuditKind {
        self.kind
    }
}
