//! Entity registry shared by every orchestration component.
//!
//! All mutable state (entities, id sequences, the in-flight execution set and
//! the audit log) sits behind a single mutex. A state change and its audit entry
//! are therefore always committed together, and no lock is ever held across an
//! `.await`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use workflow_audit::{AuditDraft, AuditEntry, AuditKind, AuditLog};
use workflow_primitives::{
    ActorId, ExecutionId, ParallelExecutionId, ProposalId, Sequence, WorkflowId,
};

use crate::error::{EntityKind, OrchestrationError, OrchestrationResult};
use crate::execution::Execution;
use crate::parallel::ParallelExecution;
use crate::proposal::Proposal;

/// A registered participant, either an agent or a human reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    id: ActorId,
    name: String,
    role: String,
}

impl Actor {
    /// Returns the actor identifier.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form role label such as `agent` or `reviewer`.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }
}

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Accepting proposals.
    Active,
    /// Finished successfully.
    Completed,
    /// Abandoned.
    Cancelled,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Named container grouping related proposals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workflow {
    id: WorkflowId,
    title: String,
    status: WorkflowStatus,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

impl Workflow {
    /// Returns the workflow identifier.
    #[must_use]
    pub fn id(&self) -> WorkflowId {
        self.id
    }

    /// Human-readable title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[cfg(test)]
    pub(crate) fn set_status(&mut self, status: WorkflowStatus) {
        self.status = status;
    }
}

/// Per-kind identifier sequences.
#[derive(Debug, Default)]
pub(crate) struct IdSequences {
    pub(crate) actors: Sequence,
    pub(crate) workflows: Sequence,
    pub(crate) proposals: Sequence,
    pub(crate) executions: Sequence,
    pub(crate) parallel: Sequence,
}

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    pub(crate) ids: IdSequences,
    pub(crate) actors: BTreeMap<ActorId, Actor>,
    pub(crate) workflows: BTreeMap<WorkflowId, Workflow>,
    pub(crate) proposals: BTreeMap<ProposalId, Proposal>,
    pub(crate) executions: BTreeMap<ExecutionId, Execution>,
    pub(crate) parallel: BTreeMap<ParallelExecutionId, ParallelExecution>,
    pub(crate) in_flight: BTreeSet<ProposalId>,
    pub(crate) audit: AuditLog,
}

impl RegistryState {
    pub(crate) fn actor(&self, id: ActorId) -> OrchestrationResult<&Actor> {
        self.actors
            .get(&id)
            .ok_or_else(|| OrchestrationError::not_found(EntityKind::Actor, id))
    }

    pub(crate) fn workflow(&self, id: WorkflowId) -> OrchestrationResult<&Workflow> {
        self.workflows
            .get(&id)
            .ok_or_else(|| OrchestrationError::not_found(EntityKind::Workflow, id))
    }

    pub(crate) fn proposal(&self, id: ProposalId) -> OrchestrationResult<&Proposal> {
        self.proposals
            .get(&id)
            .ok_or_else(|| OrchestrationError::not_found(EntityKind::Proposal, id))
    }

    pub(crate) fn proposal_mut(&mut self, id: ProposalId) -> OrchestrationResult<&mut Proposal> {
        self.proposals
            .get_mut(&id)
            .ok_or_else(|| OrchestrationError::not_found(EntityKind::Proposal, id))
    }
}

/// Owner of every entity and of the audit log.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Creates an empty registry with an in-memory audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that appends to `audit` (which may carry sinks).
    #[must_use]
    pub fn with_audit_log(audit: AuditLog) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                audit,
                ..RegistryState::default()
            }),
        }
    }

    /// Runs `f` with exclusive access to the state.
    pub(crate) fn transact<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Registers an actor. Name and role are free-form and may repeat.
    pub fn register_actor(&self, name: impl Into<String>, role: impl Into<String>) -> Actor {
        let actor = self.transact(|state| {
            let actor = Actor {
                id: state.ids.actors.next_id(),
                name: name.into(),
                role: role.into(),
            };
            state.audit.append(
                AuditDraft::new(AuditKind::ActorRegistered)
                    .actor(actor.id)
                    .detail("name", actor.name.clone())
                    .detail("role", actor.role.clone()),
            );
            state.actors.insert(actor.id, actor.clone());
            actor
        });

        info!(actor_id = %actor.id, role = %actor.role, "actor registered");
        actor
    }

    /// Starts a new workflow in the [`WorkflowStatus::Active`] state.
    pub fn start_workflow(&self, title: impl Into<String>) -> Workflow {
        let workflow = self.transact(|state| {
            let workflow = Workflow {
                id: state.ids.workflows.next_id(),
                title: title.into(),
                status: WorkflowStatus::Active,
                created_at: Utc::now(),
            };
            state.audit.append(
                AuditDraft::new(AuditKind::WorkflowStarted)
                    .detail("workflow_id", workflow.id.to_string())
                    .detail("title", workflow.title.clone()),
            );
            state.workflows.insert(workflow.id, workflow.clone());
            workflow
        });

        info!(workflow_id = %workflow.id, "workflow started");
        workflow
    }

    /// Looks up an actor.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for unknown ids.
    pub fn actor(&self, id: ActorId) -> OrchestrationResult<Actor> {
        self.transact(|state| state.actor(id).cloned())
    }

    /// Looks up a workflow.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for unknown ids.
    pub fn workflow(&self, id: WorkflowId) -> OrchestrationResult<Workflow> {
        self.transact(|state| state.workflow(id).cloned())
    }

    /// Looks up a proposal.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for unknown ids.
    pub fn proposal(&self, id: ProposalId) -> OrchestrationResult<Proposal> {
        self.transact(|state| state.proposal(id).cloned())
    }

    /// Looks up an execution record.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for unknown ids.
    pub fn execution(&self, id: ExecutionId) -> OrchestrationResult<Execution> {
        self.transact(|state| {
            state
                .executions
                .get(&id)
                .cloned()
                .ok_or_else(|| OrchestrationError::not_found(EntityKind::Execution, id))
        })
    }

    /// Looks up a parallel execution record.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for unknown ids.
    pub fn parallel_execution(&self, id: ParallelExecutionId) -> OrchestrationResult<ParallelExecution> {
        self.transact(|state| {
            state
                .parallel
                .get(&id)
                .cloned()
                .ok_or_else(|| OrchestrationError::not_found(EntityKind::ParallelExecution, id))
        })
    }

    /// All actors in registration order.
    #[must_use]
    pub fn actors(&self) -> Vec<Actor> {
        self.transact(|state| state.actors.values().cloned().collect())
    }

    /// All workflows in creation order.
    #[must_use]
    pub fn workflows(&self) -> Vec<Workflow> {
        self.transact(|state| state.workflows.values().cloned().collect())
    }

    /// Proposals belonging to `workflow_id`, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for unknown workflows.
    pub fn proposals_for(&self, workflow_id: WorkflowId) -> OrchestrationResult<Vec<Proposal>> {
        self.transact(|state| {
            state.workflow(workflow_id)?;
            Ok(state
                .proposals
                .values()
                .filter(|proposal| proposal.workflow_id() == workflow_id)
                .cloned()
                .collect())
        })
    }

    /// Audit entries scoped to `workflow_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for unknown workflows.
    pub fn audit_log(&self, workflow_id: WorkflowId) -> OrchestrationResult<Vec<AuditEntry>> {
        self.transact(|state| {
            state.workflow(workflow_id)?;
            Ok(state.audit.for_workflow(workflow_id).cloned().collect())
        })
    }

    /// Every audit entry, including workflow-agnostic ones, oldest first.
    #[must_use]
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.transact(|state| state.audit.entries().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_primitives::EntityId;

    #[test]
    fn actors_receive_sequential_ids() {
        let registry = Registry::new();
        let agent = registry.register_actor("planner", "agent");
        let reviewer = registry.register_actor("alice", "reviewer");

        assert_eq!(agent.id().to_string(), "actor_1");
        assert_eq!(reviewer.id().to_string(), "actor_2");
        assert_eq!(registry.actors().len(), 2);
        assert_eq!(registry.actor(reviewer.id()).unwrap().role(), "reviewer");
    }

    #[test]
    fn duplicate_names_are_distinct_actors() {
        let registry = Registry::new();
        let first = registry.register_actor("bot", "agent");
        let second = registry.register_actor("bot", "agent");
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn registration_is_audited_without_workflow_scope() {
        let registry = Registry::new();
        let actor = registry.register_actor("alice", "reviewer");

        let entries = registry.audit_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind(), AuditKind::ActorRegistered);
        assert_eq!(entries[0].actor_id(), Some(actor.id()));
        assert_eq!(entries[0].detail("role"), Some(&serde_json::json!("reviewer")));
    }

    #[test]
    fn workflows_start_active_and_are_audited_globally() {
        let registry = Registry::new();
        let workflow = registry.start_workflow("Deploy");

        assert_eq!(workflow.status(), WorkflowStatus::Active);
        assert_eq!(workflow.id().to_string(), "workflow_1");

        let entries = registry.audit_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind(), AuditKind::WorkflowStarted);
        assert_eq!(entries[0].workflow_id(), None);
        assert!(registry.audit_log(workflow.id()).unwrap().is_empty());
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let registry = Registry::new();
        let err = registry.workflow(WorkflowId::from_raw(9)).unwrap_err();
        assert_eq!(err, OrchestrationError::not_found(EntityKind::Workflow, "workflow_9"));
        assert!(registry.audit_log(WorkflowId::from_raw(9)).is_err());
        assert!(registry.proposals_for(WorkflowId::from_raw(9)).is_err());
        assert!(registry.proposal(ProposalId::from_raw(1)).is_err());
        assert!(registry.execution(ExecutionId::from_raw(1)).is_err());
    }

    #[test]
    fn serialized_workflow_uses_wire_names() {
        let registry = Registry::new();
        let workflow = registry.start_workflow("Deploy");
        let value = serde_json::to_value(&workflow).unwrap();
        assert_eq!(value["id"], "workflow_1");
        assert_eq!(value["status"], "active");
        assert!(value.get("createdAt").is_some());
    }
}
