//! Facade wiring the registry, proposal machine, engines and policy together.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use workflow_audit::{AuditDraft, AuditEntry, AuditKind, AuditLog, AuditSink};
use workflow_config::OrchestratorConfig;
use workflow_policy::{Policy, PolicyStore, PolicyUpdate};
use workflow_primitives::{ActorId, Params, ProposalId, ToolCall, WorkflowId};
use workflow_tools::ToolExecutor;

use crate::error::OrchestrationResult;
use crate::execution::{Execution, ExecutionEngine};
use crate::parallel::{ParallelCoordinator, ParallelExecution};
use crate::proposal::{Proposal, ProposalMachine, ReviewDecision, ReviewOutcome};
use crate::registry::{Actor, Registry, Workflow};
use crate::scheduler::{SchedulerConfig, TaskScheduler};

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    executor: Arc<dyn ToolExecutor>,
    config: OrchestratorConfig,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl OrchestratorBuilder {
    /// Applies a configuration (initial policy, timeout and fan-out limit).
    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Mirrors every audit entry to `sink`.
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Builds the orchestrator.
    #[must_use]
    pub fn build(self) -> Orchestrator {
        let audit = self
            .sinks
            .into_iter()
            .fold(AuditLog::new(), AuditLog::with_sink);
        let registry = Arc::new(Registry::with_audit_log(audit));
        let policy = Arc::new(PolicyStore::new(Policy::new(self.config.dry_run)));
        let timeout = self.config.call_timeout();
        let scheduler = TaskScheduler::new(SchedulerConfig::new(self.config.max_parallelism()));

        info!(
            dry_run = self.config.dry_run,
            call_timeout_ms = ?self.config.call_timeout_ms,
            max_parallelism = self.config.max_parallelism,
            "orchestrator ready"
        );

        Orchestrator {
            proposals: ProposalMachine::new(Arc::clone(&registry)),
            engine: ExecutionEngine::new(
                Arc::clone(&registry),
                Arc::clone(&policy),
                Arc::clone(&self.executor),
                timeout,
            ),
            coordinator: ParallelCoordinator::new(
                Arc::clone(&registry),
                Arc::clone(&policy),
                self.executor,
                scheduler,
                timeout,
            ),
            registry,
            policy,
            config: self.config,
        }
    }
}

/// Entry point for every orchestration operation.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
#[derive(Debug)]
pub struct Orchestrator {
    registry: Arc<Registry>,
    policy: Arc<PolicyStore>,
    proposals: ProposalMachine,
    engine: ExecutionEngine,
    coordinator: ParallelCoordinator,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator with default configuration.
    #[must_use]
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self::builder(executor).build()
    }

    /// Starts a builder around `executor`.
    #[must_use]
    pub fn builder(executor: Arc<dyn ToolExecutor>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            executor,
            config: OrchestratorConfig::default(),
            sinks: Vec::new(),
        }
    }

    /// Configuration the orchestrator was built with.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Underlying entity registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers an actor.
    pub fn register_actor(&self, name: impl Into<String>, role: impl Into<String>) -> Actor {
        self.registry.register_actor(name, role)
    }

    /// Starts an active workflow.
    pub fn start_workflow(&self, title: impl Into<String>) -> Workflow {
        self.registry.start_workflow(title)
    }

    /// Proposes a tool call for review.
    ///
    /// # Errors
    ///
    /// See [`ProposalMachine::propose`].
    pub fn propose_action(
        &self,
        workflow_id: WorkflowId,
        actor_id: ActorId,
        tool: impl Into<String>,
        params: Params,
        reason: impl Into<String>,
    ) -> OrchestrationResult<Proposal> {
        self.proposals
            .propose(workflow_id, actor_id, ToolCall::new(tool, params), reason)
    }

    /// Records a review decision.
    ///
    /// # Errors
    ///
    /// See [`ProposalMachine::review`].
    pub fn review_action(
        &self,
        proposal_id: ProposalId,
        reviewer_id: ActorId,
        decision: ReviewDecision,
    ) -> OrchestrationResult<ReviewOutcome> {
        self.proposals.review(proposal_id, reviewer_id, decision)
    }

    /// Executes an approved proposal.
    ///
    /// # Errors
    ///
    /// See [`ExecutionEngine::execute`].
    pub async fn execute_action(&self, proposal_id: ProposalId) -> OrchestrationResult<Execution> {
        self.engine.execute(proposal_id).await
    }

    /// Fans out a batch of unreviewed calls.
    ///
    /// # Errors
    ///
    /// See [`ParallelCoordinator::execute`].
    pub async fn execute_parallel(
        &self,
        calls: Vec<ToolCall>,
    ) -> OrchestrationResult<ParallelExecution> {
        self.coordinator.execute(calls).await
    }

    /// Audit entries of one workflow, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::OrchestrationError::NotFound`] for unknown workflows.
    pub fn get_audit_log(&self, workflow_id: WorkflowId) -> OrchestrationResult<Vec<AuditEntry>> {
        self.registry.audit_log(workflow_id)
    }

    /// Applies a partial policy update and returns the resulting policy.
    pub fn set_policy(&self, update: PolicyUpdate) -> Policy {
        self.registry.transact(|state| {
            let policy = self.policy.apply(&update);
            state.audit.append(
                AuditDraft::new(AuditKind::PolicyChanged)
                    .detail("update", to_value(&update))
                    .detail("policy", to_value(&policy)),
            );
            info!(dry_run = policy.dry_run, "policy changed");
            policy
        })
    }

    /// Current policy.
    #[must_use]
    pub fn get_policy(&self) -> Policy {
        self.policy.current()
    }

    /// Looks up a proposal.
    ///
    /// # Errors
    ///
    /// Returns [`crate::OrchestrationError::NotFound`] for unknown ids.
    pub fn get_proposal(&self, proposal_id: ProposalId) -> OrchestrationResult<Proposal> {
        self.registry.proposal(proposal_id)
    }

    /// Proposals of one workflow, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::OrchestrationError::NotFound`] for unknown workflows.
    pub fn list_proposals(&self, workflow_id: WorkflowId) -> OrchestrationResult<Vec<Proposal>> {
        self.registry.proposals_for(workflow_id)
    }

    /// Stops accepting parallel work. Batches submitted afterwards report every
    /// slot as failed.
    pub fn shutdown(&self) {
        self.coordinator.scheduler().close();
        info!("orchestrator shut down");
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use workflow_tools::ToolResult;

    struct Nop;

    #[async_trait]
    impl ToolExecutor for Nop {
        async fn execute(&self, _tool: &str, _params: Params) -> ToolResult<Value> {
            Ok(Value::Null)
        }
    }

    #[derive(Default)]
    struct Capture {
        kinds: Mutex<Vec<AuditKind>>,
    }

    impl AuditSink for Capture {
        fn record(&self, entry: &AuditEntry) {
            self.kinds.lock().unwrap().push(entry.kind());
        }
    }

    #[test]
    fn config_seeds_policy() {
        let config = OrchestratorConfig {
            dry_run: true,
            ..OrchestratorConfig::default()
        };
        let orchestrator = Orchestrator::builder(Arc::new(Nop)).config(config).build();
        assert!(orchestrator.get_policy().dry_run);
    }

    #[test]
    fn set_policy_is_partial_and_audited() {
        let capture = Arc::new(Capture::default());
        let orchestrator = Orchestrator::builder(Arc::new(Nop))
            .audit_sink(capture.clone())
            .build();

        let policy = orchestrator.set_policy(PolicyUpdate::dry_run(true));
        assert!(policy.dry_run);
        let policy = orchestrator.set_policy(PolicyUpdate::default());
        assert!(policy.dry_run);
        assert!(orchestrator.get_policy().dry_run);

        let entries = orchestrator.registry().audit_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind(), AuditKind::PolicyChanged);
        assert_eq!(entries[0].detail("update"), Some(&json!({ "dry_run": true })));
        assert_eq!(entries[1].detail("policy"), Some(&json!({ "dry_run": true })));
        assert_eq!(capture.kinds.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_fails_later_batches() {
        let orchestrator = Orchestrator::new(Arc::new(Nop));
        orchestrator.shutdown();

        let batch = orchestrator
            .execute_parallel(vec![ToolCall::new("notify", Params::new())])
            .await
            .unwrap();
        assert_eq!(batch.failed(), 1);
    }
}
