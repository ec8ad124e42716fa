//! Parallel fan-out of unreviewed tool calls.
//!
//! Batches bypass the proposal pipeline entirely; they are meant for low-risk
//! side actions such as notifications.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use workflow_audit::{AuditDraft, AuditKind};
use workflow_policy::PolicyStore;
use workflow_primitives::{ParallelExecutionId, ToolCall};
use workflow_tools::ToolExecutor;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::execution::{ExecutionOutcome, aborted, invoke};
use crate::registry::Registry;
use crate::scheduler::{SchedulerError, TaskScheduler};

/// Outcome of one call in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallResult {
    tool: String,
    #[serde(flatten)]
    outcome: ExecutionOutcome,
}

impl CallResult {
    /// Tool the slot belongs to.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Outcome of the call.
    #[must_use]
    pub fn outcome(&self) -> &ExecutionOutcome {
        &self.outcome
    }
}

/// Record of one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelExecution {
    id: ParallelExecutionId,
    calls: Vec<ToolCall>,
    results: Vec<CallResult>,
    #[serde(rename = "dryRun")]
    dry_run: bool,
    #[serde(rename = "executedAt")]
    executed_at: DateTime<Utc>,
}

impl ParallelExecution {
    /// Returns the batch identifier.
    #[must_use]
    pub fn id(&self) -> ParallelExecutionId {
        self.id
    }

    /// Submitted calls, in submission order.
    #[must_use]
    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    /// Results; slot `k` belongs to call `k`.
    #[must_use]
    pub fn results(&self) -> &[CallResult] {
        &self.results
    }

    /// Whether the batch was simulated.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Completion time.
    #[must_use]
    pub fn executed_at(&self) -> DateTime<Utc> {
        self.executed_at
    }

    /// Number of slots whose call failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|slot| slot.outcome.error().is_some())
            .count()
    }
}

/// Fans batches out over a bounded [`TaskScheduler`].
pub struct ParallelCoordinator {
    registry: Arc<Registry>,
    policy: Arc<PolicyStore>,
    executor: Arc<dyn ToolExecutor>,
    scheduler: TaskScheduler,
    call_timeout: Option<Duration>,
}

impl std::fmt::Debug for ParallelCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelCoordinator")
            .field("scheduler", &self.scheduler)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ParallelCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        policy: Arc<PolicyStore>,
        executor: Arc<dyn ToolExecutor>,
        scheduler: TaskScheduler,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            policy,
            executor,
            scheduler,
            call_timeout,
        }
    }

    /// Scheduler used for fan-out.
    #[must_use]
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Executes every call concurrently and returns index-aligned results.
    ///
    /// The policy is read once; a dry-run batch never touches the executor.
    /// The fan-out and the commit of the batch record run on their own task, so
    /// dropping the returned future still leaves the batch recorded and audited.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Validation`] for an empty batch or a call
    /// with a blank tool name. Individual call failures are reported in their
    /// slot instead.
    pub async fn execute(&self, calls: Vec<ToolCall>) -> OrchestrationResult<ParallelExecution> {
        if calls.is_empty() {
            return Err(OrchestrationError::validation("calls", "batch must not be empty"));
        }
        if let Some(index) = calls.iter().position(|call| call.tool.trim().is_empty()) {
            return Err(OrchestrationError::validation(
                "calls",
                format!("call {index} has a blank tool name"),
            ));
        }

        let dry_run = self.policy.current().dispatch_mode().is_dry_run();
        let registry = Arc::clone(&self.registry);
        let executor = Arc::clone(&self.executor);
        let scheduler = self.scheduler.clone();
        let call_timeout = self.call_timeout;

        let task = tokio::spawn(async move {
            let results = if dry_run {
                simulate(&calls)
            } else {
                fan_out(&scheduler, &executor, &calls, call_timeout).await
            };
            commit(&registry, calls, results, dry_run)
        });

        task.await.map_err(|err| {
            let err = SchedulerError::from(err);
            warn!(error = %err, "parallel batch task lost");
            OrchestrationError::invalid_state("parallel batch", format!("batch did not complete: {err}"))
        })
    }
}

fn simulate(calls: &[ToolCall]) -> Vec<CallResult> {
    calls
        .iter()
        .map(|call| CallResult {
            tool: call.tool.clone(),
            outcome: ExecutionOutcome::Simulated {
                would_execute: call.clone(),
            },
        })
        .collect()
}

async fn fan_out(
    scheduler: &TaskScheduler,
    executor: &Arc<dyn ToolExecutor>,
    calls: &[ToolCall],
    call_timeout: Option<Duration>,
) -> Vec<CallResult> {
    let slots = scheduler
        .run_all(
            calls
                .iter()
                .map(|call| invoke(Arc::clone(executor), call.clone(), call_timeout)),
        )
        .await;

    calls
        .iter()
        .zip(slots)
        .map(|(call, slot)| CallResult {
            tool: call.tool.clone(),
            outcome: slot.unwrap_or_else(|err| aborted(&call.tool, &err)),
        })
        .collect()
}

fn commit(
    registry: &Registry,
    calls: Vec<ToolCall>,
    results: Vec<CallResult>,
    dry_run: bool,
) -> ParallelExecution {
    let batch = registry.transact(|state| {
        let batch = ParallelExecution {
            id: state.ids.parallel.next_id(),
            calls,
            results,
            dry_run,
            executed_at: Utc::now(),
        };
        state.audit.append(
            AuditDraft::new(AuditKind::ParallelExecuted)
                .detail("parallel_execution_id", batch.id.to_string())
                .detail("call_count", batch.calls.len())
                .detail("failed", batch.failed())
                .detail("dry_run", dry_run),
        );
        state.parallel.insert(batch.id, batch.clone());
        batch
    });

    info!(
        parallel_execution_id = %batch.id,
        calls = batch.calls.len(),
        failed = batch.failed(),
        dry_run,
        "parallel batch executed"
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use workflow_policy::{Policy, PolicyUpdate};
    use workflow_primitives::Params;
    use workflow_tools::{ToolError, ToolResult};

    use crate::scheduler::SchedulerConfig;

    struct Delayed;

    #[async_trait]
    impl ToolExecutor for Delayed {
        async fn execute(&self, tool: &str, params: Params) -> ToolResult<Value> {
            let delay = params.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            match tool {
                "fail" => Err(ToolError::execution("unreachable host")),
                "panic" => panic!("executor exploded"),
                _ => Ok(json!({ "tool": tool })),
            }
        }
    }

    fn coordinator(dry_run: bool) -> (ParallelCoordinator, Arc<Registry>, Arc<PolicyStore>) {
        let registry = Arc::new(Registry::new());
        let policy = Arc::new(PolicyStore::new(Policy::new(dry_run)));
        let coordinator = ParallelCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&policy),
            Arc::new(Delayed),
            TaskScheduler::new(SchedulerConfig::new(NonZeroUsize::new(8).unwrap())),
            Some(Duration::from_secs(5)),
        );
        (coordinator, registry, policy)
    }

    fn call(tool: &str, delay_ms: u64) -> ToolCall {
        ToolCall::new(tool, json!({ "delay_ms": delay_ms }).as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn results_follow_submission_order() {
        let (coordinator, _, _) = coordinator(false);
        let batch = coordinator
            .execute(vec![call("a", 40), call("b", 20), call("c", 0)])
            .await
            .unwrap();

        let tools: Vec<_> = batch.results().iter().map(CallResult::tool).collect();
        assert_eq!(tools, ["a", "b", "c"]);
        assert!(batch.results().iter().all(|slot| slot.outcome().is_success()));
        assert_eq!(batch.id().to_string(), "parallel_1");
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_siblings() {
        let (coordinator, registry, _) = coordinator(false);
        let batch = coordinator
            .execute(vec![call("a", 0), call("fail", 0), call("panic", 0), call("d", 0)])
            .await
            .unwrap();

        assert!(batch.results()[0].outcome().is_success());
        assert_eq!(
            batch.results()[1].outcome().error(),
            Some("tool execution failed: unreachable host")
        );
        assert!(batch.results()[2].outcome().error().unwrap().contains("aborted"));
        assert!(batch.results()[3].outcome().is_success());
        assert_eq!(batch.failed(), 2);

        let entries = registry.audit_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind(), AuditKind::ParallelExecuted);
        assert_eq!(entries[0].workflow_id(), None);
        assert_eq!(entries[0].detail("failed"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn calls_run_concurrently() {
        let (coordinator, _, _) = coordinator(false);
        let started = std::time::Instant::now();
        coordinator
            .execute((0..4).map(|_| call("wait", 100)).collect())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn dry_run_simulates_every_slot() {
        let (coordinator, _, policy) = coordinator(false);
        policy.apply(&PolicyUpdate::dry_run(true));

        let batch = coordinator.execute(vec![call("panic", 0)]).await.unwrap();
        assert!(batch.dry_run());
        let value = serde_json::to_value(&batch.results()[0]).unwrap();
        assert_eq!(value["tool"], "panic");
        assert_eq!(value["simulated"], true);
        assert_eq!(value["wouldExecute"]["tool"], "panic");
    }

    #[tokio::test]
    async fn invalid_batches_are_rejected_without_audit() {
        let (coordinator, registry, _) = coordinator(true);

        let err = coordinator.execute(Vec::new()).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation { field: "calls", .. }));

        let err = coordinator
            .execute(vec![call("a", 0), ToolCall::new("", Params::new())])
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation { field: "calls", .. }));
        assert!(registry.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn abandoned_batch_is_still_recorded() {
        let (coordinator, registry, _) = coordinator(false);

        let attempt = coordinator.execute(vec![call("a", 40), call("b", 40)]);
        let abandoned = tokio::time::timeout(Duration::from_millis(10), attempt).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let entries = registry.audit_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind(), AuditKind::ParallelExecuted);
        assert_eq!(entries[0].detail("call_count"), Some(&json!(2)));
        assert_eq!(entries[0].detail("failed"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn closed_scheduler_fails_each_slot() {
        let (coordinator, _, _) = coordinator(false);
        coordinator.scheduler().close();

        let batch = coordinator.execute(vec![call("a", 0), call("b", 0)]).await.unwrap();
        assert_eq!(batch.failed(), 2);
        assert!(batch.results()[0].outcome().error().unwrap().contains("scheduler closed"));
    }
}
