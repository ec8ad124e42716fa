//! Execution of approved proposals.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use workflow_audit::{AuditDraft, AuditKind};
use workflow_policy::PolicyStore;
use workflow_primitives::{ExecutionId, ProposalId, ToolCall, WorkflowId};
use workflow_tools::ToolExecutor;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::proposal::ProposalEvent;
use crate::registry::Registry;
use crate::scheduler::SchedulerError;

/// Result payload of one tool call.
///
/// Executor failures are data, not errors: a failed or timed-out call still
/// produces an outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Dry-run; the executor was not invoked.
    Simulated {
        /// Call that would have been dispatched.
        would_execute: ToolCall,
    },
    /// The executor returned a value.
    Succeeded {
        /// Executor output.
        output: Value,
    },
    /// The executor failed, timed out or panicked.
    Failed {
        /// Failure description.
        error: String,
    },
}

impl ExecutionOutcome {
    /// Returns `true` when the executor returned a value.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Returns `true` for dry-run outcomes.
    #[must_use]
    pub const fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated { .. })
    }

    /// Failure description, if the call failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error.as_str()),
            _ => None,
        }
    }

    /// Executor output, if the call succeeded.
    #[must_use]
    pub const fn output(&self) -> Option<&Value> {
        match self {
            Self::Succeeded { output } => Some(output),
            _ => None,
        }
    }
}

impl Serialize for ExecutionOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            Self::Simulated { would_execute } => {
                map.serialize_entry("simulated", &true)?;
                map.serialize_entry("wouldExecute", would_execute)?;
            }
            Self::Succeeded { output } => {
                map.serialize_entry("success", &true)?;
                map.serialize_entry("output", output)?;
            }
            Self::Failed { error } => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}

/// Record of an executed proposal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    id: ExecutionId,
    proposal_id: ProposalId,
    tool_call: ToolCall,
    result: ExecutionOutcome,
    #[serde(rename = "dryRun")]
    dry_run: bool,
    #[serde(rename = "executedAt")]
    executed_at: DateTime<Utc>,
}

impl Execution {
    /// Returns the execution identifier.
    #[must_use]
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Proposal that was executed.
    #[must_use]
    pub fn proposal_id(&self) -> ProposalId {
        self.proposal_id
    }

    /// Call that was dispatched (or simulated).
    #[must_use]
    pub fn tool_call(&self) -> &ToolCall {
        &self.tool_call
    }

    /// Outcome of the call.
    #[must_use]
    pub fn result(&self) -> &ExecutionOutcome {
        &self.result
    }

    /// Whether the call was simulated.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Completion time.
    #[must_use]
    pub fn executed_at(&self) -> DateTime<Utc> {
        self.executed_at
    }
}

/// Invokes `call` on `executor`, folding failures and timeouts into the outcome.
pub(crate) async fn invoke(
    executor: Arc<dyn ToolExecutor>,
    call: ToolCall,
    timeout: Option<Duration>,
) -> ExecutionOutcome {
    let ToolCall { tool, params } = call;
    let pending = executor.execute(&tool, params);

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, pending).await {
            Ok(result) => result,
            Err(_) => {
                let millis = limit.as_millis();
                warn!(%tool, timeout_ms = %millis, "tool call timed out");
                return ExecutionOutcome::Failed {
                    error: format!("tool `{tool}` timed out after {millis} ms"),
                };
            }
        },
        None => pending.await,
    };

    match result {
        Ok(output) => ExecutionOutcome::Succeeded { output },
        Err(err) => {
            warn!(%tool, error = %err, "tool call failed");
            ExecutionOutcome::Failed {
                error: err.to_string(),
            }
        }
    }
}

/// Runs [`invoke`] on its own task so a panicking executor only fails this call.
pub(crate) async fn invoke_isolated(
    executor: Arc<dyn ToolExecutor>,
    call: ToolCall,
    timeout: Option<Duration>,
) -> ExecutionOutcome {
    let tool = call.tool.clone();
    match tokio::spawn(invoke(executor, call, timeout)).await {
        Ok(outcome) => outcome,
        Err(err) => aborted(&tool, &SchedulerError::from(err)),
    }
}

pub(crate) fn aborted(tool: &str, err: &dyn fmt::Display) -> ExecutionOutcome {
    warn!(%tool, error = %err, "tool call aborted");
    ExecutionOutcome::Failed {
        error: format!("tool `{tool}` aborted: {err}"),
    }
}

/// A proposal's claimed in-flight slot and the call it will dispatch.
struct Reservation {
    proposal_id: ProposalId,
    workflow_id: WorkflowId,
    call: ToolCall,
}

/// Dispatches approved proposals under the current policy.
pub struct ExecutionEngine {
    registry: Arc<Registry>,
    policy: Arc<PolicyStore>,
    executor: Arc<dyn ToolExecutor>,
    call_timeout: Option<Duration>,
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        policy: Arc<PolicyStore>,
        executor: Arc<dyn ToolExecutor>,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            policy,
            executor,
            call_timeout,
        }
    }

    /// Executes an approved proposal exactly once.
    ///
    /// Once the proposal is reserved, dispatch and the commit of the
    /// [`Execution`] run on a detached task: dropping the returned future does
    /// not cancel the call, and the record and audit entry still land.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for unknown proposals,
    /// [`OrchestrationError::AlreadyExecuted`] when the proposal was executed or
    /// is currently executing, and [`OrchestrationError::InvalidState`] when it
    /// is not approved. Executor failures are reported in the outcome instead.
    pub async fn execute(&self, proposal_id: ProposalId) -> OrchestrationResult<Execution> {
        let reservation = self.reserve(proposal_id)?;
        let dry_run = self.policy.current().dispatch_mode().is_dry_run();

        let registry = Arc::clone(&self.registry);
        let executor = Arc::clone(&self.executor);
        let call_timeout = self.call_timeout;
        let task = tokio::spawn(async move {
            let outcome = if dry_run {
                ExecutionOutcome::Simulated {
                    would_execute: reservation.call.clone(),
                }
            } else {
                invoke_isolated(executor, reservation.call.clone(), call_timeout).await
            };
            complete(&registry, reservation, outcome, dry_run)
        });

        match task.await {
            Ok(committed) => committed,
            Err(err) => {
                let err = SchedulerError::from(err);
                self.registry.transact(|state| {
                    state.in_flight.remove(&proposal_id);
                });
                warn!(%proposal_id, error = %err, "execution task lost");
                Err(OrchestrationError::invalid_state(
                    proposal_id,
                    format!("execution did not complete: {err}"),
                ))
            }
        }
    }

    fn reserve(&self, proposal_id: ProposalId) -> OrchestrationResult<Reservation> {
        self.registry.transact(|state| {
            let proposal = state.proposal(proposal_id)?;
            if proposal.execution_id().is_some() || state.in_flight.contains(&proposal_id) {
                return Err(OrchestrationError::AlreadyExecuted { proposal_id });
            }
            if proposal.status().next(ProposalEvent::Execute).is_none() {
                return Err(OrchestrationError::invalid_state(
                    proposal_id,
                    format!("proposal is {}, not approved", proposal.status()),
                ));
            }
            let call = proposal.final_tool_call().cloned().ok_or_else(|| {
                OrchestrationError::invalid_state(proposal_id, "approved proposal has no final call")
            })?;
            let workflow_id = proposal.workflow_id();

            state.in_flight.insert(proposal_id);
            Ok(Reservation {
                proposal_id,
                workflow_id,
                call,
            })
        })
    }
}

fn complete(
    registry: &Registry,
    reservation: Reservation,
    outcome: ExecutionOutcome,
    dry_run: bool,
) -> OrchestrationResult<Execution> {
    let Reservation {
        proposal_id,
        workflow_id,
        call,
    } = reservation;

    let execution = registry.transact(|state| {
        state.in_flight.remove(&proposal_id);
        let execution = Execution {
            id: state.ids.executions.next_id(),
            proposal_id,
            tool_call: call,
            result: outcome,
            dry_run,
            executed_at: Utc::now(),
        };
        state.proposal_mut(proposal_id)?.record_execution(execution.id)?;

        state.audit.append(
            AuditDraft::new(AuditKind::ActionExecuted)
                .workflow(workflow_id)
                .detail("proposal_id", proposal_id.to_string())
                .detail("execution_id", execution.id.to_string())
                .detail("tool", execution.tool_call.tool.clone())
                .detail("dry_run", dry_run)
                .detail("success", execution.result.is_success()),
        );
        state.executions.insert(execution.id, execution.clone());
        Ok(execution)
    })?;

    info!(
        proposal_id = %proposal_id,
        execution_id = %execution.id,
        tool = %execution.tool_call.tool,
        dry_run,
        success = execution.result.is_success(),
        "proposal executed"
    );
    Ok(execution)
}
