//! Named-operation surface over the [`Orchestrator`].
//!
//! Hosts that expose the core as tools (for example over JSON-RPC) list
//! [`ConnectorSurface::operations`] and forward each call's name and JSON
//! arguments to [`ConnectorSurface::call`]. Errors carry a stable numeric code.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;
use workflow_policy::PolicyUpdate;
use workflow_primitives::{ActorId, Params, ProposalId, ToolCall, ToolCallEdits, WorkflowId};

use crate::error::OrchestrationError;
use crate::orchestrator::Orchestrator;
use crate::proposal::ReviewDecision;

/// Operations exposed by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Register an actor.
    RegisterActor,
    /// Start a workflow.
    StartWorkflow,
    /// Propose a tool call.
    ProposeAction,
    /// Review a proposal.
    ReviewAction,
    /// Execute an approved proposal.
    ExecuteAction,
    /// Fan out a batch of calls.
    ExecuteParallel,
    /// Read a workflow's audit trail.
    GetAuditLog,
    /// Update the policy.
    SetPolicy,
    /// Read the policy.
    GetPolicy,
    /// Read one proposal.
    GetProposal,
    /// List a workflow's proposals.
    ListProposals,
}

impl Operation {
    /// Every operation, in listing order.
    pub const ALL: [Self; 11] = [
        Self::RegisterActor,
        Self::StartWorkflow,
        Self::ProposeAction,
        Self::ReviewAction,
        Self::ExecuteAction,
        Self::ExecuteParallel,
        Self::GetAuditLog,
        Self::SetPolicy,
        Self::GetPolicy,
        Self::GetProposal,
        Self::ListProposals,
    ];

    /// Wire name of the operation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RegisterActor => "register_actor",
            Self::StartWorkflow => "start_workflow",
            Self::ProposeAction => "propose_action",
            Self::ReviewAction => "review_action",
            Self::ExecuteAction => "execute_action",
            Self::ExecuteParallel => "execute_parallel",
            Self::GetAuditLog => "get_audit_log",
            Self::SetPolicy => "set_policy",
            Self::GetPolicy => "get_policy",
            Self::GetProposal => "get_proposal",
            Self::ListProposals => "list_proposals",
        }
    }

    /// One-line description for listings.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::RegisterActor => "Register an agent or human reviewer",
            Self::StartWorkflow => "Start a workflow that groups related proposals",
            Self::ProposeAction => "Propose a tool call for human review",
            Self::ReviewAction => "Approve, reject or edit a pending proposal",
            Self::ExecuteAction => "Execute an approved proposal",
            Self::ExecuteParallel => "Execute several low-risk tool calls concurrently",
            Self::GetAuditLog => "Read the audit trail of a workflow",
            Self::SetPolicy => "Update the execution policy",
            Self::GetPolicy => "Read the execution policy",
            Self::GetProposal => "Read a proposal",
            Self::ListProposals => "List the proposals of a workflow",
        }
    }

    /// JSON schema of the operation's arguments.
    #[must_use]
    pub fn input_schema(self) -> Value {
        let string = json!({ "type": "string" });
        let object = json!({ "type": "object" });
        let (properties, required) = match self {
            Self::RegisterActor => (
                json!({ "name": string, "role": string }),
                json!(["name", "role"]),
            ),
            Self::StartWorkflow => (json!({ "title": string }), json!(["title"])),
            Self::ProposeAction => (
                json!({
                    "workflow_id": string,
                    "actor_id": string,
                    "tool": string,
                    "params": object,
                    "reason": string,
                }),
                json!(["workflow_id", "actor_id", "tool", "reason"]),
            ),
            Self::ReviewAction => (
                json!({
                    "proposal_id": string,
                    "reviewer_id": string,
                    "decision": { "type": "string", "enum": ["approve", "reject", "edit"] },
                    "edits": {
                        "type": "object",
                        "properties": { "tool": string, "params": object },
                    },
                }),
                json!(["proposal_id", "reviewer_id", "decision"]),
            ),
            Self::ExecuteAction | Self::GetProposal => {
                (json!({ "proposal_id": string }), json!(["proposal_id"]))
            }
            Self::ExecuteParallel => (
                json!({
                    "calls": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": { "tool": string, "params": object },
                            "required": ["tool"],
                        },
                    },
                }),
                json!(["calls"]),
            ),
            Self::GetAuditLog | Self::ListProposals => {
                (json!({ "workflow_id": string }), json!(["workflow_id"]))
            }
            Self::SetPolicy => (json!({ "dry_run": { "type": "boolean" } }), json!([])),
            Self::GetPolicy => (json!({}), json!([])),
        };
        json!({ "type": "object", "properties": properties, "required": required })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|operation| operation.name() == s)
            .ok_or_else(|| SurfaceError::UnknownOperation(s.to_owned()))
    }
}

/// Listing entry for one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDescriptor {
    /// Wire name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// JSON schema of the arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Errors returned by [`ConnectorSurface::call`].
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// No operation has the requested name.
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
    /// Arguments could not be decoded.
    #[error("invalid arguments for `{operation}`: {reason}")]
    InvalidArguments {
        /// Operation being called.
        operation: Operation,
        /// Decoder message.
        reason: String,
    },
    /// The orchestrator rejected the call.
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
    /// A result could not be encoded.
    #[error("failed to encode result: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl SurfaceError {
    /// Stable numeric code, JSON-RPC style.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::UnknownOperation(_) => -32601,
            Self::InvalidArguments { .. }
            | Self::Orchestration(OrchestrationError::Validation { .. }) => -32602,
            Self::Orchestration(OrchestrationError::NotFound { .. }) => -32004,
            Self::Orchestration(OrchestrationError::InvalidState { .. }) => -32009,
            Self::Orchestration(OrchestrationError::AlreadyExecuted { .. }) => -32010,
            Self::Encoding(_) => -32603,
        }
    }

    /// JSON error object `{code, message}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({ "code": self.code(), "message": self.to_string() })
    }
}

/// Result alias for surface calls.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RegisterActorArgs {
    name: String,
    role: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StartWorkflowArgs {
    title: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProposeActionArgs {
    workflow_id: WorkflowId,
    actor_id: ActorId,
    tool: String,
    #[serde(default)]
    params: Params,
    reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum DecisionLabel {
    Approve,
    Reject,
    Edit,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ReviewActionArgs {
    proposal_id: ProposalId,
    reviewer_id: ActorId,
    decision: DecisionLabel,
    #[serde(default)]
    edits: Option<ToolCallEdits>,
}

impl ReviewActionArgs {
    fn decision(self) -> Result<(ProposalId, ActorId, ReviewDecision), String> {
        let decision = match (self.decision, self.edits) {
            (DecisionLabel::Approve, None) => ReviewDecision::Approve,
            (DecisionLabel::Reject, None) => ReviewDecision::Reject,
            (DecisionLabel::Edit, Some(edits)) => ReviewDecision::Edit(edits),
            (DecisionLabel::Edit, None) => return Err("`edit` requires `edits`".into()),
            (DecisionLabel::Approve | DecisionLabel::Reject, Some(_)) => {
                return Err("`edits` is only accepted with `edit`".into());
            }
        };
        Ok((self.proposal_id, self.reviewer_id, decision))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProposalArgs {
    proposal_id: ProposalId,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkflowArgs {
    workflow_id: WorkflowId,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteParallelArgs {
    calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

/// JSON front end for an [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct ConnectorSurface {
    orchestrator: Arc<Orchestrator>,
}

impl ConnectorSurface {
    /// Wraps a shared orchestrator.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Underlying orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Describes every operation.
    #[must_use]
    pub fn operations(&self) -> Vec<OperationDescriptor> {
        Operation::ALL
            .into_iter()
            .map(|operation| OperationDescriptor {
                name: operation.name(),
                description: operation.description(),
                input_schema: operation.input_schema(),
            })
            .collect()
    }

    /// Dispatches `name` with JSON `arguments`. `null` counts as `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::UnknownOperation`] for unknown names,
    /// [`SurfaceError::InvalidArguments`] for malformed arguments and
    /// [`SurfaceError::Orchestration`] when the orchestrator rejects the call.
    pub async fn call(&self, name: &str, arguments: Value) -> SurfaceResult<Value> {
        let operation: Operation = name.parse()?;
        let arguments = if arguments.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            arguments
        };
        debug!(%operation, "surface call");
        self.dispatch(operation, arguments).await
    }

    async fn dispatch(&self, operation: Operation, arguments: Value) -> SurfaceResult<Value> {
        let orchestrator = &self.orchestrator;
        match operation {
            Operation::RegisterActor => {
                let args: RegisterActorArgs = parse(operation, arguments)?;
                let actor = orchestrator.register_actor(args.name, args.role);
                Ok(json!({ "actor_id": actor.id(), "name": actor.name(), "role": actor.role() }))
            }
            Operation::StartWorkflow => {
                let args: StartWorkflowArgs = parse(operation, arguments)?;
                let workflow = orchestrator.start_workflow(args.title);
                Ok(json!({
                    "workflow_id": workflow.id(),
                    "title": workflow.title(),
                    "status": workflow.status(),
                }))
            }
            Operation::ProposeAction => {
                let args: ProposeActionArgs = parse(operation, arguments)?;
                let proposal = orchestrator.propose_action(
                    args.workflow_id,
                    args.actor_id,
                    args.tool,
                    args.params,
                    args.reason,
                )?;
                Ok(json!({ "proposal_id": proposal.id(), "status": proposal.status() }))
            }
            Operation::ReviewAction => {
                let args: ReviewActionArgs = parse(operation, arguments)?;
                let (proposal_id, reviewer_id, decision) = args
                    .decision()
                    .map_err(|reason| SurfaceError::InvalidArguments { operation, reason })?;
                let outcome = orchestrator.review_action(proposal_id, reviewer_id, decision)?;
                Ok(serde_json::to_value(outcome)?)
            }
            Operation::ExecuteAction => {
                let args: ProposalArgs = parse(operation, arguments)?;
                let execution = orchestrator.execute_action(args.proposal_id).await?;
                Ok(json!({
                    "execution_id": execution.id(),
                    "proposal_id": execution.proposal_id(),
                    "dryRun": execution.dry_run(),
                    "result": execution.result(),
                }))
            }
            Operation::ExecuteParallel => {
                let args: ExecuteParallelArgs = parse(operation, arguments)?;
                let batch = orchestrator.execute_parallel(args.calls).await?;
                Ok(json!({
                    "parallel_execution_id": batch.id(),
                    "dryRun": batch.dry_run(),
                    "results": batch.results(),
                }))
            }
            Operation::GetAuditLog => {
                let args: WorkflowArgs = parse(operation, arguments)?;
                let entries = orchestrator.get_audit_log(args.workflow_id)?;
                Ok(json!({ "workflow_id": args.workflow_id, "entries": entries }))
            }
            Operation::SetPolicy => {
                let update: PolicyUpdate = parse(operation, arguments)?;
                Ok(serde_json::to_value(orchestrator.set_policy(update))?)
            }
            Operation::GetPolicy => {
                let NoArgs {} = parse(operation, arguments)?;
                Ok(serde_json::to_value(orchestrator.get_policy())?)
            }
            Operation::GetProposal => {
                let args: ProposalArgs = parse(operation, arguments)?;
                Ok(serde_json::to_value(orchestrator.get_proposal(args.proposal_id)?)?)
            }
            Operation::ListProposals => {
                let args: WorkflowArgs = parse(operation, arguments)?;
                let proposals = orchestrator.list_proposals(args.workflow_id)?;
                Ok(json!({ "workflow_id": args.workflow_id, "proposals": proposals }))
            }
        }
    }
}

fn parse<T: DeserializeOwned>(operation: Operation, arguments: Value) -> SurfaceResult<T> {
    serde_json::from_value(arguments).map_err(|err| SurfaceError::InvalidArguments {
        operation,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use workflow_tools::{ToolExecutor, ToolResult};

    struct Echo;

    #[async_trait]
    impl ToolExecutor for Echo {
        async fn execute(&self, tool: &str, params: Params) -> ToolResult<Value> {
            Ok(json!({ "tool": tool, "params": params }))
        }
    }

    fn surface() -> ConnectorSurface {
        ConnectorSurface::new(Arc::new(Orchestrator::new(Arc::new(Echo))))
    }

    #[test]
    fn lists_every_operation_with_schema() {
        let operations = surface().operations();
        let names: Vec<_> = operations.iter().map(|op| op.name).collect();
        assert_eq!(names.len(), 11);
        assert_eq!(names[0], "register_actor");
        assert!(names.contains(&"list_proposals"));

        let value = serde_json::to_value(&operations[2]).unwrap();
        assert_eq!(value["inputSchema"]["type"], "object");
        assert_eq!(value["inputSchema"]["required"][0], "workflow_id");
    }

    #[test]
    fn operation_names_round_trip() {
        for operation in Operation::ALL {
            assert_eq!(operation.name().parse::<Operation>().unwrap(), operation);
        }
    }

    #[tokio::test]
    async fn unknown_operation_has_method_not_found_code() {
        let err = surface().call("drop_tables", Value::Null).await.unwrap_err();
        assert_eq!(err.code(), -32601);
        assert_eq!(err.to_json()["code"], -32601);
    }

    #[tokio::test]
    async fn full_flow_through_json() {
        let surface = surface();
        let agent = surface
            .call("register_actor", json!({ "name": "bot", "role": "agent" }))
            .await
            .unwrap();
        let reviewer = surface
            .call("register_actor", json!({ "name": "ana", "role": "reviewer" }))
            .await
            .unwrap();
        let workflow = surface
            .call("start_workflow", json!({ "title": "Cleanup" }))
            .await
            .unwrap();
        assert_eq!(workflow["status"], "active");

        let proposal = surface
            .call(
                "propose_action",
                json!({
                    "workflow_id": workflow["workflow_id"],
                    "actor_id": agent["actor_id"],
                    "tool": "clear_cache",
                    "params": { "region": "eu" },
                    "reason": "stale entries",
                }),
            )
            .await
            .unwrap();
        assert_eq!(proposal["status"], "pending");

        let review = surface
            .call(
                "review_action",
                json!({
                    "proposal_id": proposal["proposal_id"],
                    "reviewer_id": reviewer["actor_id"],
                    "decision": "approve",
                }),
            )
            .await
            .unwrap();
        assert_eq!(review["status"], "approved");
        assert_eq!(review["final_tool_call"]["tool"], "clear_cache");

        let executed = surface
            .call("execute_action", json!({ "proposal_id": proposal["proposal_id"] }))
            .await
            .unwrap();
        assert_eq!(executed["result"]["success"], true);
        assert_eq!(executed["result"]["output"]["params"]["region"], "eu");

        let again = surface
            .call("execute_action", json!({ "proposal_id": proposal["proposal_id"] }))
            .await
            .unwrap_err();
        assert_eq!(again.code(), -32010);

        let log = surface
            .call("get_audit_log", json!({ "workflow_id": workflow["workflow_id"] }))
            .await
            .unwrap();
        let kinds: Vec<_> = log["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["type"].clone())
            .collect();
        assert_eq!(
            kinds,
            [json!("proposal_created"), json!("proposal_reviewed"), json!("action_executed")]
        );

        let listed = surface
            .call("list_proposals", json!({ "workflow_id": workflow["workflow_id"] }))
            .await
            .unwrap();
        assert_eq!(listed["proposals"][0]["status"], "executed");
    }

    #[tokio::test]
    async fn review_arguments_must_match_decision() {
        let surface = surface();
        let err = surface
            .call(
                "review_action",
                json!({
                    "proposal_id": "proposal_1",
                    "reviewer_id": "actor_1",
                    "decision": "approve",
                    "edits": { "tool": "other" },
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SurfaceError::InvalidArguments { .. }));
        assert_eq!(err.code(), -32602);

        let err = surface
            .call(
                "review_action",
                json!({ "proposal_id": "proposal_1", "reviewer_id": "actor_1", "decision": "edit" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[tokio::test]
    async fn orchestration_errors_map_to_codes() {
        let surface = surface();

        let err = surface
            .call("get_audit_log", json!({ "workflow_id": "workflow_9" }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32004);

        let err = surface
            .call("get_audit_log", json!({ "workflow_id": "actor_9" }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);

        let err = surface.call("execute_parallel", json!({ "calls": [] })).await.unwrap_err();
        assert!(matches!(
            err,
            SurfaceError::Orchestration(OrchestrationError::Validation { .. })
        ));
        assert_eq!(err.code(), -32602);
    }

    #[tokio::test]
    async fn second_review_maps_to_invalid_state_code() {
        let surface = surface();
        let actor = surface
            .call("register_actor", json!({ "name": "ana", "role": "reviewer" }))
            .await
            .unwrap();
        let workflow = surface
            .call("start_workflow", json!({ "title": "Rotate keys" }))
            .await
            .unwrap();
        let proposal = surface
            .call(
                "propose_action",
                json!({
                    "workflow_id": workflow["workflow_id"],
                    "actor_id": actor["actor_id"],
                    "tool": "rotate",
                    "reason": "quarterly",
                }),
            )
            .await
            .unwrap();
        let review = json!({
            "proposal_id": proposal["proposal_id"],
            "reviewer_id": actor["actor_id"],
            "decision": "reject",
        });

        surface.call("review_action", review.clone()).await.unwrap();
        let err = surface.call("review_action", review).await.unwrap_err();
        assert!(matches!(
            err,
            SurfaceError::Orchestration(OrchestrationError::InvalidState { .. })
        ));
        assert_eq!(err.code(), -32009);
    }

    #[tokio::test]
    async fn policy_round_trip() {
        let surface = surface();
        let policy = surface.call("set_policy", json!({ "dry_run": true })).await.unwrap();
        assert_eq!(policy, json!({ "dry_run": true }));
        let policy = surface.call("get_policy", Value::Null).await.unwrap();
        assert_eq!(policy, json!({ "dry_run": true }));

        let batch = surface
            .call("execute_parallel", json!({ "calls": [{ "tool": "notify" }] }))
            .await
            .unwrap();
        assert_eq!(batch["dryRun"], true);
        assert_eq!(batch["results"][0]["simulated"], true);
    }
}
