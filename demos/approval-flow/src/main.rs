//! Propose, review, execute and audit a schema migration, then fan out
//! notifications, first live and then under a dry-run policy.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::info;
use workflow_orchestration::audit::TracingAuditSink;
use workflow_orchestration::prelude::*;
use workflow_orchestration::telemetry::{self, TelemetryConfig};
use workflow_orchestration::tools::ToolError;

fn tools() -> Result<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry.register_tool(
        ToolMetadata::new("migrate")?
            .with_description("Apply a schema migration")
            .with_input_schema(json!({ "type": "object", "required": ["table"] })),
        |params: Params| async move {
            let table = params
                .get("table")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::execution("missing `table`"))?;
            Ok::<_, ToolError>(json!({ "migrated": table, "columns": params.get("col") }))
        },
    )?;
    registry.register_tool(
        ToolMetadata::new("notify")?.with_description("Post a message to a channel"),
        |params: Params| async move {
            match params.get("channel").and_then(Value::as_str) {
                Some("#void") => Err(ToolError::execution("channel does not exist")),
                Some(channel) => Ok(json!({ "delivered": channel })),
                None => Err(ToolError::execution("missing `channel`")),
            }
        },
    )?;
    Ok(registry)
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(&TelemetryConfig::default())?;

    let config = OrchestratorConfig::from_env().context("reading WORKFLOW_* variables")?;
    let orchestrator = Arc::new(
        Orchestrator::builder(Arc::new(tools()?))
            .config(config)
            .audit_sink(Arc::new(TracingAuditSink))
            .build(),
    );

    let developer = orchestrator.register_actor("A", "developer");
    let dba = orchestrator.register_actor("B", "dba");
    let workflow = orchestrator.start_workflow("Add email column to users");

    let proposal = orchestrator.propose_action(
        workflow.id(),
        developer.id(),
        "migrate",
        params(json!({ "table": "users" })),
        "signup flow needs an email column",
    )?;
    let edits = ToolCallEdits::params(params(json!({ "table": "users", "col": "email" })));
    let review = orchestrator.review_action(proposal.id(), dba.id(), ReviewDecision::Edit(edits))?;
    info!(status = %review.status, "proposal reviewed");

    let execution = orchestrator.execute_action(proposal.id()).await?;
    println!("execution: {}", serde_json::to_string_pretty(execution.result())?);

    let surface = ConnectorSurface::new(Arc::clone(&orchestrator));
    let notifications = json!({
        "calls": [
            { "tool": "notify", "params": { "channel": "#db" } },
            { "tool": "notify", "params": { "channel": "#void" } },
            { "tool": "notify", "params": { "channel": "#release" } },
        ]
    });
    let live = surface.call("execute_parallel", notifications.clone()).await?;
    println!("parallel: {}", serde_json::to_string_pretty(&live)?);

    surface.call("set_policy", json!({ "dry_run": true })).await?;
    let rehearsal = surface.call("execute_parallel", notifications).await?;
    println!("dry-run parallel: {}", serde_json::to_string_pretty(&rehearsal)?);

    let log = surface
        .call("get_audit_log", json!({ "workflow_id": workflow.id() }))
        .await?;
    println!("audit: {}", serde_json::to_string_pretty(&log)?);

    Ok(())
}
