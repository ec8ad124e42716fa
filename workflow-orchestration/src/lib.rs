//! Human-in-the-loop orchestration for agent tool calls.
//!
//! Bundles the workflow crates behind feature flags. The default feature set
//! carries the orchestration kernel (which pulls in tools, audit, policy and
//! config) plus the telemetry bootstrap used by hosts.

#![warn(missing_docs, clippy::pedantic)]

/// Identifiers and tool call payloads.
pub use workflow_primitives as primitives;

/// Registry, proposal machine, execution engines and connector surface
/// (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use workflow_kernel as kernel;

/// Tool executor seam and the name-keyed tool registry (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use workflow_tools as tools;

/// Append-only audit log and sinks (enabled by `audit` feature).
#[cfg(feature = "audit")]
pub use workflow_audit as audit;

/// Dry-run policy store (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use workflow_policy as policy;

/// Orchestrator configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use workflow_config as config;

/// Tracing subscriber bootstrap (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use workflow_telemetry as telemetry;

/// The types most hosts need.
#[cfg(feature = "kernel")]
pub mod prelude {
    pub use workflow_config::OrchestratorConfig;
    pub use workflow_kernel::{
        ConnectorSurface, ExecutionOutcome, OrchestrationError, Orchestrator, ReviewDecision,
    };
    pub use workflow_policy::PolicyUpdate;
    pub use workflow_primitives::{Params, ToolCall, ToolCallEdits};
    pub use workflow_tools::{ToolExecutor, ToolMetadata, ToolRegistry};
}
