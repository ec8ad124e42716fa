//! Tool execution seam for the orchestration core.
//!
//! The core never performs side effects itself: every approved proposal and
//! every parallel batch is handed to a [`ToolExecutor`]. [`ToolRegistry`] is an
//! in-process executor that dispatches to handlers registered by name.

#![warn(missing_docs, clippy::pedantic)]

pub mod registry;

pub use registry::{Tool, ToolError, ToolExecutor, ToolMetadata, ToolRegistry, ToolResult};
