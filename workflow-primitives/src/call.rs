//! Tool call payloads exchanged with the tool executor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque tool parameters. The orchestration core never inspects their shape.
pub type Params = Map<String, Value>;

/// A named tool invocation with its parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke.
    pub tool: String,
    /// Parameters forwarded verbatim to the tool.
    #[serde(default)]
    pub params: Params,
}

impl ToolCall {
    /// Creates a tool call.
    #[must_use]
    pub fn new(tool: impl Into<String>, params: Params) -> Self {
        Self {
            tool: tool.into(),
            params,
        }
    }

    /// Returns a copy of this call with `edits` applied.
    ///
    /// `edits.tool` replaces the tool name when present. `edits.params` is
    /// merged one level deep: edited keys overwrite, all other keys survive.
    #[must_use]
    pub fn with_edits(&self, edits: &ToolCallEdits) -> Self {
        let mut merged = self.clone();
        if let Some(tool) = &edits.tool {
            merged.tool.clone_from(tool);
        }
        if let Some(params) = &edits.params {
            for (key, value) in params {
                merged.params.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// Review-time modifications to a proposed tool call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEdits {
    /// Replacement tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Parameters merged over the proposed ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl ToolCallEdits {
    /// Edits that only touch parameters.
    #[must_use]
    pub fn params(params: Params) -> Self {
        Self {
            tool: None,
            params: Some(params),
        }
    }

    /// Replaces the tool name, keeping any parameter edits.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Returns `true` when neither the tool nor any parameter is edited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tool.is_none() && self.params.as_ref().is_none_or(Map::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn edits_merge_shallowly() {
        let call = ToolCall::new(
            "migrate",
            params(json!({ "table": "users", "options": { "lock": true }, "dry": false })),
        );
        let edits = ToolCallEdits::params(params(json!({
            "col": "email",
            "options": { "timeout": 5 }
        })));

        let merged = call.with_edits(&edits);

        assert_eq!(merged.tool, "migrate");
        assert_eq!(merged.params["table"], json!("users"));
        assert_eq!(merged.params["col"], json!("email"));
        assert_eq!(merged.params["dry"], json!(false));
        // Nested objects are replaced, not merged.
        assert_eq!(merged.params["options"], json!({ "timeout": 5 }));
    }

    #[test]
    fn tool_override_keeps_params() {
        let call = ToolCall::new("migrate", params(json!({ "table": "users" })));
        let edits = ToolCallEdits::default().with_tool("migrate_online");

        let merged = call.with_edits(&edits);
        assert_eq!(merged.tool, "migrate_online");
        assert_eq!(merged.params, call.params);
    }

    #[test]
    fn empty_edits_detected() {
        assert!(ToolCallEdits::default().is_empty());
        assert!(ToolCallEdits::params(Params::new()).is_empty());
        assert!(!ToolCallEdits::default().with_tool("x").is_empty());
    }

    #[test]
    fn missing_params_deserialize_to_empty_map() {
        let call: ToolCall = serde_json::from_value(json!({ "tool": "notify" })).unwrap();
        assert!(call.params.is_empty());
    }
}
