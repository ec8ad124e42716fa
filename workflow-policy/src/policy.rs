//! Policy value types.

use serde::{Deserialize, Serialize};

/// How a tool call is dispatched under the current policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// The tool executor is invoked.
    Live,
    /// Execution is simulated and the executor is never invoked.
    DryRun,
}

impl DispatchMode {
    /// Returns `true` for [`DispatchMode::DryRun`].
    #[must_use]
    pub const fn is_dry_run(self) -> bool {
        matches!(self, Self::DryRun)
    }
}

/// Full policy state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Simulate executions instead of invoking the tool executor.
    #[serde(default)]
    pub dry_run: bool,
}

impl Policy {
    /// Creates a policy with the given dry-run flag.
    #[must_use]
    pub const fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Returns the dispatch mode implied by the policy.
    #[must_use]
    pub const fn dispatch_mode(self) -> DispatchMode {
        if self.dry_run {
            DispatchMode::DryRun
        } else {
            DispatchMode::Live
        }
    }

    /// Returns the policy with `update` applied. Absent fields keep their value.
    #[must_use]
    pub fn merged(self, update: &PolicyUpdate) -> Self {
        Self {
            dry_run: update.dry_run.unwrap_or(self.dry_run),
        }
    }
}

/// Partial policy update; only present fields are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    /// New dry-run flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

impl PolicyUpdate {
    /// Update that sets the dry-run flag.
    #[must_use]
    pub const fn dry_run(enabled: bool) -> Self {
        Self {
            dry_run: Some(enabled),
        }
    }

    /// Returns `true` when the update carries no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.dry_run.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_kept() {
        let policy = Policy::new(true);
        assert_eq!(policy.merged(&PolicyUpdate::default()), policy);
        assert_eq!(policy.merged(&PolicyUpdate::dry_run(false)), Policy::new(false));
    }

    #[test]
    fn dispatch_mode_follows_flag() {
        assert_eq!(Policy::default().dispatch_mode(), DispatchMode::Live);
        assert!(Policy::new(true).dispatch_mode().is_dry_run());
    }

    #[test]
    fn update_deserializes_partially() {
        let update: PolicyUpdate = serde_json::from_str("{}").unwrap();
        assert!(update.is_empty());
        let update: PolicyUpdate = serde_json::from_str(r#"{"dry_run":true}"#).unwrap();
        assert_eq!(update, PolicyUpdate::dry_run(true));
    }
}
