//! Configuration management for the orchestration core.
//!
//! Configuration can be read from a JSON document, from `WORKFLOW_*`
//! environment variables, or from any key lookup (handy in tests). Missing keys
//! fall back to the defaults below.

#![warn(missing_docs, clippy::pedantic)]

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable toggling the initial dry-run policy.
pub const ENV_DRY_RUN: &str = "WORKFLOW_DRY_RUN";
/// Environment variable holding the per-call timeout in milliseconds (`0` disables it).
pub const ENV_CALL_TIMEOUT_MS: &str = "WORKFLOW_CALL_TIMEOUT_MS";
/// Environment variable bounding parallel fan-out.
pub const ENV_MAX_PARALLELISM: &str = "WORKFLOW_MAX_PARALLELISM";

const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_PARALLELISM: usize = 32;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON document could not be decoded.
    #[error("invalid configuration document: {source}")]
    Parse {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
    /// A single key held an unusable value.
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        /// Key that was being read.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Human-readable reason.
        reason: &'static str,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Initial dry-run policy.
    pub dry_run: bool,
    /// Timeout applied to every external tool call; `None` waits indefinitely.
    pub call_timeout_ms: Option<u64>,
    /// Upper bound on concurrently running calls within one parallel batch.
    pub max_parallelism: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            call_timeout_ms: Some(DEFAULT_CALL_TIMEOUT_MS),
            max_parallelism: DEFAULT_MAX_PARALLELISM,
        }
    }
}

impl OrchestratorConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::InvalidValue`] when validation fails.
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()
    }

    /// Reads the `WORKFLOW_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable cannot be parsed.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DRY_RUN) {
            config.dry_run = parse_bool(ENV_DRY_RUN, &raw)?;
        }

        if let Some(raw) = lookup(ENV_CALL_TIMEOUT_MS) {
            let millis = parse_number::<u64>(ENV_CALL_TIMEOUT_MS, &raw)?;
            config.call_timeout_ms = (millis > 0).then_some(millis);
        }

        if let Some(raw) = lookup(ENV_MAX_PARALLELISM) {
            config.max_parallelism = parse_number(ENV_MAX_PARALLELISM, &raw)?;
        }

        debug!(?config, "configuration loaded");
        config.validate()
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `max_parallelism` is zero.
    /// A zero `call_timeout_ms` disables the timeout.
    pub fn validate(mut self) -> ConfigResult<Self> {
        if self.call_timeout_ms == Some(0) {
            self.call_timeout_ms = None;
        }
        if self.max_parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_parallelism",
                value: "0".into(),
                reason: "must be greater than zero",
            });
        }
        Ok(self)
    }

    /// Per-call timeout as a [`Duration`].
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Parallel fan-out limit, falling back to the default if it is zero.
    #[must_use]
    pub fn max_parallelism(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_parallelism)
            .or(NonZeroUsize::new(DEFAULT_MAX_PARALLELISM))
            .unwrap_or(NonZeroUsize::MIN)
    }
}

fn parse_bool(key: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_owned(),
            reason: "expected a boolean",
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_owned(),
        reason: "expected a non-negative integer",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_input() {
        let config = OrchestratorConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.call_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.max_parallelism().get(), 32);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            (ENV_DRY_RUN, "yes"),
            (ENV_CALL_TIMEOUT_MS, "0"),
            (ENV_MAX_PARALLELISM, "4"),
        ]))
        .unwrap();

        assert!(config.dry_run);
        assert_eq!(config.call_timeout(), None);
        assert_eq!(config.max_parallelism().get(), 4);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = OrchestratorConfig::from_lookup(lookup(&[(ENV_DRY_RUN, "maybe")]))
            .expect_err("bad boolean");
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_DRY_RUN, .. }));

        let err = OrchestratorConfig::from_lookup(lookup(&[(ENV_MAX_PARALLELISM, "0")]))
            .expect_err("zero parallelism");
        assert!(matches!(err, ConfigError::InvalidValue { key: "max_parallelism", .. }));
    }

    #[test]
    fn json_document_fills_missing_keys() {
        let config = OrchestratorConfig::from_json_str(r#"{ "dry_run": true }"#).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.call_timeout_ms, Some(30_000));

        let config = OrchestratorConfig::from_json_str(r#"{ "call_timeout_ms": null }"#).unwrap();
        assert_eq!(config.call_timeout(), None);

        assert!(matches!(
            OrchestratorConfig::from_json_str("not json"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn zero_json_timeout_disables_the_limit() {
        let config = OrchestratorConfig::from_json_str(r#"{ "call_timeout_ms": 0 }"#).unwrap();
        assert_eq!(config.call_timeout_ms, None);
        assert_eq!(config.call_timeout(), None);
    }
}
