//! Observability utilities for orchestration hosts.
//!
//! Library crates only emit `tracing` events; binaries call [`init`] once to
//! install a formatting subscriber filtered by `RUST_LOG`.

#![warn(missing_docs, clippy::pedantic)]

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    default_filter: String,
    with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_owned(),
            with_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Sets the filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Includes event targets (module paths) in formatted output.
    #[must_use]
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Returns the fallback filter directive.
    #[must_use]
    pub fn default_filter(&self) -> &str {
        &self.default_filter
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_filter)
                .with_context(|| format!("invalid log filter `{}`", self.default_filter)),
        }
    }
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Fails when the filter directive is invalid or a global subscriber is
/// already installed.
pub fn init(config: &TelemetryConfig) -> Result<()> {
    let filter = config.env_filter()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_level(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;
    debug!(default_filter = %config.default_filter, "tracing subscriber installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_info() {
        let config = TelemetryConfig::default();
        assert_eq!(config.default_filter(), "info");
    }

    #[test]
    fn invalid_fallback_filter_is_rejected() {
        let config = TelemetryConfig::default().with_default_filter("=[not a filter");
        if std::env::var("RUST_LOG").is_err() {
            assert!(config.env_filter().is_err());
        }
    }

    #[test]
    fn second_init_is_rejected() {
        let config = TelemetryConfig::default().with_default_filter("debug");
        if std::env::var("RUST_LOG").is_err() {
            init(&config).unwrap();
            let err = init(&config).unwrap_err();
            assert!(err.to_string().contains("failed to install tracing subscriber"));
        }
    }
}
