//! Tracing subscriber initialisation.

use crate::PlatformError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub log_level: String,
    /// Whether to output JSON lines
    pub json_output: bool,
    /// Whether to include the event target (module path)
    pub with_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_output: false,
            with_target: true,
        }
    }
}

impl TracingConfig {
    /// Set the default filter directive.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Hide event targets.
    #[must_use]
    pub const fn without_target(mut self) -> Self {
        self.with_target = false;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}

/// Install the global tracing subscriber.
///
/// Call once at process start-up, before the vault services are built.
///
/// # Errors
///
/// Returns [`PlatformError::Tracing`] if a global subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> Result<(), PlatformError> {
    let registry = tracing_subscriber::registry().with(config.filter());

    let result = if config.json_output {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.with_target),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init()
    };

    result.map_err(|e| PlatformError::Tracing(e.to_string()))
}
