//! Tracing subscriber initialization for DEKSTORE binaries.

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The global subscriber could not be installed, usually because one
/// already is.
#[derive(Debug, Error)]
#[error("failed to init tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Output format (`DEKSTORE_LOG_FORMAT=json` selects JSON)
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            default_filter: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let format = match std::env::var("DEKSTORE_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Self {
            format,
            ..Self::default()
        }
    }
}

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`, falling back to `config.default_filter`. Logs go to
/// stderr so command output on stdout stays machine-readable.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| TelemetryError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_text_at_info() {
        let config = TelemetryConfig::default();
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        let config = TelemetryConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
