//! Tracing initialization
//!
//! Installs a `tracing-subscriber` registry filtered by `RUST_LOG`. Events go
//! to stderr so stdout stays free for outcomes.

use concierge_core::{ConciergeResult, ConfigError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::constants::{ENV_LOG_JSON, ENV_SERVICE_NAME};

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var(ENV_SERVICE_NAME)
                .unwrap_or_else(|_| "concierge".to_string()),
            json: std::env::var(ENV_LOG_JSON)
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
            default_filter: "concierge_engine=info,concierge_llm=info,concierge_registry=info,warn"
                .to_string(),
        }
    }
}

/// Initialize the tracing subscriber. Call once at startup.
pub fn init_tracer(config: &TelemetryConfig) -> ConciergeResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| ConfigError::Unreadable {
            reason: format!("Failed to init subscriber: {}", e),
        })?;

    tracing::info!(
        service_name = %config.service_name,
        json = config.json,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_telemetry_config_from_env() {
        let _name = EnvVarGuard::set(ENV_SERVICE_NAME, None);
        let _json = EnvVarGuard::set(ENV_LOG_JSON, Some("1"));
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "concierge");
        assert!(config.json);
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = TelemetryConfig::default();
        let _ = init_tracer(&config);
        assert!(init_tracer(&config).is_err());
    }
}
