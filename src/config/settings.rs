use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

use crate::deadletter::{DeadLetterConfig, ReprocessConfig};
use crate::resilience::{ResilienceConfig, ResilienceOverride};
use crate::routing::{EndpointRegistry, RoutingRules};
use crate::telemetry::LogFormat;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: LogConfig,
    /// Global resilience defaults applied to every destination
    pub resilience: ResilienceConfig,
    /// Sparse per-destination overrides keyed `platform:resource_key`
    pub destinations: HashMap<String, ResilienceOverride>,
    pub routing: RoutingRules,
    pub endpoints: EndpointRegistry,
    pub dead_letter: DeadLetterConfig,
    pub reprocess: ReprocessConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Settings {
    /// Load settings from config files and environment variables.
    ///
    /// Layering, later sources winning: `config/default`, then
    /// `config/{RUN_MODE}`, then environment variables such as
    /// `RESILIENCE_RETRY_MAX_ATTEMPTS` or `DEAD_LETTER_MAX_ENTRIES`.
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_complete() {
        let settings = Settings::default();

        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert!(settings.resilience.retry.enabled);
        assert_eq!(settings.resilience.retry.max_attempts, 3);
        assert!(settings.resilience.circuit_breaker.enabled);
        assert!(!settings.resilience.rate_limiter.enabled);
        assert!(settings.destinations.is_empty());
        assert_eq!(settings.dead_letter.max_entries, 10_000);
        assert_eq!(settings.reprocess.batch_limit, 50);
    }

    #[test]
    fn test_deserializes_from_sparse_document() {
        let json = r#"{
            "log": {"format": "json"},
            "resilience": {"retry": {"max_attempts": 5}},
            "destinations": {
                "slack:ops": {"timeout": {"duration_ms": 250}}
            },
            "dead_letter": {"max_retries": 2}
        }"#;

        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(settings.resilience.retry.max_attempts, 5);
        // Untouched fields keep their defaults
        assert_eq!(settings.resilience.retry.initial_delay_ms, 500);
        assert_eq!(
            settings.destinations["slack:ops"]
                .timeout
                .as_ref()
                .unwrap()
                .duration_ms,
            Some(250)
        );
        assert_eq!(settings.dead_letter.max_retries, 2);
        assert_eq!(settings.dead_letter.max_entries, 10_000);
    }
}
