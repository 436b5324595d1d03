//! Tracing subscriber initialization.
//!
//! Console logging with `EnvFilter` control (`RUST_LOG`), optionally in
//! JSON format for log aggregation pipelines.

use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Telemetry output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console output
    #[default]
    Pretty,
    /// JSON lines for log collectors
    Json,
}

/// Initialize the tracing subscriber.
///
/// Call once at startup; subsequent calls return an error from the
/// underlying registry, which callers may ignore in tests.
pub fn init_telemetry(format: LogFormat) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer());
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json());
            tracing::subscriber::set_global_default(subscriber)
        }
    }
}
