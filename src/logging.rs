//! Logging setup, powered by tracing-subscriber
//!
//! The base level comes from the config file; `RUST_LOG`, when set, takes
//! precedence. Chatty dependencies are capped at `warn`.

use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,
    /// JSON Lines
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level directive (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: String,
    pub format: LogFormat,
    /// ANSI colors in compact output
    pub colorize: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
            colorize: false,
        }
    }
}

const NOISY_TARGETS: &[(&str, &str)] = &[
    ("lapin", "warn"),
    ("pinky_swear", "warn"),
    ("amq_protocol", "warn"),
    ("tungstenite", "warn"),
    ("tokio_tungstenite", "warn"),
];

fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    for (target, lvl) in NOISY_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }

    EnvFilter::try_new(directives.join(","))
        .map_err(|e| Error::Config(format!("invalid log level {:?}: {}", level, e)))
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = build_env_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(config.colorize),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("logging already initialized: {}", e)))
}
