//! Structured logging setup.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

/// Output format for logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format (for production/log aggregation).
    #[default]
    Json,
    /// Human-readable format (for development).
    Human,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Human => write!(f, "human"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "human" | "pretty" | "text" => Ok(Self::Human),
            other => Err(LoggingError::UnknownFormat(other.to_string())),
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `info,edge_executor=debug`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Read `LOG_FORMAT` and `RUST_LOG`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            format: std::env::var("LOG_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.format),
            filter: std::env::var("RUST_LOG").unwrap_or(defaults.filter),
        }
    }

    /// Set output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set filter directives.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }
}

/// Install the global `tracing` subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt_layer::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Human => registry.with(fmt_layer::layer().with_target(false)).try_init(),
    };

    result.map_err(|e| LoggingError::Init(e.to_string()))?;
    tracing::debug!(format = %config.format, filter = %config.filter, "Logging initialized");
    Ok(())
}
