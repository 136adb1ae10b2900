//! Structured logging setup.
//!
//! Components emit through `tracing`; this module only configures the
//! subscriber. Evaluation paths log at `debug`, administrative mutations
//! at `info`, lossy behavior (unread-alert eviction) at `warn`.

use serde::{Deserialize, Serialize};

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level.
    pub level: LogLevel,
    /// Emit JSON-shaped (structured) output.
    pub structured: bool,
    /// Include timestamps in output.
    pub include_timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            structured: false,
            include_timestamps: true,
        }
    }
}

impl LogConfig {
    /// Development preset: human-readable, debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            structured: false,
            include_timestamps: true,
        }
    }

    /// Production preset: structured output for log aggregation.
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            structured: true,
            include_timestamps: true,
        }
    }

    /// Install a global `tracing` subscriber for this configuration.
    ///
    /// Returns an error if a global subscriber is already set.
    pub fn init(&self) -> Result<(), String> {
        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(tracing::Level::from(self.level).into())
            .from_env_lossy();

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true);

        let result = if self.structured {
            builder.json().try_init()
        } else if self.include_timestamps {
            builder.try_init()
        } else {
            builder.without_time().try_init()
        };

        result.map_err(|e| format!("Failed to install subscriber: {e}"))
    }
}
