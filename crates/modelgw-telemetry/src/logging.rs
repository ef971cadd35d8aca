//! Structured logging setup.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info", "modelgw=debug,info")
    pub level: String,
    /// Emit JSON-formatted log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Create a default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter directive
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Toggle JSON output
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Errors initializing logging
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive did not parse
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter {
        /// The offending directive
        directive: String,
        /// Parser detail
        message: String,
    },

    /// A global subscriber is already installed
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level so operators can
/// raise verbosity without touching config files.
///
/// # Errors
/// Returns [`LoggingError`] if the filter is invalid or a subscriber is
/// already installed (common in tests; safe to ignore there).
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
            directive: config.level.clone(),
            message: e.to_string(),
        })
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|_| LoggingError::AlreadyInitialized)
}
