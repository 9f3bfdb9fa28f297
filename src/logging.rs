//! Logging initialization for embedding applications and test harnesses.
//!
//! Uses the tracing ecosystem for structured logging with support for:
//! - Environment variable override (GANTRY_LOG)
//! - Console output formats for development
//! - Module-level log filtering

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default log level when GANTRY_LOG is unset.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Show timestamps.
    pub timestamps: bool,
    /// Show file and line numbers.
    pub file_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            timestamps: true,
            file_line: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
}

impl LogFormat {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initialize the logging system.
///
/// Safe to call more than once; later calls are no-ops.
///
/// # Environment Variables
/// - `GANTRY_LOG`: override the filter (e.g. "gantry=debug,gantry::queue=trace")
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_env("GANTRY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(format!("gantry={}", config.level.as_str().to_lowercase()))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    let result = match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => builder.pretty().try_init(),
        (LogFormat::Pretty, false) => builder.pretty().without_time().try_init(),
        (LogFormat::Compact, true) => builder.compact().try_init(),
        (LogFormat::Compact, false) => builder.compact().without_time().try_init(),
    };
    // Err means a subscriber is already installed; keep it.
    let _ = result;
}
