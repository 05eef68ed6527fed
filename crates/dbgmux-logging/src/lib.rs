//! Centralized logging configuration for dbgmux
//!
//! This crate provides a unified logging initialization API for the dbgmux
//! binary and test suites. It wraps `tracing` and `tracing-subscriber` to
//! ensure consistent behavior.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dbgmux_logging::{init, LogConfig, LogOutput};
//!
//! // Simple initialization with defaults
//! init(LogConfig::default());
//!
//! // CLI with debug flag
//! init(LogConfig::cli(true));
//!
//! // Console mode (logs to stderr, stdout reserved for debugger output)
//! init(LogConfig::new().output(LogOutput::Stderr));
//! ```
//!
//! # Re-exports
//!
//! Commonly used tracing macros are re-exported for standardized imports:
//! `trace!`, `debug!`, `info!`, `warn!`, `error!`.

use std::io::IsTerminal;
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for standardized imports
pub use tracing::{debug, error, info, span, trace, warn, Level};

// Re-export WorkerGuard for file logging lifetime management
pub use tracing_appender::non_blocking::WorkerGuard;

/// Output destination for logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    /// Write logs to stdout (default)
    #[default]
    Stdout,
    /// Write logs to stderr (required when stdout carries debugger output)
    Stderr,
}

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable debug-level logging (overrides default_level)
    pub debug: bool,
    /// Default log level when RUST_LOG is not set
    pub default_level: String,
    /// Output destination
    pub output: LogOutput,
    /// Show module target in log output
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_level: "info".to_string(),
            output: LogOutput::Stdout,
            show_target: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable debug-level logging
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the default log level (used when RUST_LOG is not set)
    pub fn default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    /// Set the output destination
    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Show or hide module target in log output
    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    /// Convenience: configure for CLI usage. The console UI owns stdout, so
    /// logs go to stderr.
    pub fn cli(debug: bool) -> Self {
        Self::new().debug(debug).output(LogOutput::Stderr)
    }

    fn build_filter(&self) -> EnvFilter {
        if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
        }
    }
}

/// Initialize the logging system with the given configuration.
///
/// Call once at application startup.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Override log level (e.g., `RUST_LOG=dbgmux_backends=trace`)
///
/// # Panics
///
/// Panics if called more than once (tracing can only be initialized once).
pub fn init(config: LogConfig) {
    let filter = config.build_filter();

    match config.output {
        LogOutput::Stdout => {
            let is_tty = std::io::stdout().is_terminal();
            fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_ansi(is_tty)
                .init();
        }
        LogOutput::Stderr => {
            let is_tty = std::io::stderr().is_terminal();
            fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_writer(std::io::stderr)
                .with_ansi(is_tty)
                .init();
        }
    }
}

/// Initialize the logging system with non-blocking file output.
///
/// The returned `WorkerGuard` must be held for the duration of the program
/// to ensure all logs are flushed before shutdown.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created.
pub fn init_with_file(config: LogConfig, log_path: &Path) -> std::io::Result<WorkerGuard> {
    let filter = config.build_filter();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // No ANSI colors for file output
    fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    Ok(guard)
}

/// Initialize logging for tests.
///
/// Uses `with_test_writer()` to capture logs in test output.
/// Safe to call multiple times (uses `try_init` internally).
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .debug(true)
            .default_level("warn")
            .output(LogOutput::Stderr)
            .show_target(true);
        assert!(config.debug);
        assert_eq!(config.default_level, "warn");
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(config.show_target);
    }

    #[test]
    fn test_cli_config_logs_to_stderr() {
        let config = LogConfig::cli(false);
        assert_eq!(config.output, LogOutput::Stderr);
    }

    #[test]
    fn test_build_filter_respects_debug_flag() {
        let config = LogConfig::new().default_level("warn").debug(true);
        let filter_str = format!("{:?}", config.build_filter());
        assert!(
            filter_str.contains("debug") || filter_str.contains("DEBUG"),
            "Expected debug level in filter: {}",
            filter_str
        );
    }

    #[test]
    fn test_init_test_does_not_panic() {
        // init_test should be safe to call multiple times
        init_test();
        init_test();
    }
}
