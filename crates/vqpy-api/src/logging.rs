//! Logging configuration for VQPy
//!
//! Installs a `tracing` subscriber for applications embedding the engine.
//! The core crates only emit events; nothing is printed until a subscriber
//! is installed, either through [`LogConfig::init`] or by the application.
//!
//! Useful targets for `RUST_LOG`:
//! - `vqpy_core::query::compiler` for compilation and model binding
//! - `vqpy_core::query::executor` for per-frame processing (`trace` shows
//!   per-query row counts)
//! - `vqpy_core::tracker` for opened tracks

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vqpy_core::{Error, Result};

const DEFAULT_LOG_FILE: &str = "vqpy.log";

/// Log output destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogOutput {
    /// Output to stdout
    Stdout,
    /// Output to a daily rolling file
    File(PathBuf),
    /// Output to both stdout and file
    Both(PathBuf),
}

/// Log format style
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable multi-line format
    Pretty,
    /// Compact single-line format, one event per frame step
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level or full `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    /// Output destination
    pub output: LogOutput,
    /// Format style
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Stdout,
            format: LogFormat::Compact,
        }
    }
}

impl LogConfig {
    /// Info level on stdout
    pub fn info() -> Self {
        Self::default()
    }

    /// Debug level: plans, resolved models, per-frame object counts
    pub fn debug() -> Self {
        Self::default().with_level("debug")
    }

    /// Trace level: everything including per-query row counts
    pub fn trace() -> Self {
        Self::default().with_level("trace")
    }

    /// Warnings only, e.g. unbound but unused abstract functions
    pub fn warn() -> Self {
        Self::default().with_level("warn")
    }

    /// Set log output to a rolling file
    pub fn with_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::File(path.into());
        self
    }

    /// Set log output to both stdout and a rolling file
    pub fn with_both<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::Both(path.into());
        self
    }

    /// Set log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set log level filter
    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| {
                Error::InvalidOperation(format!("Invalid log level '{}': {}", self.level, e))
            })
    }

    /// Install this configuration as the global subscriber.
    ///
    /// File output returns a guard that must be kept alive: dropping it
    /// flushes and stops the background writer. Installing a second global
    /// subscriber is an error.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vqpy::logging::LogConfig;
    ///
    /// // Keep the guard alive for the lifetime of your application
    /// let _guard = LogConfig::debug().with_file("logs/vqpy.log").init().unwrap();
    /// ```
    pub fn init(self) -> Result<Option<WorkerGuard>> {
        let env_filter = self.filter()?;
        let already_set =
            |e: tracing_subscriber::util::TryInitError| Error::InvalidOperation(e.to_string());

        match &self.output {
            LogOutput::Stdout => {
                let registry = tracing_subscriber::registry().with(env_filter);
                let installed = match self.format {
                    LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
                    LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                };
                installed.map_err(already_set)?;
                Ok(None)
            }
            LogOutput::File(path) => {
                let (writer, guard) = rolling_writer(path);
                let registry = tracing_subscriber::registry().with(env_filter);
                let layer = fmt::layer().with_writer(writer).with_ansi(false);
                let installed = match self.format {
                    LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
                    LogFormat::Compact => registry.with(layer.compact()).try_init(),
                };
                installed.map_err(already_set)?;
                Ok(Some(guard))
            }
            LogOutput::Both(path) => {
                let (writer, guard) = rolling_writer(path);
                // The file always gets compact lines without colour codes
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer())
                    .with(fmt::layer().with_writer(writer).with_ansi(false).compact())
                    .try_init()
                    .map_err(already_set)?;
                Ok(Some(guard))
            }
        }
    }
}

fn rolling_writer(path: &Path) -> (NonBlocking, WorkerGuard) {
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    let appender = tracing_appender::rolling::daily(directory, file_name);
    tracing_appender::non_blocking(appender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.output, LogOutput::Stdout);
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_log_config_builders() {
        let config = LogConfig::trace()
            .with_file("/tmp/vqpy-test.log")
            .with_format(LogFormat::Pretty);
        assert_eq!(config.level, "trace");
        assert!(matches!(config.output, LogOutput::File(_)));
        assert_eq!(config.format, LogFormat::Pretty);

        let config = LogConfig::warn().with_both("vqpy.log");
        assert!(matches!(config.output, LogOutput::Both(_)));
    }

    #[test]
    fn test_filter_directives() {
        let config = LogConfig::default().with_level("vqpy_core::query=trace,warn");
        assert!(config.filter().is_ok());
    }
}
