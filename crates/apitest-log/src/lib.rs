//! Logging infrastructure for apitest.
//!
//! Request/response dumps and lifecycle events are plain `tracing` events;
//! this crate decides where they go.

use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter, TestWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable names read by [`LogConfig::from_env`].
pub mod vars {
    pub const APITEST_LOG_LEVEL: &str = "APITEST_LOG_LEVEL";
    pub const APITEST_LOG_FORMAT: &str = "APITEST_LOG_FORMAT";
    pub const APITEST_LOG_FILE: &str = "APITEST_LOG_FILE";
    pub const APITEST_LOG_SOURCE: &str = "APITEST_LOG_SOURCE";
    pub const APITEST_LOG_SPANS: &str = "APITEST_LOG_SPANS";
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Log file path (if file logging enabled).
    pub file_path: Option<PathBuf>,
    /// Include source location.
    pub source_location: bool,
    /// Include span events.
    pub span_events: bool,
    /// Route console output through libtest's capture instead of stderr.
    pub test_writer: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing_subscriber::filter::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
            LogLevel::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
            LogLevel::Info => tracing_subscriber::filter::LevelFilter::INFO,
            LogLevel::Warn => tracing_subscriber::filter::LevelFilter::WARN,
            LogLevel::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        }
    }
}

impl LogLevel {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Directive string understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format.
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// JSON structured format.
    Json,
}

impl LogFormat {
    /// Parse from string, falling back to [`LogFormat::Pretty`].
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            file_path: None,
            source_location: false,
            span_events: false,
            test_writer: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup(vars::APITEST_LOG_LEVEL).or_else(|| lookup(vars::RUST_LOG)) {
            if let Some(l) = LogLevel::parse(&level) {
                config.level = l;
            }
        }

        if let Some(format) = lookup(vars::APITEST_LOG_FORMAT) {
            config.format = LogFormat::parse(&format);
        }

        if let Some(file_path) = lookup(vars::APITEST_LOG_FILE) {
            config.file_path = Some(PathBuf::from(file_path));
        }

        if let Some(source_location) = lookup(vars::APITEST_LOG_SOURCE) {
            config.source_location = is_truthy(&source_location);
        }

        if let Some(span_events) = lookup(vars::APITEST_LOG_SPANS) {
            config.span_events = is_truthy(&span_events);
        }

        config
    }

    /// Config used by test suites: debug level, captured output.
    pub fn for_tests() -> Self {
        Self {
            level: LogLevel::Debug,
            source_location: true,
            test_writer: true,
            ..Self::default()
        }
    }

    fn fmt_span(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

fn is_truthy(value: &str) -> bool {
    value.to_lowercase() == "true" || value == "1"
}

fn fmt_layer<S, W>(config: &LogConfig, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(config.fmt_span());

    match config.format {
        LogFormat::Pretty => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Initialize logging with the given configuration.
///
/// `RUST_LOG` directives take precedence over `config.level`.
pub fn init(config: LogConfig) -> Result<(), LogError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let console = if config.test_writer {
        fmt_layer(&config, TestWriter::new(), false)
    } else {
        fmt_layer(&config, io::stderr, true)
    };

    let file = match &config.file_path {
        Some(file_path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)?;
            Some(fmt_layer(&config, Mutex::new(file), false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| LogError::InitError(e.to_string()))
}

/// Initialize test logging once per process; later calls are no-ops.
pub fn init_for_tests() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Another subscriber may already be installed by the host test binary.
        let _ = init(LogConfig::for_tests());
    });
}

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to initialize logging: {0}")]
    InitError(String),

    #[error("failed to open log file: {0}")]
    FileError(#[from] io::Error),
}

/// Convenience macros re-exported from tracing.
pub use tracing::{debug, error, info, trace, warn};

/// Spans around request lifecycles.
pub mod spans;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("Warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("invalid"), None);
    }

    #[test]
    fn test_log_level_from() {
        use tracing_subscriber::filter::LevelFilter;
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
        assert_eq!(LevelFilter::from(LogLevel::Info), LevelFilter::INFO);
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::ERROR);
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file_path.is_none());
        assert!(!config.source_location);
        assert!(!config.span_events);
        assert!(!config.test_writer);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = LogConfig::from_lookup(lookup_from(&[
            ("APITEST_LOG_LEVEL", "debug"),
            ("APITEST_LOG_FORMAT", "json"),
            ("APITEST_LOG_FILE", "/tmp/apitest.log"),
            ("APITEST_LOG_SOURCE", "true"),
            ("APITEST_LOG_SPANS", "1"),
        ]));

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/apitest.log")));
        assert!(config.source_location);
        assert!(config.span_events);
    }

    #[test]
    fn test_rust_log_fallback() {
        let config = LogConfig::from_lookup(lookup_from(&[("RUST_LOG", "warn")]));
        assert_eq!(config.level, LogLevel::Warn);

        let config = LogConfig::from_lookup(lookup_from(&[
            ("RUST_LOG", "warn"),
            ("APITEST_LOG_LEVEL", "trace"),
        ]));
        assert_eq!(config.level, LogLevel::Trace);
    }

    #[test]
    fn test_unknown_format_is_pretty() {
        assert_eq!(LogFormat::parse("xml"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
    }

    #[test]
    fn test_for_tests_config() {
        let config = LogConfig::for_tests();
        assert!(config.test_writer);
        assert_eq!(config.level, LogLevel::Debug);
    }

    #[test]
    fn test_init_for_tests_is_idempotent() {
        init_for_tests();
        init_for_tests();
        tracing::debug!("still logging");
    }
}
