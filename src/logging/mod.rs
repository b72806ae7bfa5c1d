//! Tracing setup for embedders, plus the event helpers the binding layer
//! emits from.
//!
//! Nothing is installed unless the host calls [`init`] or [`init_logging`].
//! Every event carries an `event` field naming what happened to the runtime
//! (context lifetime, bindings, class instances, reported errors), so a JSON
//! sink can be filtered on it directly.

use once_cell::sync::OnceCell;
use std::path::Path;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::error::ErrorKind;

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// How runtime events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, for reading a failing script session by eye.
    #[default]
    Pretty,
    Compact,
    /// One object per event; `event`, `function` and `class` become keys.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Where runtime events are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogOutput {
    Stdout,
    /// Keeps script `print` output on stdout clean.
    #[default]
    Stderr,
    /// A file under `directory`, rolled over daily; `prefix` names the file.
    File { directory: String, prefix: String },
}

/// Settings for [`init_logging`].
///
/// The level applies to the `lunabind` target as a whole; `filter` narrows it
/// per module, e.g. `lunabind::class=trace` to watch instance finalization
/// without tracing every native call.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log span open and close, for hosts that wrap script calls in spans.
    pub span_events: bool,
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `LUNABIND_LOG_LEVEL`, `LUNABIND_LOG_FORMAT` and `LUNABIND_LOG_FILE`.
    ///
    /// Unset or unparsable variables keep the default for that field.
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|value| !value.is_empty());
        let defaults = Self::default();

        Self {
            level: env("LUNABIND_LOG_LEVEL")
                .and_then(|level| parse_level(&level))
                .unwrap_or(defaults.level),
            format: env("LUNABIND_LOG_FORMAT")
                .and_then(|format| format.parse().ok())
                .unwrap_or(defaults.format),
            output: env("LUNABIND_LOG_FILE")
                .map(|path| file_output(Path::new(&path)))
                .unwrap_or(defaults.output),
            ..defaults
        }
    }

    pub fn with_level(self, level: Level) -> Self {
        Self { level, ..self }
    }

    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn with_output(self, output: LogOutput) -> Self {
        Self { output, ..self }
    }

    pub fn with_span_events(self, span_events: bool) -> Self {
        Self {
            span_events,
            ..self
        }
    }

    /// Comma-separated directives layered over `level`.
    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..self
        }
    }
}

fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn file_output(path: &Path) -> LogOutput {
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string());
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "lunabind.log".to_string());

    LogOutput::File { directory, prefix }
}

/// Initialize logging from `LUNABIND_LOG_*` variables
pub fn init() -> Option<WorkerGuard> {
    init_logging(LogConfig::from_env())
}

/// Initialize the global logging system
///
/// Returns a `WorkerGuard` that must be kept alive so buffered lines are
/// flushed. Later calls, or a subscriber installed by the host, make this a
/// no-op returning `None`.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    if LOGGER_INITIALIZED.get().is_some() {
        return None;
    }

    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };

    let spans = span_events_config(config.span_events);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .pretty()
            .with_span_events(spans)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(writer)
            .compact()
            .with_span_events(spans)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(writer)
            .json()
            .with_span_events(spans)
            .boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(layer)
        .with(build_filter(&config))
        .try_init()
        .is_ok();

    LOGGER_INITIALIZED.get_or_init(|| ());
    installed.then_some(guard)
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(filter_str) => filter_str.split(',').fold(base_filter, |filter, directive| {
            filter.add_directive(directive.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid filter directive: {}", directive);
                config.level.into()
            }))
        }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

// ============================================================================
// Binding-layer logging functions
// ============================================================================

pub fn log_context_created(open_libs: bool, object_model: bool) {
    tracing::info!(
        event = "context_created",
        open_libs,
        object_model,
        "Runtime context created"
    );
}

pub fn log_context_closed(classes: usize) {
    tracing::info!(
        event = "context_closed",
        classes,
        "Runtime context closed"
    );
}

pub fn log_function_bound(name: &str, arity: i32, variadic: bool) {
    tracing::debug!(
        event = "function_bound",
        function = name,
        arity,
        variadic,
        "Native function bound"
    );
}

#[inline]
pub fn log_native_call(name: &str, args: i32) {
    tracing::trace!(
        event = "native_call",
        function = name,
        args,
        "Native function called"
    );
}

pub fn log_global_set(name: &str) {
    tracing::trace!(event = "global_set", global = name, "Global assigned");
}

pub fn log_class_registered(name: &str, properties: usize, methods: usize) {
    tracing::debug!(
        event = "class_registered",
        class = name,
        properties,
        methods,
        "Class registered"
    );
}

#[inline]
pub fn log_instance_created(class: &str, borrowed: bool) {
    tracing::trace!(
        event = "instance_created",
        class,
        borrowed,
        "Class instance pushed"
    );
}

#[inline]
pub fn log_instance_finalized(class: &str, released: bool) {
    tracing::trace!(
        event = "instance_finalized",
        class,
        released,
        "Class instance finalized"
    );
}

pub fn log_protected_call_failed(message: &str) {
    tracing::debug!(
        event = "protected_call_failed",
        error = message,
        "Protected call failed"
    );
}

pub fn log_reported_error(kind: ErrorKind, message: &str) {
    tracing::warn!(
        event = "error_reported",
        kind = ?kind,
        error = message,
        "Non-fatal error reported"
    );
}

pub fn log_fatal(message: &str) {
    tracing::error!(event = "fatal", error = message, "Fatal runtime error");
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_span_events(true)
            .with_filter("lunabind=trace");

        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert_eq!(config.filter, Some("lunabind=trace".to_string()));
    }

    #[test]
    fn test_file_output_split() {
        assert_eq!(
            file_output(Path::new("/var/log/lunabind.log")),
            LogOutput::File {
                directory: "/var/log".to_string(),
                prefix: "lunabind.log".to_string(),
            }
        );
        assert_eq!(
            file_output(Path::new("run.log")),
            LogOutput::File {
                directory: ".".to_string(),
                prefix: "run.log".to_string(),
            }
        );
    }

    #[test]
    fn test_format_names() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogConfig::default().output, LogOutput::Stderr);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_init_idempotent() {
        let _first = init_logging(LogConfig::new().with_level(Level::ERROR));
        let second = init_logging(LogConfig::new());
        assert!(second.is_none());
        assert!(is_initialized());
    }
}
