//! Context configuration - TOML file, environment overrides, error hooks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Load the runtime's standard libraries into new contexts
    #[serde(default = "default_true")]
    pub open_libs: bool,

    /// Allow class registration
    #[serde(default = "default_true")]
    pub object_model: bool,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Reject calls whose argument count differs from the bound arity
    #[serde(default = "default_false")]
    pub strict_arity: bool,

    #[serde(default)]
    pub on_error: ErrorPolicy,

    /// Prefix reported messages with the script function and line
    #[serde(default = "default_true")]
    pub source_locations: bool,
}

/// What a native entry point does with an error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Report once, abort the native call, return no results
    #[default]
    Report,
    /// Raise a script error at the call site
    Raise,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            open_libs: true,
            object_model: true,
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strict_arity: false,
            on_error: ErrorPolicy::Report,
            source_locations: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Defaults with `LUNABIND_*` environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        // LUNABIND_OPEN_LIBS / LUNABIND_OBJECT_MODEL / LUNABIND_STRICT_ARITY: 1, true, 0, false
        if let Some(flag) = env_flag("LUNABIND_OPEN_LIBS") {
            self.open_libs = flag;
        }
        if let Some(flag) = env_flag("LUNABIND_OBJECT_MODEL") {
            self.object_model = flag;
        }
        if let Some(flag) = env_flag("LUNABIND_STRICT_ARITY") {
            self.dispatch.strict_arity = flag;
        }

        // LUNABIND_ON_ERROR: report, raise
        if let Ok(policy) = std::env::var("LUNABIND_ON_ERROR") {
            match parse_policy(&policy) {
                Some(policy) => self.dispatch.on_error = policy,
                None => tracing::warn!(value = %policy, "Ignoring unknown LUNABIND_ON_ERROR"),
            }
        }

        self
    }

    pub fn with_open_libs(mut self, enabled: bool) -> Self {
        self.open_libs = enabled;
        self
    }

    pub fn with_object_model(mut self, enabled: bool) -> Self {
        self.object_model = enabled;
        self
    }

    pub fn with_strict_arity(mut self, enabled: bool) -> Self {
        self.dispatch.strict_arity = enabled;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.dispatch.on_error = policy;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|value| parse_flag(&value))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_policy(value: &str) -> Option<ErrorPolicy> {
    match value.trim().to_lowercase().as_str() {
        "report" | "skip" => Some(ErrorPolicy::Report),
        "raise" => Some(ErrorPolicy::Raise),
        _ => None,
    }
}

type Hook = Rc<dyn Fn(&str)>;

/// Callbacks invoked with every reported message
///
/// `on_error` receives non-fatal messages. `on_fatal` receives the last
/// message before the process exits with status 1.
#[derive(Clone)]
pub struct ErrorHandlers {
    on_error: Hook,
    on_fatal: Hook,
}

impl Default for ErrorHandlers {
    fn default() -> Self {
        Self {
            on_error: Rc::new(|message| tracing::error!(event = "script_error", "{}", message)),
            on_fatal: Rc::new(|message| tracing::error!(event = "fatal_error", "{}", message)),
        }
    }
}

impl ErrorHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(mut self, hook: impl Fn(&str) + 'static) -> Self {
        self.on_error = Rc::new(hook);
        self
    }

    pub fn on_fatal(mut self, hook: impl Fn(&str) + 'static) -> Self {
        self.on_fatal = Rc::new(hook);
        self
    }

    pub(crate) fn error(&self, message: &str) {
        (self.on_error)(message)
    }

    pub(crate) fn fatal(&self, message: &str) -> ! {
        (self.on_fatal)(message);
        std::process::exit(1)
    }
}

impl fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandlers").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.open_libs);
        assert!(config.object_model);
        assert!(!config.dispatch.strict_arity);
        assert_eq!(config.dispatch.on_error, ErrorPolicy::Report);
        assert!(config.dispatch.source_locations);
    }

    #[test]
    fn test_parse_partial() {
        let config = Config::parse(
            r#"
            open_libs = false

            [dispatch]
            on_error = "raise"
            "#,
        )
        .unwrap();

        assert!(!config.open_libs);
        assert!(config.object_model);
        assert_eq!(config.dispatch.on_error, ErrorPolicy::Raise);
        assert!(config.dispatch.source_locations);
    }

    #[test]
    fn test_empty_document_matches_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
        assert_eq!(Config::parse("[dispatch]\n").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_rejects_unknown_policy() {
        let result = Config::parse("[dispatch]\non_error = \"ignore\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "object_model = false").unwrap();
        writeln!(file, "[dispatch]").unwrap();
        writeln!(file, "strict_arity = true").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(!config.object_model);
        assert!(config.dispatch.strict_arity);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_flag_parsing() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(parse_policy("skip"), Some(ErrorPolicy::Report));
        assert_eq!(parse_policy("Raise"), Some(ErrorPolicy::Raise));
    }

    #[test]
    fn test_handlers_receive_messages() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let handlers =
            ErrorHandlers::new().on_error(move |m| sink.borrow_mut().push(m.to_string()));

        handlers.error("first");
        handlers.error("second");
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }
}
