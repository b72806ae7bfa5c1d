//! Error types - one taxonomy for every binding layer
//!
//! Design: non-fatal errors travel as `Result` values and are reported once
//! through the context's error hook; fatal errors end the process.

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A runtime value could not be converted to the requested native type
    TypeMismatch,
    /// A global named as a function is not a function
    UndefinedFunction,
    /// A script raised while running under a protected call
    ProtectedCallFailure,
    /// The runtime or a binding block could not be allocated
    AllocationFailure,
    /// An unprotected runtime error reached the panic handler
    PanicFatal,
    /// The API was used against its contract (bad handle, duplicate class, ...)
    Usage,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Expected '{expected}' value, got '{got}'")]
    TypeMismatch { expected: String, got: String },

    #[error("integer {value} does not fit in '{target}'")]
    OutOfRange { value: i64, target: &'static str },

    #[error("Function {name} undefined")]
    UndefinedFunction { name: String },

    #[error("{0}")]
    ProtectedCall(String),

    #[error("{0}")]
    Syntax(String),

    #[error("Expected {expected} arguments, got {got}")]
    ArgumentCount { expected: String, got: i32 },

    #[error("class '{class}' is already registered")]
    AlreadyRegistered { class: String },

    #[error("type '{type_name}' has no registered class")]
    ClassNotRegistered { type_name: &'static str },

    #[error("object model is disabled for this context")]
    ObjectModelDisabled,

    #[error("property '{field}' of '{class}' is read-only")]
    ReadOnly { class: String, field: String },

    #[error("property '{field}' of '{class}' is write-only")]
    WriteOnly { class: String, field: String },

    #[error("'{class}' has no member '{member}'")]
    UnknownMember { class: String, member: String },

    #[error("invalid '{class}' instance")]
    InvalidInstance { class: String },

    #[error("'{class}' instance is already borrowed")]
    InstanceBorrowed { class: String },

    #[error("callable handle is empty")]
    InvalidHandle,

    #[error("native callback panicked: {0}")]
    CallbackPanic(String),

    #[error("Could not allocate {0}")]
    Allocation(&'static str),

    #[error("unprotected runtime error: {0}")]
    Panic(String),

    #[error("runtime context is closed")]
    ContextClosed,
}

impl Error {
    pub(crate) fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TypeMismatch { .. } | Error::OutOfRange { .. } => ErrorKind::TypeMismatch,
            Error::UndefinedFunction { .. } => ErrorKind::UndefinedFunction,
            Error::ProtectedCall(_) | Error::Syntax(_) => ErrorKind::ProtectedCallFailure,
            Error::Allocation(_) => ErrorKind::AllocationFailure,
            Error::Panic(_) => ErrorKind::PanicFatal,
            Error::ArgumentCount { .. }
            | Error::AlreadyRegistered { .. }
            | Error::ClassNotRegistered { .. }
            | Error::ObjectModelDisabled
            | Error::ReadOnly { .. }
            | Error::WriteOnly { .. }
            | Error::UnknownMember { .. }
            | Error::InvalidInstance { .. }
            | Error::InstanceBorrowed { .. }
            | Error::InvalidHandle
            | Error::CallbackPanic(_)
            | Error::ContextClosed => ErrorKind::Usage,
        }
    }

    /// Fatal errors terminate the process instead of being reported
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AllocationFailure | ErrorKind::PanicFatal
        )
    }
}

/// Script position attached to a reported error
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub function: Option<String>,
    pub line: Option<u32>,
}

impl Location {
    /// Prefix `message` with whatever position is known
    pub fn annotate(&self, message: &str) -> String {
        match (&self.function, self.line) {
            (Some(function), Some(line)) => {
                format!("[Fn: {}, Line {}] {}", function, line, message)
            }
            (Some(function), None) => format!("[Fn: {}] {}", function, message),
            (None, Some(line)) => format!("[Line {}] {}", line, message),
            (None, None) => message.to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.function, self.line) {
            (Some(function), Some(line)) => write!(f, "{}:{}", function, line),
            (Some(function), None) => write!(f, "{}", function),
            (None, Some(line)) => write!(f, "line {}", line),
            (None, None) => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message() {
        let err = Error::mismatch("integer", "string");
        assert_eq!(err.to_string(), "Expected 'integer' value, got 'string'");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(Error::Allocation("runtime state").is_fatal());
        assert!(Error::Panic("boom".into()).is_fatal());
        assert!(!Error::InvalidHandle.is_fatal());
        assert_eq!(
            Error::UndefinedFunction { name: "f".into() }.to_string(),
            "Function f undefined"
        );
    }

    #[test]
    fn test_location_annotate() {
        let full = Location {
            function: Some("add3".into()),
            line: Some(4),
        };
        assert_eq!(full.annotate("oops"), "[Fn: add3, Line 4] oops");

        let line_only = Location {
            function: None,
            line: Some(7),
        };
        assert_eq!(line_only.annotate("oops"), "[Line 7] oops");
        assert_eq!(Location::default().annotate("oops"), "oops");
    }
}
