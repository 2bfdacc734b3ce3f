use std::io;
use std::path::PathBuf;
use std::str::Utf8Error;
use thiserror::Error;

/// Result type for pipeline module operations
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors a stage can raise or report to its host
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ModuleError {
    /// Configuration document could not be read
    #[error("Cannot open/read the configuration file at path {1}")]
    OpenConfig(#[source] io::Error, PathBuf),

    /// Configuration document is not well-formed or lacks required keys
    #[error("Cannot parse module configuration")]
    ParseConfig(#[source] toml::de::Error),

    /// Configuration parsed but holds an unusable value
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Caller supplied only one of the two acknowledgement callbacks
    #[error("Acknowledgement callbacks must be supplied together (accepted: {accepted}, completed: {completed})")]
    UnpairedAcknowledgement { accepted: bool, completed: bool },

    /// Stage has already been started
    #[error("Stage has already been started")]
    AlreadyStarted,

    /// Stage was shut down twice
    #[error("Stage has already been shut down")]
    AlreadyShutdown,

    /// I/O failure the stage cannot recover from
    #[error("{context}")]
    Fatal {
        context: String,
        #[source]
        source: io::Error,
    },

    /// I/O failure that may clear up on a later batch
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A single input item failed validation
    #[error(transparent)]
    Malformed(#[from] MalformedItem),

    /// Event record could not be serialized into a data item
    #[error("Cannot encode data item")]
    Encode(#[source] serde_json::Error),

    /// The source timer thread could not be created
    #[error("Cannot spawn timer thread")]
    Spawn(#[source] io::Error),
}

impl ModuleError {
    /// Wraps an I/O error that the host should treat as terminal for the stage
    pub fn fatal(context: impl Into<String>, source: io::Error) -> Self {
        ModuleError::Fatal {
            context: context.into(),
            source,
        }
    }
}

/// Why an input item was dropped
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MalformedItem {
    /// Item is not of the type the stage consumes
    #[error("Expected data item of type {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },

    /// Sample payload is not a string
    #[error("Data item payload is not valid UTF-8")]
    InvalidUtf8(#[from] Utf8Error),

    /// Event payload does not decode as an event record
    #[error("Data item payload is not a valid event record")]
    InvalidEvent(#[source] serde_json::Error),
}

/// Whether a failed side effect should keep the stage alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Report and keep requesting data
    Transient,
    /// Report and stop; the host tears the stage down
    Fatal,
}

impl FailureClass {
    /// Classifies an I/O failure. A missing path is only fatal when
    /// `missing_is_fatal` is set; stages that create their target treat it as
    /// transient.
    pub fn of_io(err: &io::Error, missing_is_fatal: bool) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::Unsupported => FailureClass::Fatal,
            io::ErrorKind::NotFound if missing_is_fatal => FailureClass::Fatal,
            _ => FailureClass::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_fatal() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(FailureClass::of_io(&err, false), FailureClass::Fatal);
    }

    #[test]
    fn test_missing_path_depends_on_stage() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(FailureClass::of_io(&err, true), FailureClass::Fatal);
        assert_eq!(FailureClass::of_io(&err, false), FailureClass::Transient);
    }

    #[test]
    fn test_interrupted_is_transient() {
        let err = io::Error::from(io::ErrorKind::Interrupted);
        assert_eq!(FailureClass::of_io(&err, true), FailureClass::Transient);
    }

    #[test]
    fn test_fatal_display_uses_context() {
        let err = ModuleError::fatal(
            "Cannot write /tmp/x",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.to_string(), "Cannot write /tmp/x");
    }
}
