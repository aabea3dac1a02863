//! Error types for loadconfig
//!
//! Structured errors carrying context: the offending key or file, an
//! optional source location, and an actionable help message.

use std::fmt;

/// Result type alias for loadconfig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for loadconfig operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Key in the config where the error occurred (e.g., "checkconfig")
    pub path: Option<String>,
    /// Source location (file, line) if available
    pub source_location: Option<SourceLocation>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Location in a source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed YAML, unknown tag or a document that is not a mapping
    Parse,
    /// Removing or dispatching on a key that doesn't exist
    PathNotFound,
    /// A `-C=` option named a file that could not be read
    ConfigFileNotFound { path: String },
    /// A registered validator rejected the configuration
    Validation { validator: String },
    /// `checkconfig` named a validator nobody registered
    UnknownValidator { name: String },
    /// Validator already registered
    AlreadyRegistered { name: String },
    /// The CLI schema under `clg` is malformed
    Schema,
    /// Argument parsing stopped: help, version or a usage error.
    /// The rendered text is in `cause`.
    Exit { code: i32 },
    /// `command0` has no registered handler
    UnknownCommand { name: String },
    /// I/O error
    Io,
    /// Internal error (bug in loadconfig)
    Internal,
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            source_location: None,
            help: None,
            cause: None,
        }
    }

    /// Create a new parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Parse)
        }
    }

    /// Create a path not found error
    pub fn path_not_found(path: impl Into<String>) -> Self {
        let path_str = path.into();
        Self {
            help: Some(format!(
                "Check that '{}' exists in the configuration",
                path_str
            )),
            path: Some(path_str),
            ..Self::new(ErrorKind::PathNotFound)
        }
    }

    /// Create a config file not found error for a `-C=` option
    pub fn config_file_not_found(file_path: impl Into<String>) -> Self {
        let fp = file_path.into();
        Self {
            help: Some(
                "Pass an existing file, or a directory containing config.conf".into(),
            ),
            ..Self::new(ErrorKind::ConfigFileNotFound { path: fp })
        }
    }

    /// Create a validation error; the validator's message is kept verbatim
    pub fn validation(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some("checkconfig".into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Validation {
                validator: validator.into(),
            })
        }
    }

    /// Create an unknown validator error
    pub fn unknown_validator(name: impl Into<String>) -> Self {
        let n = name.into();
        Self {
            path: Some("checkconfig".into()),
            help: Some(format!("Register the '{}' validator or check for typos", n)),
            ..Self::new(ErrorKind::UnknownValidator { name: n })
        }
    }

    /// Create a validator already registered error
    pub fn already_registered(name: impl Into<String>) -> Self {
        let n = name.into();
        Self {
            help: Some(format!(
                "Use register_with_force(..., true) to override the '{}' validator",
                n
            )),
            ..Self::new(ErrorKind::AlreadyRegistered { name: n })
        }
    }

    /// Create a CLI schema error
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Schema)
        }
    }

    /// Create an exit request carrying the argument parser's rendered text
    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Exit { code })
        }
    }

    /// Create an unknown command error
    pub fn unknown_command(name: impl Into<String>) -> Self {
        let n = name.into();
        Self {
            path: Some("command0".into()),
            help: Some(format!("Register a handler for the '{}' command", n)),
            ..Self::new(ErrorKind::UnknownCommand { name: n })
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Io)
        }
    }

    /// Create an internal error (bug in loadconfig)
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            help: Some("This is likely a bug in loadconfig. Please report it.".into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Internal)
        }
    }

    /// Add path context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add source location to the error
    pub fn with_source_location(mut self, loc: SourceLocation) -> Self {
        self.source_location = Some(loc);
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Exit status requested by the argument parser, if this is an exit
    pub fn exit_code(&self) -> Option<i32> {
        match self.kind {
            ErrorKind::Exit { code } => Some(code),
            _ => None,
        }
    }

    /// The underlying message, verbatim
    pub fn message(&self) -> Option<&str> {
        self.cause.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Help/usage text is shown exactly as the parser rendered it
        if let ErrorKind::Exit { .. } = self.kind {
            return write!(f, "{}", self.cause.as_deref().unwrap_or_default());
        }

        match &self.kind {
            ErrorKind::Parse => write!(f, "Parse error")?,
            ErrorKind::PathNotFound => write!(f, "Path not found")?,
            ErrorKind::ConfigFileNotFound { path } => {
                write!(f, "Config file not found: {}", path)?
            }
            ErrorKind::Validation { validator } => {
                write!(f, "Validation error (validator '{}')", validator)?
            }
            ErrorKind::UnknownValidator { name } => write!(f, "Unknown validator: {}", name)?,
            ErrorKind::AlreadyRegistered { name } => {
                write!(f, "Validator '{}' is already registered", name)?
            }
            ErrorKind::Schema => write!(f, "Invalid argument schema")?,
            ErrorKind::Exit { .. } => {}
            ErrorKind::UnknownCommand { name } => write!(f, "Unknown command: {}", name)?,
            ErrorKind::Io => write!(f, "I/O error")?,
            ErrorKind::Internal => write!(f, "Internal error")?,
        }

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(loc) = &self.source_location {
            write!(f, "\n  File: {}", loc.file)?;
            if let Some(line) = loc.line {
                write!(f, ":{}", line)?;
                if let Some(column) = loc.column {
                    write!(f, ":{}", column)?;
                }
            }
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_path_not_found_error() {
        let err = Error::path_not_found("database");

        assert_eq!(err.kind, ErrorKind::PathNotFound);
        assert_eq!(err.path, Some("database".into()));
        assert!(err.to_string().contains("Check that 'database' exists"));
    }

    #[test]
    fn test_config_file_not_found_display() {
        let err = Error::config_file_not_found("/etc/app/missing.conf");
        let display = format!("{}", err);

        assert!(display.contains("Config file not found: /etc/app/missing.conf"));
        assert!(display.contains("Help:"));
    }

    #[test]
    fn test_validation_error_keeps_message() {
        let err = Error::validation("valid_host", "host must not be empty");
        let display = format!("{}", err);

        assert!(display.contains("Validation error (validator 'valid_host')"));
        assert!(display.contains("Path: checkconfig"));
        assert_eq!(err.message(), Some("host must not be empty"));
    }

    #[test]
    fn test_unknown_validator_error() {
        let err = Error::unknown_validator("nope");
        let display = format!("{}", err);

        assert!(display.contains("Unknown validator: nope"));
        assert!(display.contains("Register the 'nope' validator"));
    }

    #[test]
    fn test_exit_displays_verbatim() {
        let err = Error::exit(1, "dbuild 0.4.3");

        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.to_string(), "dbuild 0.4.3");
    }

    #[test]
    fn test_exit_code_none_for_other_kinds() {
        assert_eq!(Error::parse("bad").exit_code(), None);
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("Unexpected state");
        let display = format!("{}", err);

        assert!(display.contains("Internal error"));
        assert!(display.contains("Unexpected state"));
    }

    #[test]
    fn test_with_source_location() {
        let err = Error::parse("syntax error").with_source_location(SourceLocation {
            file: "config.yaml".into(),
            line: Some(42),
            column: Some(7),
        });
        let display = format!("{}", err);

        assert!(display.contains("config.yaml:42:7"));
    }

    #[test]
    fn test_with_help() {
        let err = Error::parse("bad input").with_help("Try fixing the syntax");
        let display = format!("{}", err);

        assert!(display.contains("Help: Try fixing the syntax"));
    }

    #[test]
    fn test_schema_error() {
        let err = Error::schema("clg.options.port", "unknown type 'port'");
        let display = format!("{}", err);

        assert!(display.contains("Invalid argument schema"));
        assert!(display.contains("Path: clg.options.port"));
        assert!(display.contains("unknown type 'port'"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.message(), Some("gone"));
    }
}
