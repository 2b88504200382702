use std::path::PathBuf;

/// Result type alias for buildbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for buildbridge operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A single event frame could not be decoded. The stream survives one of
    /// these; the frame is skipped.
    #[error("undecodable event frame: {message}")]
    Transport { message: String },

    /// An event arrived that the current invocation state cannot account for
    /// (double start, finish without start). Logged, never fatal.
    #[error("inconsistent event stream: {message}")]
    ConsistencyAnomaly { message: String },

    /// A referenced artifact (stderr file, test report) is missing,
    /// unreadable, or unparsable
    #[error("resource '{uri}' unavailable: {message}")]
    ResourceUnavailable {
        uri: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// External tool invocation errors
    #[error("{}", format_command_error(.command, .args, .message, .exit_code))]
    CommandExecution {
        command: String,
        args: Vec<String>,
        message: String,
        exit_code: Option<i32>,
    },

    /// The caller cancelled the invocation before a terminal classification
    /// was observed
    #[error("invocation cancelled by the caller")]
    Cancelled,

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// A caller supplied a value that violates an invariant (e.g. an empty
    /// file-set identifier)
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Catch-all for internal failures surfaced through `ResultExt`
    #[error("internal error: {message}")]
    Internal { message: String },
}

fn format_command_error(
    command: &str,
    args: &[String],
    message: &str,
    exit_code: &Option<i32>,
) -> String {
    let args_str = args.join(" ");
    match exit_code {
        Some(code) => {
            if args_str.is_empty() {
                format!("command '{command}' failed with exit code {code}: {message}")
            } else {
                format!("command '{command} {args_str}' failed with exit code {code}: {message}")
            }
        }
        None => {
            if args_str.is_empty() {
                format!("command '{command}' failed: {message}")
            } else {
                format!("command '{command} {args_str}' failed: {message}")
            }
        }
    }
}

// Conversion implementations
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::Internal {
            message: format!("An internal error occurred: {error}"),
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a transport error for one undecodable frame
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }

    /// Create a consistency anomaly
    #[must_use]
    pub fn anomaly(message: impl Into<String>) -> Self {
        Error::ConsistencyAnomaly {
            message: message.into(),
        }
    }

    /// Create a resource unavailable error
    #[must_use]
    pub fn resource_unavailable(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ResourceUnavailable {
            uri: uri.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a resource unavailable error with a source error
    #[must_use]
    pub fn resource_unavailable_with_source(
        uri: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::ResourceUnavailable {
            uri: uri.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a command execution error
    #[must_use]
    pub fn command_execution(
        command: impl Into<String>,
        args: Vec<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Error::CommandExecution {
            command: command.into(),
            args,
            message: message.into(),
            exit_code,
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create an invalid input error
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput {
            message: message.into(),
        }
    }
}

// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a lazy message
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Internal {
                message: format!("{}: {}", message.into(), base_error),
            }
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Internal {
                message: format!("{}: {}", f(), base_error),
            }
        })
    }
}
