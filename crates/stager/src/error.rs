//! Error types for the staging pipeline with context for every failing stage

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving, fetching, extracting or distributing a release
#[derive(Error, Debug)]
pub enum StageError {
    /// The configuration environment variable is not set
    #[error("Environment variable '{variable}' is not set")]
    MissingEnvironment { variable: String },

    /// The configuration envelope is not valid base64
    #[error("Environment variable '{variable}' does not contain valid base64")]
    ConfigDecode {
        variable: String,
        #[source]
        source: base64::DecodeError,
    },

    /// The decoded configuration is not valid JSON for the expected schema
    #[error("Configuration in '{variable}' is not valid JSON")]
    ConfigParse {
        variable: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
        suggestion: Option<String>,
    },

    /// URL parsing errors with helpful suggestions
    #[error("Invalid URL '{url}': {suggestion}")]
    InvalidUrl {
        url: String,
        suggestion: String,
        #[source]
        source: url::ParseError,
    },

    /// The update endpoint did not report a usable release
    #[error("Update check against '{url}' failed: {message}")]
    Resolution {
        url: String,
        message: String,
        body: Option<String>,
    },

    /// HTTP-related errors with context
    #[error("HTTP request to '{url}' failed")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// File system I/O errors with file context
    #[error("File operation failed on '{path}' while {operation}")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// The archive is malformed or unreadable
    #[error("Failed to extract archive '{archive}'")]
    Extraction {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// An archive entry would be written outside the extraction directory
    #[error("Archive '{archive}' contains an unsafe entry '{entry}'")]
    UnsafeEntry { archive: PathBuf, entry: String },

    /// Moving a kept path into the category directory failed
    #[error("Failed to move '{from}' to '{to}' for pattern '{pattern}'")]
    Move {
        pattern: String,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Deleting an excluded path failed
    #[error("Failed to delete '{path}' for exclude pattern '{pattern}'")]
    Delete {
        pattern: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A keep or exclude pattern is not a valid glob
    #[error("Invalid pattern '{pattern}'")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A blocking task panicked or was cancelled
    #[error("Background task '{task}' did not complete")]
    TaskFailed {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, PartialEq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    CreateDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

pub type Result<T> = std::result::Result<T, StageError>;

impl StageError {
    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            StageError::MissingEnvironment { .. } => "missing_environment",
            StageError::ConfigDecode { .. } => "config_decode",
            StageError::ConfigParse { .. } => "config_parse",
            StageError::Configuration { .. } => "configuration",
            StageError::InvalidUrl { .. } => "invalid_url",
            StageError::Resolution { .. } => "resolution",
            StageError::HttpRequest { .. } => "http_request",
            StageError::FileSystem { .. } => "file_system",
            StageError::Extraction { .. } => "extraction",
            StageError::UnsafeEntry { .. } => "unsafe_entry",
            StageError::Move { .. } => "move",
            StageError::Delete { .. } => "delete",
            StageError::Pattern { .. } => "pattern",
            StageError::TaskFailed { .. } => "task_failed",
        }
    }

    /// Get user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            StageError::MissingEnvironment { .. } => {
                Some("Export the base64-encoded JSON configuration before running")
            }
            StageError::ConfigDecode { .. } => {
                Some("Encode the configuration with standard base64 (e.g. `base64 -w0 config.json`)")
            }
            StageError::Configuration { suggestion, .. } => suggestion.as_deref(),
            StageError::InvalidUrl { suggestion, .. } => Some(suggestion),
            StageError::Move { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists => {
                Some("Remove the existing destination or enable overwrite")
            }
            _ => None,
        }
    }

    /// Wrap a URL parse failure together with the offending input
    pub fn invalid_url(url: &str, error: url::ParseError) -> Self {
        let suggestion = match error {
            url::ParseError::EmptyHost => "URL must have a valid hostname",
            url::ParseError::InvalidPort => "Port number must be between 1 and 65535",
            url::ParseError::RelativeUrlWithoutBase => "URL must be absolute (include http:// or https://)",
            _ => "Check URL format and try again",
        }.to_string();

        StageError::InvalidUrl {
            url: url.to_string(),
            suggestion,
            source: error,
        }
    }
}
