//! Error types for the server core.

use std::path::PathBuf;

use super::ExitReason;

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The executable was not found.
    #[error("Executable not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied spawning {0}")]
    PermissionDenied(String),
    /// A standard stream was not piped.
    #[error("Process {0} not available")]
    MissingStream(&'static str),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    pub(crate) fn from_io(executable: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(executable.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(executable.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Errors raised while assembling a launch descriptor.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    /// `file` was never set on the builder.
    #[error("No server file configured")]
    MissingFile,

    /// A memory bound could not be parsed.
    #[error("Invalid memory setting {0:?}, expected <number><M|G>")]
    InvalidMemory(String),

    /// The ready pattern is not a valid regular expression.
    #[error("Invalid ready pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The working directory could not be derived from the server file.
    #[error("Cannot determine working directory for {0}")]
    NoWorkingDir(PathBuf),
}

/// Errors from operations on a running server instance.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    /// The process has exited; no further input or output is possible.
    #[error("Server process has stopped")]
    Stopped,

    /// The process exited before printing its ready banner.
    #[error("Server exited before becoming ready ({0})")]
    ExitedBeforeReady(ExitReason),

    /// A bounded wait elapsed.
    #[error("Timed out waiting for server output")]
    Timeout,

    /// Writing to the process input failed.
    #[error("Failed to write to server stdin: {0}")]
    Io(#[from] std::io::Error),
}
