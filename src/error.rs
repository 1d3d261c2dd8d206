//! Error types for the reconciler

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur during a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileErrorKind {
    /// Required configuration is missing or invalid
    Config,
    /// A row has the wrong number of fields or an untyped field
    Format,
    /// I/O error while opening, reading or writing a file
    Io,
    /// A pipeline thread failed or could not be started
    Pipeline,
}

/// Represents an error that occurred during reconciliation
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}{}", location(.path, .line))]
pub struct ReconcileError {
    /// The kind of error
    pub kind: ReconcileErrorKind,
    /// The file where the error occurred
    pub path: Option<PathBuf>,
    /// 1-based line number inside `path`, for format errors
    pub line: Option<u64>,
    /// Human-readable error message
    pub message: String,
}

fn location(path: &Option<PathBuf>, line: &Option<u64>) -> String {
    match (path, line) {
        (Some(p), Some(l)) => format!(" ({}:{})", p.display(), l),
        (Some(p), None) => format!(" ({})", p.display()),
        (None, Some(l)) => format!(" (line {})", l),
        (None, None) => String::new(),
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    /// Create a new error
    pub fn new(kind: ReconcileErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: None,
            line: None,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ReconcileErrorKind::Config, message)
    }

    /// Create a format error for the given line
    pub fn format(line: u64, message: impl Into<String>) -> Self {
        Self::new(ReconcileErrorKind::Format, message).at_line(line)
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ReconcileErrorKind::Io, message)
    }

    /// Create a pipeline error
    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::new(ReconcileErrorKind::Pipeline, message)
    }

    /// Attach the file the error refers to, keeping an existing one
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        if self.path.is_none() {
            self.path = Some(path.into());
        }
        self
    }

    /// Attach a line number
    pub fn at_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }

    /// Whether this is a row format error
    pub fn is_format(&self) -> bool {
        self.kind == ReconcileErrorKind::Format
    }
}

impl From<std::io::Error> for ReconcileError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<walkdir::Error> for ReconcileError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let mut e = Self::io(err.to_string());
        e.path = path;
        e
    }
}

impl From<rayon::ThreadPoolBuildError> for ReconcileError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::pipeline(format!("failed to start worker pool: {}", err))
    }
}
