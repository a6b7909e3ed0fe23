//! src/error.rs
//! ============================================================================
//! # `AppError`: Unified Error Type for the Navigator
//!
//! Every fallible operation in the crate returns `Result<T, AppError>`. The
//! variants are grouped the way the navigator reports them: validation errors
//! abort an operation before it mutates anything, per-item bulk errors are
//! rendered into numbered notifications, and everything filesystem-shaped
//! keeps the path it happened on.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Crate-wide result alias.
pub type AppResult<T> = Result<T, AppError>;

/// Unified error type for all navigator operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Standard IO error, auto-converted from `io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error retrieving file or directory metadata.
    #[error("Filesystem metadata error on {path:?}: {source}")]
    FsMetadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permissions error for file/directory access.
    #[error("Permission denied: {0:?}")]
    PermissionDenied(PathBuf),

    /// Requested file or directory does not exist.
    #[error("src does not exist: {0:?}")]
    NotFound(PathBuf),

    /// Glob syntax rejected while validating hiddenfiles, filters or selections.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Input validation errors
    #[error("Invalid input: {field} - {message}")]
    InvalidInput {
        field: String, // "tag", "mark", "sortby", etc.
        message: String,
    },

    #[error("empty directory")]
    EmptyDirectory,

    #[error("no file selected")]
    NoFileSelected,

    #[error("no file in copy/cut buffer")]
    EmptyCopyBuffer,

    #[error("no such mark: {0}")]
    NoSuchMark(char),

    /// A glob-select pattern matched nothing in the current listing.
    #[error("glob-select: pattern not found: {0}")]
    PatternNotFound(String),

    #[error("rename {src:?} {dst:?}: source and destination are the same file")]
    SelfMove { src: PathBuf, dst: PathBuf },

    /// File operation specific errors
    #[error("File operation '{operation}' failed on {path:?}: {reason}")]
    FileOperationFailed {
        operation: String, // "copy", "move", "delete", "rename", etc.
        path: PathBuf,
        reason: String,
    },

    /// Directory navigation errors
    #[error("Navigation failed: cannot access {path:?}: {reason}")]
    NavigationFailed { path: PathBuf, reason: String },

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// TOML config serialization error.
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Config file I/O error with path.
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A persisted marks/tags/copy-buffer file contained a line we cannot read.
    #[error("Malformed line {line} in {path:?}: {reason}")]
    MalformedState {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// External process failure (previewer, cleaner).
    #[error("External command failed: {cmd} (exit code: {code:?})\n{stderr}")]
    ExternalCmd {
        cmd: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Cross-process synchronization channel failure.
    #[error("Remote command failed: {0}")]
    Remote(String),

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(String),
}

impl AppError {
    #[must_use]
    /// Attach extra context to an error.
    pub fn with_context<S: Into<String>>(self, ctx: S) -> Self {
        Self::Other(format!("{}: {}", ctx.into(), self))
    }

    /// Create a file operation failure error
    pub fn file_operation_failed<S1, P, S2>(operation: S1, path: P, reason: S2) -> Self
    where
        S1: Into<String>,
        P: Into<PathBuf>,
        S2: Into<String>,
    {
        Self::FileOperationFailed {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a navigation failure error
    pub fn navigation_failed<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::NavigationFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an input validation error
    pub fn invalid_input<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a pattern syntax error
    pub fn invalid_pattern<S1: Into<String>, S2: Into<String>>(pattern: S1, reason: S2) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub fn remote_failed<S: Into<String>>(reason: S) -> Self {
        Self::Remote(reason.into())
    }

    /// Classify an `io::Error` that happened on `path`.
    pub fn from_io_at<P: Into<PathBuf>>(path: P, err: io::Error) -> Self {
        let path: PathBuf = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::FsMetadata { path, source: err },
        }
    }

    /// Whether this error means the path is gone.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) | Self::FsMetadata { source: e, .. } => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
