//! Backend error family.
//!
//! Every failure a store or lookup can produce is a [`BackendError`]; callers that
//! only care about the category match on [`BackendError::kind`].

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the filesystem backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Storage root is missing and could not (or may not) be created.
    #[error("storage root unavailable: {}: {reason}", path.display())]
    RootUnavailable { path: PathBuf, reason: String },

    /// Destination already exists and rewrite was not requested.
    #[error("file names collision: {} already exists", path.display())]
    NameCollision { path: PathBuf },

    /// Streamed store called with a handle that cannot act as an upload.
    #[error("unsupported upload source: {0}")]
    UnsupportedSource(String),

    /// File-based store called with a missing or non-regular source.
    #[error("unable to locate file {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Any other filesystem failure, propagated unchanged.
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Category tag for a [`BackendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RootUnavailable,
    NameCollision,
    UnsupportedSource,
    SourceNotFound,
    Io,
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::RootUnavailable { .. } => ErrorKind::RootUnavailable,
            BackendError::NameCollision { .. } => ErrorKind::NameCollision,
            BackendError::UnsupportedSource(_) => ErrorKind::UnsupportedSource,
            BackendError::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            BackendError::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        BackendError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::RootUnavailable => "RootUnavailable",
            ErrorKind::NameCollision => "NameCollision",
            ErrorKind::UnsupportedSource => "UnsupportedSource",
            ErrorKind::SourceNotFound => "SourceNotFound",
            ErrorKind::Io => "IOFailure",
        };
        f.write_str(name)
    }
}

/// Result alias for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
