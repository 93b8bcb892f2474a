//! Error types for store operations.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Main error type for pkgvault store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Malformed integrity identifier. Never retried.
    InvalidIntegrity {
        integrity: String,
        reason: String,
    },
    /// No valid stored tree exists for the requested integrity.
    NotFound {
        integrity: String,
    },
    /// A filesystem operation failed, after retries where applicable.
    Io {
        operation: &'static str,
        path: Option<PathBuf>,
        source: io::Error,
    },
    /// The archive stream reported an error during extraction.
    Stream {
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn invalid_integrity(integrity: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidIntegrity {
            integrity: integrity.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(integrity: &str) -> Self {
        StoreError::NotFound {
            integrity: integrity.to_string(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            operation,
            path: Some(path.to_path_buf()),
            source,
        }
    }

    pub(crate) fn stream(source: io::Error) -> Self {
        StoreError::Stream { source }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidIntegrity { integrity, reason } => {
                write!(f, "invalid integrity '{}': {}", integrity, reason)
            }
            StoreError::NotFound { integrity } => {
                write!(f, "no stored package for integrity '{}'", integrity)
            }
            StoreError::Io { operation, path, source } => {
                write!(f, "I/O error in {}: {}", operation, source)?;
                if let Some(path) = path {
                    write!(f, " (path: {})", path.display())?;
                }
                Ok(())
            }
            StoreError::Stream { source } => {
                write!(f, "archive stream error: {}", source)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } | StoreError::Stream { source } => Some(source),
            _ => None,
        }
    }
}
