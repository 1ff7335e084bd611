//! Error types for release distribution.
//!
//! Errors never cross the workflow boundary as faults: the downloader turns
//! them into [`DownloadEvent::Error`](crate::download::DownloadEvent) messages
//! and the distributor logs them. They surface as `Result`s only from
//! constructors, the persisted store, and the install backend.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for distribution operations
pub type Result<T> = std::result::Result<T, DistributeError>;

/// Message reported when the response body is a text/HTML page instead of the artifact.
pub const NOT_A_FILE_MESSAGE: &str = "The requested download does not appear to be a file.";

/// Message reported when the platform cannot resolve the install request.
pub const INSTALLER_NOT_FOUND_MESSAGE: &str = "Installer not found";

/// Main error type for all distribution operations
#[derive(Error, Debug)]
pub enum DistributeError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO errors with the file and operation that caused them
    #[error("IO error while {operation} {}: {source}", path.display())]
    Fs {
        /// Operation being performed
        operation: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Connect or read failures
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed download or redirect URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Content-type sniff found a text payload
    #[error("{}", NOT_A_FILE_MESSAGE)]
    NotAFile,

    /// The body finished without a single byte
    #[error("The downloaded file is empty.")]
    EmptyDownload,

    /// No platform handler accepts the install request
    #[error("{}", INSTALLER_NOT_FOUND_MESSAGE)]
    InstallerNotFound,

    /// The installer was found but could not be started
    #[error("Failed to launch installer {program}: {reason}")]
    Launch {
        /// Program that was launched
        program: String,
        /// Reason for the error
        reason: String,
    },

    /// Persisted workflow metadata is missing or unparsable
    #[error("Corrupted persisted state: {reason}")]
    CorruptedState {
        /// Reason for the error
        reason: String,
    },

    /// Persisted store could not be read or written
    #[error("Store error for key {key}: {reason}")]
    Store {
        /// Key being accessed
        key: String,
        /// Reason for the error
        reason: String,
    },

    /// Downloads need a Tokio runtime to spawn the worker on
    #[error("No Tokio runtime available to run downloads")]
    NoRuntime,
}

impl DistributeError {
    /// Check if this error is recoverable by a later re-detection of the release
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DistributeError::Io(_)
                | DistributeError::Fs { .. }
                | DistributeError::Http(_)
                | DistributeError::EmptyDownload
        )
    }
}

/// Attaches the failing path and operation to IO errors.
pub trait ErrorExt<T> {
    /// Wraps an IO error as [`DistributeError::Fs`].
    fn fs_context(self, operation: &'static str, path: &Path) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, operation: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| DistributeError::Fs {
            operation,
            path: path.to_path_buf(),
            source,
        })
    }
}
