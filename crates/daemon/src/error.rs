//! Error types for gateway operations.

use thiserror::Error;

use crate::files::confinement::ConfinementError;
use crate::files::remote::RemoteError;

/// Errors returned by [`Gateway`](crate::gateway::Gateway) operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The requested path escapes the confinement root.
    #[error(transparent)]
    OutsideRoot(#[from] ConfinementError),

    /// The operation would delete the confinement root.
    #[error("cannot delete confinement root: {0}")]
    ProtectedPath(String),

    /// The target has the wrong kind or the path is malformed.
    #[error("invalid target {path}: {reason}")]
    InvalidTarget { path: String, reason: &'static str },

    /// The remote entry does not exist.
    #[error("does not exist: {0}")]
    NotFound(String),

    /// The directory has contents and recursive removal was not requested.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The tree is deeper than the removal limit.
    #[error("directory tree deeper than {limit} levels at {path}")]
    TreeTooDeep { path: String, limit: usize },

    /// Reading the caller's inbound byte stream failed.
    #[error("inbound stream failed: {0}")]
    Inbound(#[source] std::io::Error),

    /// Any other remote failure, with the path that triggered it.
    #[error("remote operation failed on {path}: {source}")]
    Remote {
        path: String,
        #[source]
        source: RemoteError,
    },
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Wrap a remote error, keeping the path it concerns.
    pub fn remote(path: impl Into<String>, source: RemoteError) -> Self {
        GatewayError::Remote {
            path: path.into(),
            source,
        }
    }

    /// Wrap a remote error, classifying a missing entry as [`GatewayError::NotFound`].
    pub fn from_remote(path: impl Into<String>, source: RemoteError) -> Self {
        let path = path.into();
        if source.is_not_found() {
            GatewayError::NotFound(path)
        } else {
            GatewayError::remote(path, source)
        }
    }

    /// Shorthand for [`GatewayError::InvalidTarget`].
    pub fn invalid_target(path: impl Into<String>, reason: &'static str) -> Self {
        GatewayError::InvalidTarget {
            path: path.into(),
            reason,
        }
    }
}
