//! Remote file service capability.
//!
//! The gateway never talks to a transport directly. It asks a
//! [`SessionConnector`] for one session per operation and drives the session
//! through the [`RemoteFileService`] primitives.

use std::future::Future;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// File type mask of a Unix mode.
pub const S_IFMT: u32 = 0o170_000;
/// Directory file type.
pub const S_IFDIR: u32 = 0o040_000;
/// Symbolic link file type.
pub const S_IFLNK: u32 = 0o120_000;

/// Whether Unix mode bits describe a directory.
pub fn mode_is_directory(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

/// Whether Unix mode bits describe a symbolic link.
pub fn mode_is_symlink(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

/// Errors reported by a remote file service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote entry does not exist.
    #[error("no such file: {0}")]
    NotFound(String),

    /// The remote side refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Connecting or authenticating failed, or the connection dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Any other remote failure.
    #[error("remote failure: {0}")]
    Failure(String),

    /// IO error while streaming.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether this error reports a missing entry.
    pub fn is_not_found(&self) -> bool {
        match self {
            RemoteError::NotFound(_) => true,
            RemoteError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Attributes returned by [`RemoteFileService::stat`] and
/// [`RemoteFileService::symlink_metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAttributes {
    /// Size in bytes.
    pub size: u64,
    /// Full Unix mode (file type and permission bits).
    pub permissions: u32,
    /// Whether the path is a directory.
    pub is_directory: bool,
    /// Whether the path is a symbolic link. Only set by `symlink_metadata`.
    pub is_symlink: bool,
    /// Last modification time (Unix epoch seconds).
    pub modified: u64,
}

/// A single entry of a remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Full Unix mode (file type and permission bits).
    pub permissions: u32,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Last modification time (Unix epoch seconds).
    pub modified: u64,
}

impl RemoteEntry {
    /// Build an entry from a name and its attributes.
    pub fn from_attributes(name: impl Into<String>, attrs: RemoteAttributes) -> Self {
        Self {
            name: name.into(),
            size: attrs.size,
            permissions: attrs.permissions,
            is_directory: attrs.is_directory,
            modified: attrs.modified,
        }
    }

    /// Convert to the wire representation.
    pub fn to_protocol(&self) -> protocol::messages::FileItem {
        protocol::messages::FileItem {
            name: self.name.clone(),
            size: self.size,
            mode: format!("{:#o}", self.permissions),
            is_dir: self.is_directory,
            mtime: self.modified,
        }
    }
}

/// Primitive operations against one live remote session.
///
/// Paths are absolute POSIX strings that have already been confined.
pub trait RemoteFileService: Send + Sync + Sized + 'static {
    /// Handle returned by [`open_for_read`](Self::open_for_read).
    type Reader: AsyncRead + Send + Unpin + 'static;
    /// Handle returned by [`open_for_write`](Self::open_for_write).
    type Writer: AsyncWrite + Send + Unpin;

    /// Stat a path, following symbolic links.
    fn stat(&self, path: &str) -> impl Future<Output = Result<RemoteAttributes, RemoteError>> + Send;

    /// Stat a path without following a final symbolic link.
    fn symlink_metadata(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<RemoteAttributes, RemoteError>> + Send;

    /// List the entries of a directory, excluding `.` and `..`.
    fn list_entries(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<RemoteEntry>, RemoteError>> + Send;

    /// Open an existing file for reading.
    fn open_for_read(&self, path: &str) -> impl Future<Output = Result<Self::Reader, RemoteError>> + Send;

    /// Create or truncate a file for writing.
    fn open_for_write(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Self::Writer, RemoteError>> + Send;

    /// Create a single directory.
    fn make_directory(&self, path: &str) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Remove an empty directory.
    fn remove_directory(&self, path: &str) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Remove a file.
    fn remove_file(&self, path: &str) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Set the permission bits of a path.
    fn set_permissions(
        &self,
        path: &str,
        mode: u32,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Release the session.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Produces a fresh session for each gateway operation.
pub trait SessionConnector: Send + Sync + 'static {
    /// Session type handed out by this connector.
    type Session: RemoteFileService;

    /// Open and authenticate a new session.
    fn connect(&self) -> impl Future<Output = Result<Self::Session, RemoteError>> + Send;
}
