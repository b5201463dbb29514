//! Local filesystem backend.
//!
//! Serves the remote file primitives from the machine the gateway runs on,
//! using absolute paths as-is. Used for development setups without an SFTP
//! server and as the backend of the test suite.

use std::fs::{Metadata, Permissions};
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};

use tokio::fs::{self, File};

use crate::files::remote::{
    RemoteAttributes, RemoteEntry, RemoteError, RemoteFileService, SessionConnector,
};

/// Connector handing out [`LocalFileService`] sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

impl LocalConnector {
    /// Create a new local connector.
    pub fn new() -> Self {
        Self
    }
}

impl SessionConnector for LocalConnector {
    type Session = LocalFileService;

    async fn connect(&self) -> Result<LocalFileService, RemoteError> {
        Ok(LocalFileService::new())
    }
}

/// A "session" on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileService;

impl LocalFileService {
    /// Create a new local file service.
    pub fn new() -> Self {
        Self
    }
}

fn attributes(metadata: &Metadata) -> RemoteAttributes {
    RemoteAttributes {
        size: metadata.len(),
        permissions: metadata.mode(),
        is_directory: metadata.is_dir(),
        is_symlink: metadata.file_type().is_symlink(),
        modified: u64::try_from(metadata.mtime()).unwrap_or(0),
    }
}

fn map_io(path: &str, err: io::Error) -> RemoteError {
    match err.kind() {
        io::ErrorKind::NotFound => RemoteError::NotFound(path.to_string()),
        io::ErrorKind::PermissionDenied => RemoteError::PermissionDenied(path.to_string()),
        _ => RemoteError::Io(err),
    }
}

impl RemoteFileService for LocalFileService {
    type Reader = File;
    type Writer = File;

    async fn stat(&self, path: &str) -> Result<RemoteAttributes, RemoteError> {
        let metadata = fs::metadata(path).await.map_err(|e| map_io(path, e))?;
        Ok(attributes(&metadata))
    }

    async fn symlink_metadata(&self, path: &str) -> Result<RemoteAttributes, RemoteError> {
        let metadata = fs::symlink_metadata(path).await.map_err(|e| map_io(path, e))?;
        Ok(attributes(&metadata))
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let mut dir = fs::read_dir(path).await.map_err(|e| map_io(path, e))?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await.map_err(|e| map_io(path, e))? {
            // Listings report the link itself, not its target.
            let metadata = entry.metadata().await.map_err(|e| map_io(path, e))?;
            entries.push(RemoteEntry::from_attributes(
                entry.file_name().to_string_lossy().into_owned(),
                attributes(&metadata),
            ));
        }

        Ok(entries)
    }

    async fn open_for_read(&self, path: &str) -> Result<File, RemoteError> {
        File::open(path).await.map_err(|e| map_io(path, e))
    }

    async fn open_for_write(&self, path: &str) -> Result<File, RemoteError> {
        File::create(path).await.map_err(|e| map_io(path, e))
    }

    async fn make_directory(&self, path: &str) -> Result<(), RemoteError> {
        fs::create_dir(path).await.map_err(|e| map_io(path, e))
    }

    async fn remove_directory(&self, path: &str) -> Result<(), RemoteError> {
        fs::remove_dir(path).await.map_err(|e| map_io(path, e))
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        fs::remove_file(path).await.map_err(|e| map_io(path, e))
    }

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        fs::set_permissions(path, Permissions::from_mode(mode))
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn close(self) {}
}
