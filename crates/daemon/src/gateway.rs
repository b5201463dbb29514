//! Gateway orchestration.
//!
//! The [`Gateway`] composes confinement, directory materialization, tree
//! removal and streaming transfer into the six operations exposed to callers.
//! Each operation resolves its path first, then acquires exactly one session
//! from the connector and releases it on every exit path.

use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::files::browser::{is_empty_directory, list_directory};
use crate::files::confinement::{self, ResolvedPath};
use crate::files::materialize::ensure_directory;
use crate::files::remote::{RemoteEntry, RemoteFileService, SessionConnector};
use crate::files::remover::{remove_tree, RemovalSummary};
use crate::files::transfer::{self, Download, TransferOptions};
use crate::session::SessionGuard;

/// Default bound on directory nesting during recursive removal.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Immutable settings of a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Absolute confinement root on the remote side.
    pub root_dir: String,
    /// Chunk size and mode for transfers.
    pub transfer: TransferOptions,
    /// Maximum directory depth for recursive removal.
    pub max_depth: usize,
}

impl GatewayConfig {
    /// Settings with defaults for everything but the root.
    pub fn new(root_dir: impl Into<String>) -> Self {
        Self {
            root_dir: confinement::normalize(&root_dir.into()),
            transfer: TransferOptions::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Result of a directory listing.
#[derive(Debug, Clone)]
pub struct Listing {
    /// Absolute path that was listed.
    pub path: String,
    /// Entries in remote order.
    pub entries: Vec<RemoteEntry>,
}

/// Result of a directory deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRemoval {
    /// Absolute path that was removed.
    pub path: String,
    /// Whether removal was recursive.
    pub recursive: bool,
    /// What was removed.
    pub summary: RemovalSummary,
}

/// Confined remote-filesystem gateway.
pub struct Gateway<C: SessionConnector> {
    config: GatewayConfig,
    connector: C,
}

impl<C: SessionConnector> Gateway<C> {
    /// Create a gateway over `connector`.
    pub fn new(config: GatewayConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// The gateway settings.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The confinement root.
    pub fn root(&self) -> &str {
        &self.config.root_dir
    }

    /// Resolve a caller path against the root.
    pub fn resolve(&self, relative: &str) -> Result<ResolvedPath> {
        confinement::resolve(&self.config.root_dir, relative).map_err(|e| {
            warn!(path = %relative, "Rejected path outside confined root");
            GatewayError::from(e)
        })
    }

    async fn acquire(&self) -> Result<SessionGuard<C::Session>> {
        let session = self.connector.connect().await.map_err(|e| {
            warn!(error = %e, "Failed to acquire remote session");
            GatewayError::remote(self.root(), e)
        })?;
        Ok(SessionGuard::new(session))
    }

    fn ensure_not_root(&self, target: &ResolvedPath) -> Result<()> {
        if target.as_str() == self.root() {
            warn!(path = %target, "Refusing to delete confinement root");
            return Err(GatewayError::ProtectedPath(target.to_string()));
        }
        Ok(())
    }

    /// List a directory.
    pub async fn list(&self, path: &str) -> Result<Listing> {
        let target = self.resolve(path)?;
        debug!(path = %target, "Listing directory");

        let session = self.acquire().await?;
        let result = list_directory(&*session, target.as_str()).await;
        let entries = session.finish(result).await?;

        Ok(Listing {
            path: target.into_string(),
            entries,
        })
    }

    /// Create a directory and any missing parents.
    pub async fn make_directory(&self, path: &str) -> Result<String> {
        let target = self.resolve(path)?;
        debug!(path = %target, "Ensuring directory");

        let session = self.acquire().await?;
        let result = ensure_directory(&*session, target.as_str()).await;
        session.finish(result).await?;

        info!(path = %target, "Directory ensured");
        Ok(target.into_string())
    }

    /// Upload `source` to `remote_path`, returning the absolute path and the
    /// number of bytes written.
    ///
    /// A `remote_path` ending in `/` names a directory and is rejected before
    /// any session is acquired.
    pub async fn upload<R>(&self, remote_path: &str, source: &mut R) -> Result<(String, u64)>
    where
        R: AsyncRead + Unpin + Send,
    {
        if remote_path.ends_with('/') {
            return Err(GatewayError::invalid_target(
                remote_path,
                "remote_path must name a file (no trailing /)",
            ));
        }
        let target = self.resolve(remote_path)?;
        debug!(path = %target, "Uploading file");

        let session = self.acquire().await?;
        let result = transfer::upload(&*session, &target, source, self.config.transfer).await;
        let written = session.finish(result).await?;

        info!(path = %target, bytes = written, "File uploaded");
        Ok((target.into_string(), written))
    }

    /// Open a file for streaming download.
    ///
    /// The returned stream owns the session and releases it when dropped.
    pub async fn download(&self, remote_path: &str) -> Result<Download<C::Session>> {
        let target = self.resolve(remote_path)?;
        debug!(path = %target, "Opening download");

        let session = self.acquire().await?;
        let download = transfer::download(session, &target, self.config.transfer.chunk_size).await?;

        info!(path = %target, "Download started");
        Ok(download)
    }

    /// Delete a single file.
    pub async fn delete_file(&self, remote_path: &str) -> Result<String> {
        let target = self.resolve(remote_path)?;
        self.ensure_not_root(&target)?;
        debug!(path = %target, "Deleting file");

        let session = self.acquire().await?;
        let result = async {
            // A link to a directory is unlinked like any other file
            let attrs = session
                .symlink_metadata(target.as_str())
                .await
                .map_err(|e| GatewayError::from_remote(target.as_str(), e))?;
            if attrs.is_directory {
                return Err(GatewayError::invalid_target(
                    target.as_str(),
                    "is a directory; use delete-dir",
                ));
            }
            session
                .remove_file(target.as_str())
                .await
                .map_err(|e| GatewayError::from_remote(target.as_str(), e))
        }
        .await;
        session.finish(result).await?;

        info!(path = %target, "File deleted");
        Ok(target.into_string())
    }

    /// Delete a directory, refusing non-empty ones unless `recursive`.
    pub async fn delete_directory(&self, remote_path: &str, recursive: bool) -> Result<DirectoryRemoval> {
        let target = self.resolve(remote_path)?;
        self.ensure_not_root(&target)?;
        debug!(path = %target, recursive, "Deleting directory");

        let session = self.acquire().await?;
        let result = async {
            let attrs = session
                .symlink_metadata(target.as_str())
                .await
                .map_err(|e| GatewayError::from_remote(target.as_str(), e))?;
            if attrs.is_symlink {
                return Err(GatewayError::invalid_target(
                    target.as_str(),
                    "is a symbolic link; use delete-file",
                ));
            }
            if !attrs.is_directory {
                return Err(GatewayError::invalid_target(target.as_str(), "not a directory"));
            }

            if recursive {
                return remove_tree(&*session, target.as_str(), self.root(), self.config.max_depth)
                    .await;
            }

            if !is_empty_directory(&*session, target.as_str()).await? {
                return Err(GatewayError::DirectoryNotEmpty(target.to_string()));
            }
            session
                .remove_directory(target.as_str())
                .await
                .map_err(|e| GatewayError::remote(target.as_str(), e))?;
            Ok(RemovalSummary {
                files: 0,
                directories: 1,
            })
        }
        .await;
        let summary = session.finish(result).await?;

        info!(
            path = %target,
            recursive,
            files = summary.files,
            directories = summary.directories,
            "Directory deleted"
        );
        Ok(DirectoryRemoval {
            path: target.into_string(),
            recursive,
            summary,
        })
    }
}
