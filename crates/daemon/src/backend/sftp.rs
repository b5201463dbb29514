//! SFTP backend built on `russh` and `russh-sftp`.
//!
//! Every gateway operation opens its own SSH connection, authenticates with a
//! password, starts the `sftp` subsystem and closes everything again when the
//! session is released. Nothing is pooled or reused across operations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::fs::File;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::files::remote::{
    mode_is_directory, mode_is_symlink, RemoteAttributes, RemoteEntry, RemoteError, RemoteFileService,
    SessionConnector,
};

/// Connection settings for the SFTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SftpSettings {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Bound on connect, handshake and authentication.
    pub connect_timeout: Duration,
    /// Expected SHA-256 host key fingerprint. `None` accepts any key.
    pub host_key_fingerprint: Option<String>,
}

/// Opens one authenticated SFTP session per gateway operation.
pub struct SftpConnector {
    settings: Arc<SftpSettings>,
    ssh_config: Arc<client::Config>,
}

impl SftpConnector {
    /// Create a connector for the given server.
    pub fn new(settings: SftpSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            ssh_config: Arc::new(client::Config::default()),
        }
    }

    /// Server address as `host:port`, for logs.
    pub fn address(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    async fn open(&self) -> Result<SftpRemote, RemoteError> {
        let settings = &self.settings;
        let handler = HostKeyCheck {
            host: settings.host.clone(),
            expected: settings.host_key_fingerprint.clone(),
        };

        let mut handle = client::connect(
            self.ssh_config.clone(),
            (settings.host.as_str(), settings.port),
            handler,
        )
        .await
        .map_err(connection_error)?;

        let authenticated = handle
            .authenticate_password(settings.username.clone(), settings.password.clone())
            .await
            .map_err(connection_error)?;
        if !authenticated {
            return Err(RemoteError::Connection(format!(
                "authentication rejected for user {}",
                settings.username
            )));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(connection_error)?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(connection_error)?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| map_sftp("sftp subsystem", e))?;

        Ok(SftpRemote {
            sftp,
            handle: Mutex::new(handle),
        })
    }
}

impl SessionConnector for SftpConnector {
    type Session = SftpRemote;

    async fn connect(&self) -> Result<SftpRemote, RemoteError> {
        debug!(address = %self.address(), "Opening SFTP session");
        match tokio::time::timeout(self.settings.connect_timeout, self.open()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Connection(format!(
                "timed out after {:?} connecting to {}",
                self.settings.connect_timeout,
                self.address()
            ))),
        }
    }
}

/// Verifies the server host key against an optional pinned fingerprint.
struct HostKeyCheck {
    host: String,
    expected: Option<String>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();

        match &self.expected {
            Some(expected) => {
                let matches = expected.trim_start_matches("SHA256:") == fingerprint;
                if !matches {
                    warn!(
                        host = %self.host,
                        fingerprint = %fingerprint,
                        "SFTP host key does not match pinned fingerprint"
                    );
                }
                Ok(matches)
            }
            None => {
                warn!(
                    host = %self.host,
                    fingerprint = %fingerprint,
                    "Accepting unpinned SFTP host key"
                );
                Ok(true)
            }
        }
    }
}

/// One live SFTP session.
pub struct SftpRemote {
    sftp: SftpSession,
    handle: Mutex<Handle<HostKeyCheck>>,
}

fn connection_error(err: russh::Error) -> RemoteError {
    RemoteError::Connection(err.to_string())
}

fn map_sftp(path: &str, err: SftpError) -> RemoteError {
    match err {
        SftpError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => RemoteError::NotFound(path.to_string()),
            StatusCode::PermissionDenied => {
                RemoteError::PermissionDenied(format!("{path}: {}", status.error_message))
            }
            StatusCode::NoConnection | StatusCode::ConnectionLost => {
                RemoteError::Connection(format!("{path}: {}", status.error_message))
            }
            _ => RemoteError::Failure(format!("{path}: {}", status.error_message)),
        },
        other => RemoteError::Failure(format!("{path}: {other}")),
    }
}

fn attributes(attrs: &FileAttributes) -> RemoteAttributes {
    let permissions = attrs.permissions.unwrap_or(0);
    RemoteAttributes {
        size: attrs.size.unwrap_or(0),
        permissions,
        is_directory: mode_is_directory(permissions),
        is_symlink: mode_is_symlink(permissions),
        modified: attrs.mtime.map(u64::from).unwrap_or(0),
    }
}

impl RemoteFileService for SftpRemote {
    type Reader = File;
    type Writer = File;

    async fn stat(&self, path: &str) -> Result<RemoteAttributes, RemoteError> {
        let attrs = self.sftp.metadata(path).await.map_err(|e| map_sftp(path, e))?;
        Ok(attributes(&attrs))
    }

    async fn symlink_metadata(&self, path: &str) -> Result<RemoteAttributes, RemoteError> {
        let attrs = self
            .sftp
            .symlink_metadata(path)
            .await
            .map_err(|e| map_sftp(path, e))?;
        Ok(attributes(&attrs))
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let dir = self.sftp.read_dir(path).await.map_err(|e| map_sftp(path, e))?;

        Ok(dir
            .into_iter()
            .map(|entry| RemoteEntry::from_attributes(entry.file_name(), attributes(&entry.metadata())))
            .filter(|entry| entry.name != "." && entry.name != "..")
            .collect())
    }

    async fn open_for_read(&self, path: &str) -> Result<File, RemoteError> {
        self.sftp.open(path).await.map_err(|e| map_sftp(path, e))
    }

    async fn open_for_write(&self, path: &str) -> Result<File, RemoteError> {
        self.sftp.create(path).await.map_err(|e| map_sftp(path, e))
    }

    async fn make_directory(&self, path: &str) -> Result<(), RemoteError> {
        self.sftp.create_dir(path).await.map_err(|e| map_sftp(path, e))
    }

    async fn remove_directory(&self, path: &str) -> Result<(), RemoteError> {
        self.sftp.remove_dir(path).await.map_err(|e| map_sftp(path, e))
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        self.sftp.remove_file(path).await.map_err(|e| map_sftp(path, e))
    }

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        let mut attrs = FileAttributes::empty();
        attrs.permissions = Some(mode);
        self.sftp
            .set_metadata(path, attrs)
            .await
            .map_err(|e| map_sftp(path, e))
    }

    async fn close(self) {
        if let Err(e) = self.sftp.close().await {
            debug!(error = %e, "Closing SFTP channel failed");
        }

        let handle = self.handle.into_inner();
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(error = %e, "SSH disconnect failed");
        }
    }
}
