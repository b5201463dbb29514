//! Wire message definitions for the SFTP gateway.
//!
//! This module defines the request and response bodies exchanged between the
//! HTTP gateway and its clients. All messages are serialized as JSON.

use serde::{Deserialize, Serialize};

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Service name reported by the health check.
pub const SERVICE_NAME: &str = "sftp-gateway";

// ============================================================================
// Requests
// ============================================================================

/// Query for `GET /list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Directory to list, relative to the gateway root.
    #[serde(default = "root_path")]
    pub path: String,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self { path: root_path() }
    }
}

fn root_path() -> String {
    "/".to_string()
}

/// Form body for `POST /mkdir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirForm {
    /// Directory to create, relative to the gateway root.
    pub path: String,
}

/// Query for `GET /download` and `DELETE /delete-file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePathQuery {
    /// Target path, relative to the gateway root.
    pub remote_path: String,
}

/// Query for `DELETE /delete-dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDirQuery {
    /// Directory to delete, relative to the gateway root.
    pub remote_path: String,
    /// Remove the directory together with everything below it.
    #[serde(default)]
    pub recursive: bool,
}

/// Multipart field names accepted by `POST /upload`.
pub mod upload_fields {
    /// Destination path field. Must precede the file field.
    pub const REMOTE_PATH: &str = "remote_path";
    /// File content field.
    pub const FILE: &str = "file";
}

// ============================================================================
// Responses
// ============================================================================

/// Liveness check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            ok: true,
            service: SERVICE_NAME.to_string(),
        }
    }
}

/// A single entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    /// Entry name (not full path).
    pub name: String,
    /// Size in bytes as reported by the remote side.
    pub size: u64,
    /// Mode bits rendered in octal, e.g. `0o100644`.
    pub mode: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Last modification time (Unix epoch seconds).
    pub mtime: u64,
}

/// Response for `GET /list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub ok: bool,
    /// Absolute path that was listed.
    pub path: String,
    /// Entries in remote order.
    pub items: Vec<FileItem>,
}

/// Response for `POST /mkdir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirResponse {
    pub ok: bool,
    /// Absolute path of the ensured directory.
    pub created: String,
}

/// Response for `POST /upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub ok: bool,
    /// Absolute path of the written file.
    pub path: String,
    /// Number of bytes written.
    pub bytes_written: u64,
}

/// Response for `DELETE /delete-file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub ok: bool,
    /// Absolute path that was removed.
    pub deleted: String,
}

/// Response for `DELETE /delete-dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDirResponse {
    pub ok: bool,
    /// Absolute path that was removed.
    pub deleted: String,
    /// Whether the removal was recursive.
    pub recursive: bool,
}

// ============================================================================
// Errors
// ============================================================================

/// Stable error codes so callers can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing or wrong API key.
    Unauthorized,
    /// Path escapes the confinement root.
    OutsideRoot,
    /// Attempt to delete the confinement root.
    ProtectedPath,
    /// Remote entry does not exist.
    NotFound,
    /// Wrong entry kind or malformed target path.
    InvalidTarget,
    /// Directory has contents and recursive removal was not requested.
    DirectoryNotEmpty,
    /// Directory tree exceeds the removal depth limit.
    TreeTooDeep,
    /// Malformed request.
    InvalidRequest,
    /// The remote side reported a failure.
    RemoteFailure,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub ok: bool,
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub detail: String,
}

impl ErrorBody {
    /// Create an error body.
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            code,
            detail: detail.into(),
        }
    }
}
