//! Remote directory browsing.
//!
//! Listings are produced fresh for every call and are never cached. Entry
//! order is whatever the remote side reports; callers needing a stable order
//! sort on their side.

use super::remote::{RemoteAttributes, RemoteEntry, RemoteFileService};
use crate::error::{GatewayError, Result};

/// List every entry of a remote directory, hidden names included.
///
/// A missing directory yields [`GatewayError::NotFound`]; a path that exists
/// but is not a directory yields [`GatewayError::InvalidTarget`].
pub async fn list_directory<S: RemoteFileService>(
    session: &S,
    path: &str,
) -> Result<Vec<RemoteEntry>> {
    let attrs = stat_entry(session, path).await?;
    if !attrs.is_directory {
        return Err(GatewayError::invalid_target(path, "not a directory"));
    }

    let entries = session
        .list_entries(path)
        .await
        .map_err(|e| GatewayError::from_remote(path, e))?;

    Ok(entries
        .into_iter()
        .filter(|e| e.name != "." && e.name != "..")
        .collect())
}

/// Stat a path, classifying a missing entry as [`GatewayError::NotFound`].
pub async fn stat_entry<S: RemoteFileService>(session: &S, path: &str) -> Result<RemoteAttributes> {
    session
        .stat(path)
        .await
        .map_err(|e| GatewayError::from_remote(path, e))
}

/// Whether a directory has no entries.
pub async fn is_empty_directory<S: RemoteFileService>(session: &S, path: &str) -> Result<bool> {
    Ok(list_directory(session, path).await?.is_empty())
}
