//! Recursive removal of remote directory trees.
//!
//! Removal is strictly post-order: a directory is removed only after all of
//! its children are gone, because the remote `rmdir` primitive fails on a
//! non-empty directory. The traversal uses an explicit stack bounded by a
//! maximum depth so that a server reporting a directory cycle cannot recurse
//! forever.
//!
//! There is no rollback. The first remote failure aborts the removal and the
//! tree is left in whatever state the remote side reached; the error names the
//! entry that could not be removed.

use tracing::{debug, info};

use super::confinement::{join, normalize};
use super::remote::{RemoteEntry, RemoteFileService};
use crate::error::{GatewayError, Result};

/// Counts of entries removed by [`remove_tree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    /// Files (and other non-directory entries) removed.
    pub files: usize,
    /// Directories removed, including the target itself.
    pub directories: usize,
}

/// A directory whose children are still being removed.
struct Frame {
    path: String,
    pending: Vec<RemoteEntry>,
}

/// Remove `path` and everything below it.
///
/// Fails with [`GatewayError::ProtectedPath`] before any remote call when
/// `path` normalizes to `root`. A non-directory target is removed as a file.
/// Symbolic links are never followed: a link is unlinked, its target is left
/// untouched.
pub async fn remove_tree<S: RemoteFileService>(
    session: &S,
    path: &str,
    root: &str,
    max_depth: usize,
) -> Result<RemovalSummary> {
    let target = normalize(path);
    if target == normalize(root) {
        return Err(GatewayError::ProtectedPath(target));
    }

    let mut summary = RemovalSummary::default();

    let attrs = session
        .symlink_metadata(&target)
        .await
        .map_err(|e| GatewayError::from_remote(target.clone(), e))?;

    if !attrs.is_directory {
        session
            .remove_file(&target)
            .await
            .map_err(|e| GatewayError::from_remote(target.clone(), e))?;
        summary.files += 1;
        return Ok(summary);
    }

    let pending = list_children(session, &target).await?;
    let mut stack = vec![Frame {
        path: target,
        pending,
    }];

    loop {
        let Some(frame) = stack.last_mut() else {
            break;
        };

        let Some(entry) = frame.pending.pop() else {
            if let Some(done) = stack.pop() {
                session
                    .remove_directory(&done.path)
                    .await
                    .map_err(|e| GatewayError::remote(done.path.clone(), e))?;
                debug!(path = %done.path, "Removed directory");
                summary.directories += 1;
            }
            continue;
        };

        let child = join(&frame.path, &entry.name);

        if entry.is_directory {
            if stack.len() >= max_depth {
                return Err(GatewayError::TreeTooDeep {
                    path: child,
                    limit: max_depth,
                });
            }
            let pending = list_children(session, &child).await?;
            stack.push(Frame {
                path: child,
                pending,
            });
        } else {
            session
                .remove_file(&child)
                .await
                .map_err(|e| GatewayError::remote(child.clone(), e))?;
            summary.files += 1;
        }
    }

    info!(
        files = summary.files,
        directories = summary.directories,
        "Directory tree removed"
    );

    Ok(summary)
}

async fn list_children<S: RemoteFileService>(session: &S, path: &str) -> Result<Vec<RemoteEntry>> {
    let entries = session
        .list_entries(path)
        .await
        .map_err(|e| GatewayError::from_remote(path, e))?;

    Ok(entries
        .into_iter()
        .filter(|e| e.name != "." && e.name != "..")
        .collect())
}
