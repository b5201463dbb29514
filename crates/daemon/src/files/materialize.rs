//! Directory chain creation (`mkdir -p` over a remote session).

use tracing::debug;

use super::remote::RemoteFileService;
use crate::error::{GatewayError, Result};

/// Ensure every directory along `path` exists.
///
/// Walks from `/` to the leaf. Missing segments are created; existing
/// directories are left alone, so calling this twice is a no-op the second
/// time. A segment that exists but is not a directory fails with
/// [`GatewayError::InvalidTarget`] naming that segment.
pub async fn ensure_directory<S: RemoteFileService>(session: &S, path: &str) -> Result<()> {
    let mut current = String::new();

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);

        match session.stat(&current).await {
            Ok(attrs) if attrs.is_directory => {}
            Ok(_) => {
                return Err(GatewayError::invalid_target(
                    current,
                    "a path segment exists and is not a directory",
                ));
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %current, "Creating missing directory");
                session
                    .make_directory(&current)
                    .await
                    .map_err(|e| GatewayError::remote(current.clone(), e))?;
            }
            Err(e) => return Err(GatewayError::remote(current, e)),
        }
    }

    Ok(())
}
