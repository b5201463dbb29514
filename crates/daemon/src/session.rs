//! Scoped ownership of a remote session.
//!
//! A [`SessionGuard`] owns exactly one session. Releasing it explicitly with
//! [`SessionGuard::release`] closes the session in place; a guard dropped
//! without release (early return, panic, cancelled request) closes the session
//! on the current Tokio runtime instead.

use std::ops::Deref;

use tracing::{debug, warn};

use crate::files::remote::RemoteFileService;

/// Owns one remote session and guarantees it is released once.
pub struct SessionGuard<S: RemoteFileService> {
    session: Option<S>,
}

impl<S: RemoteFileService> SessionGuard<S> {
    /// Take ownership of a freshly connected session.
    pub fn new(session: S) -> Self {
        debug!("Remote session acquired");
        Self {
            session: Some(session),
        }
    }

    /// Close the session now.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            debug!("Remote session released");
        }
    }

    /// Release the session and hand back `value`.
    ///
    /// Lets an operation finish with `guard.finish(result).await`.
    pub async fn finish<T>(self, value: T) -> T {
        self.release().await;
        value
    }
}

impl<S: RemoteFileService> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        // Only `release` and `drop` take the session, and both consume the guard.
        match &self.session {
            Some(session) => session,
            None => unreachable!("session guard used after release"),
        }
    }
}

impl<S: RemoteFileService> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    session.close().await;
                    debug!("Remote session released after drop");
                });
            }
            Err(_) => {
                warn!("No runtime available, dropping remote session without close");
                drop(session);
            }
        }
    }
}
