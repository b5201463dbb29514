//! Streaming file transfer over a remote session.
//!
//! Uploads copy from an inbound [`AsyncRead`] to the remote write handle in
//! bounded chunks. Downloads expose the remote read handle as a lazily
//! consumed, single-pass byte [`Stream`] that owns its session, so the session
//! lives exactly as long as the stream does.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::confinement::ResolvedPath;
use super::materialize::ensure_directory;
use super::remote::{RemoteError, RemoteFileService};
use crate::error::{GatewayError, Result};
use crate::session::SessionGuard;

/// Default chunk size for transfers (1MB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Maximum chunk size (16MB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Mode applied to uploaded files: owner read/write, group read.
pub const DEFAULT_UPLOAD_MODE: u32 = 0o640;

/// Tunables for a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Bytes moved per read/write step.
    pub chunk_size: usize,
    /// Permission bits set on uploaded files.
    pub upload_mode: u32,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_mode: DEFAULT_UPLOAD_MODE,
        }
    }
}

/// Write `source` to `target`, creating parent directories as needed.
///
/// Refuses to replace an existing directory. Returns the number of bytes
/// written. A failed transfer leaves the partially written remote file in
/// place.
pub async fn upload<S, R>(
    session: &S,
    target: &ResolvedPath,
    source: &mut R,
    options: TransferOptions,
) -> Result<u64>
where
    S: RemoteFileService,
    R: AsyncRead + Unpin + Send,
{
    let path = target.as_str();

    ensure_directory(session, &target.parent()).await?;

    match session.stat(path).await {
        Ok(attrs) if attrs.is_directory => {
            return Err(GatewayError::invalid_target(
                path,
                "target is an existing directory; use a file name",
            ));
        }
        Ok(_) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(GatewayError::remote(path, e)),
    }

    let mut writer = session
        .open_for_write(path)
        .await
        .map_err(|e| GatewayError::remote(path, e))?;

    let mut buffer = vec![0u8; options.chunk_size.clamp(1, MAX_CHUNK_SIZE)];
    let mut written: u64 = 0;

    loop {
        let n = source.read(&mut buffer).await.map_err(GatewayError::Inbound)?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buffer[..n])
            .await
            .map_err(|e| GatewayError::remote(path, RemoteError::Io(e)))?;
        written += n as u64;
    }

    writer
        .shutdown()
        .await
        .map_err(|e| GatewayError::remote(path, RemoteError::Io(e)))?;
    drop(writer);

    session
        .set_permissions(path, options.upload_mode)
        .await
        .map_err(|e| GatewayError::remote(path, e))?;

    debug!(path = %path, bytes = written, mode = %format!("{:o}", options.upload_mode), "Upload written");
    Ok(written)
}

/// An opened download.
pub struct Download<S: RemoteFileService> {
    /// Byte stream of the file content.
    pub stream: DownloadStream<S>,
    /// Final path segment, for response metadata.
    pub file_name: String,
}

/// Open `target` for streaming, transferring ownership of the session to the
/// returned stream.
///
/// On failure the session is released before the error is returned.
pub async fn download<S: RemoteFileService>(
    session: SessionGuard<S>,
    target: &ResolvedPath,
    chunk_size: usize,
) -> Result<Download<S>> {
    let reader = match open_reader(&*session, target).await {
        Ok(reader) => reader,
        Err(e) => return Err(session.finish(e).await),
    };

    Ok(Download {
        stream: DownloadStream {
            inner: ReaderStream::with_capacity(reader, chunk_size.clamp(1, MAX_CHUNK_SIZE)),
            sent: 0,
            path: target.to_string(),
            _session: session,
        },
        file_name: target.file_name().to_string(),
    })
}

async fn open_reader<S: RemoteFileService>(session: &S, target: &ResolvedPath) -> Result<S::Reader> {
    let path = target.as_str();

    let attrs = session
        .stat(path)
        .await
        .map_err(|e| GatewayError::from_remote(path, e))?;
    if attrs.is_directory {
        return Err(GatewayError::invalid_target(path, "target is a directory"));
    }

    session
        .open_for_read(path)
        .await
        .map_err(|e| GatewayError::from_remote(path, e))
}

/// Single-pass byte stream over a remote file.
///
/// Holds the session that opened the file; dropping the stream, whether
/// exhausted or abandoned by a disconnecting caller, releases the session.
pub struct DownloadStream<S: RemoteFileService> {
    inner: ReaderStream<S::Reader>,
    sent: u64,
    path: String,
    _session: SessionGuard<S>,
}

// The guard is never pinned; only `inner` is polled, and it is `Unpin`.
impl<S: RemoteFileService> Unpin for DownloadStream<S> {}

impl<S: RemoteFileService> Stream for DownloadStream<S> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_next(cx);
        match &poll {
            Poll::Ready(Some(Ok(chunk))) => this.sent += chunk.len() as u64,
            Poll::Ready(None) => debug!(path = %this.path, bytes = this.sent, "Download finished"),
            _ => {}
        }
        poll
    }
}
