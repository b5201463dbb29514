//! Integration tests for the gateway over the local backend.
//!
//! These tests verify complete operation flows:
//! - Path confinement at the operation boundary
//! - Upload and download round trips
//! - Directory creation and deletion
//! - Session acquisition and release on every exit path

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use daemon::backend::LocalFileService;
use daemon::files::{RemoteAttributes, RemoteEntry, RemoteError, RemoteFileService, SessionConnector};
use daemon::{Gateway, GatewayConfig, GatewayError};
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::fs::File;

// =============================================================================
// Instrumented connector
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl Counters {
    fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Local connector that counts how many sessions are opened and closed.
struct CountingConnector {
    counters: Arc<Counters>,
}

struct CountingSession {
    inner: LocalFileService,
    counters: Arc<Counters>,
}

impl SessionConnector for CountingConnector {
    type Session = CountingSession;

    async fn connect(&self) -> Result<CountingSession, RemoteError> {
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(CountingSession {
            inner: LocalFileService::new(),
            counters: self.counters.clone(),
        })
    }
}

impl RemoteFileService for CountingSession {
    type Reader = File;
    type Writer = File;

    async fn stat(&self, path: &str) -> Result<RemoteAttributes, RemoteError> {
        self.inner.stat(path).await
    }

    async fn symlink_metadata(&self, path: &str) -> Result<RemoteAttributes, RemoteError> {
        self.inner.symlink_metadata(path).await
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.inner.list_entries(path).await
    }

    async fn open_for_read(&self, path: &str) -> Result<File, RemoteError> {
        self.inner.open_for_read(path).await
    }

    async fn open_for_write(&self, path: &str) -> Result<File, RemoteError> {
        self.inner.open_for_write(path).await
    }

    async fn make_directory(&self, path: &str) -> Result<(), RemoteError> {
        self.inner.make_directory(path).await
    }

    async fn remove_directory(&self, path: &str) -> Result<(), RemoteError> {
        self.inner.remove_directory(path).await
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        self.inner.remove_file(path).await
    }

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        self.inner.set_permissions(path, mode).await
    }

    async fn close(self) {
        self.inner.close().await;
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Create a gateway rooted at a fresh temporary directory.
fn create_gateway() -> (Gateway<CountingConnector>, Arc<Counters>, TempDir) {
    create_gateway_with(|_| {})
}

fn create_gateway_with(
    tweak: impl FnOnce(&mut GatewayConfig),
) -> (Gateway<CountingConnector>, Arc<Counters>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = GatewayConfig::new(temp_dir.path().to_string_lossy());
    tweak(&mut config);

    let counters = Arc::new(Counters::default());
    let connector = CountingConnector {
        counters: counters.clone(),
    };
    (Gateway::new(config, connector), counters, temp_dir)
}

/// Wait for a session released by a dropped guard on a spawned task.
async fn wait_for_release(counters: &Counters, expected: usize) {
    for _ in 0..100 {
        if counters.released() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} released sessions, saw {}",
        counters.released()
    );
}

async fn download_all(gateway: &Gateway<CountingConnector>, path: &str) -> Vec<u8> {
    let mut download = gateway.download(path).await.unwrap();
    let mut out = Vec::new();
    while let Some(chunk) = download.stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

// =============================================================================
// Confinement
// =============================================================================

#[tokio::test]
async fn test_climbing_out_of_root_is_rejected_without_session() {
    let (gateway, counters, _temp_dir) = create_gateway();

    let result = gateway.list("/uploads/../../etc/passwd").await;
    assert!(matches!(result, Err(GatewayError::OutsideRoot(_))));

    let result = gateway.delete_file("../../etc/passwd").await;
    assert!(matches!(result, Err(GatewayError::OutsideRoot(_))));

    assert_eq!(counters.acquired(), 0);
}

#[tokio::test]
async fn test_dot_dot_within_root_is_allowed() {
    let (gateway, _counters, temp_dir) = create_gateway();
    std::fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
    std::fs::write(temp_dir.path().join("a/b/x.txt"), "x").unwrap();

    let listing = gateway.list("/a/c/../b").await.unwrap();

    assert_eq!(listing.path, format!("{}/a/b", gateway.root()));
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.entries[0].name, "x.txt");
}

// =============================================================================
// Upload and download
// =============================================================================

#[tokio::test]
async fn test_upload_creates_missing_parents() {
    let (gateway, counters, temp_dir) = create_gateway();

    let mut body: &[u8] = b"%PDF-1.7 report";
    let (path, written) = gateway.upload("/docs/report.pdf", &mut body).await.unwrap();

    assert_eq!(path, format!("{}/docs/report.pdf", gateway.root()));
    assert_eq!(written, 15);
    assert!(temp_dir.path().join("docs").is_dir());

    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(temp_dir.path().join("docs/report.pdf"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o640);

    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_upload_trailing_separator_acquires_no_session() {
    let (gateway, counters, temp_dir) = create_gateway();

    let mut body: &[u8] = b"data";
    let result = gateway.upload("/a/b/", &mut body).await;

    assert!(matches!(result, Err(GatewayError::InvalidTarget { .. })));
    assert_eq!(counters.acquired(), 0);
    assert!(!temp_dir.path().join("a").exists());
}

#[tokio::test]
async fn test_upload_onto_directory_is_rejected() {
    let (gateway, counters, temp_dir) = create_gateway();
    std::fs::create_dir_all(temp_dir.path().join("reports")).unwrap();

    let mut body: &[u8] = b"data";
    let result = gateway.upload("/reports", &mut body).await;

    assert!(matches!(result, Err(GatewayError::InvalidTarget { .. })));
    assert!(temp_dir.path().join("reports").is_dir());
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_round_trip_larger_than_chunk() {
    let (gateway, counters, _temp_dir) = create_gateway_with(|config| {
        config.transfer.chunk_size = 1024;
    });
    let content: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();

    let mut body = content.as_slice();
    let (_, written) = gateway.upload("/blob.bin", &mut body).await.unwrap();
    assert_eq!(written, content.len() as u64);

    let downloaded = download_all(&gateway, "/blob.bin").await;
    assert_eq!(downloaded, content);

    wait_for_release(&counters, 2).await;
    assert_eq!(counters.acquired(), 2);
}

#[tokio::test]
async fn test_round_trip_empty_content() {
    let (gateway, _counters, _temp_dir) = create_gateway();

    let mut body: &[u8] = b"";
    let (_, written) = gateway.upload("/empty.txt", &mut body).await.unwrap();
    assert_eq!(written, 0);

    assert!(download_all(&gateway, "/empty.txt").await.is_empty());
}

#[tokio::test]
async fn test_abandoned_download_releases_session() {
    let (gateway, counters, temp_dir) = create_gateway_with(|config| {
        config.transfer.chunk_size = 16;
    });
    std::fs::write(temp_dir.path().join("big.bin"), vec![1u8; 4096]).unwrap();

    let mut download = gateway.download("/big.bin").await.unwrap();
    assert_eq!(download.file_name, "big.bin");
    let first = download.stream.next().await.unwrap().unwrap();
    assert_eq!(first.len(), 16);
    assert_eq!(counters.released(), 0);

    drop(download);
    wait_for_release(&counters, 1).await;
    assert_eq!(counters.acquired(), 1);
}

#[tokio::test]
async fn test_download_missing_releases_session() {
    let (gateway, counters, _temp_dir) = create_gateway();

    let result = gateway.download("/nope.txt").await;

    assert!(matches!(result, Err(GatewayError::NotFound(_))));
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

// =============================================================================
// Directories
// =============================================================================

#[tokio::test]
async fn test_make_directory_is_idempotent() {
    let (gateway, counters, temp_dir) = create_gateway();

    gateway.make_directory("/x/y/z").await.unwrap();
    gateway.make_directory("/x/y/z").await.unwrap();

    assert!(temp_dir.path().join("x/y/z").is_dir());
    assert_eq!(counters.acquired(), 2);
    assert_eq!(counters.released(), 2);
}

#[tokio::test]
async fn test_make_directory_blocked_by_file() {
    let (gateway, counters, temp_dir) = create_gateway();
    std::fs::write(temp_dir.path().join("x"), "file").unwrap();

    let result = gateway.make_directory("/x/y").await;

    assert!(matches!(result, Err(GatewayError::InvalidTarget { .. })));
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_non_recursive_delete_keeps_contents() {
    let (gateway, counters, temp_dir) = create_gateway();
    std::fs::create_dir_all(temp_dir.path().join("d")).unwrap();
    std::fs::write(temp_dir.path().join("d/keep.txt"), "k").unwrap();

    let result = gateway.delete_directory("/d", false).await;

    assert!(matches!(result, Err(GatewayError::DirectoryNotEmpty(_))));
    assert!(temp_dir.path().join("d/keep.txt").exists());
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_recursive_delete_removes_tree() {
    let (gateway, _counters, temp_dir) = create_gateway();
    std::fs::create_dir_all(temp_dir.path().join("d/sub/deeper")).unwrap();
    std::fs::write(temp_dir.path().join("d/a.txt"), "a").unwrap();
    std::fs::write(temp_dir.path().join("d/sub/b.txt"), "b").unwrap();
    std::fs::write(temp_dir.path().join("d/sub/deeper/c.txt"), "c").unwrap();
    std::fs::write(temp_dir.path().join("sibling.txt"), "s").unwrap();

    let removal = gateway.delete_directory("/d", true).await.unwrap();

    assert!(removal.recursive);
    assert_eq!(removal.summary.files, 3);
    assert_eq!(removal.summary.directories, 3);

    let listing = gateway.list("/").await.unwrap();
    let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["sibling.txt"]);
}

#[tokio::test]
async fn test_recursive_delete_of_root_is_protected() {
    let (gateway, counters, temp_dir) = create_gateway();
    std::fs::write(temp_dir.path().join("precious.txt"), "p").unwrap();

    for path in ["/", "/.", "./", "x/.."] {
        let result = gateway.delete_directory(path, true).await;
        assert!(matches!(result, Err(GatewayError::ProtectedPath(_))));
    }

    assert_eq!(counters.acquired(), 0);
    assert!(temp_dir.path().join("precious.txt").exists());
}

#[tokio::test]
async fn test_recursive_delete_too_deep() {
    let (gateway, counters, temp_dir) = create_gateway_with(|config| {
        config.max_depth = 2;
    });
    std::fs::create_dir_all(temp_dir.path().join("deep/a/b/c")).unwrap();

    let result = gateway.delete_directory("/deep", true).await;

    assert!(matches!(
        result,
        Err(GatewayError::TreeTooDeep { limit: 2, .. })
    ));
    assert!(temp_dir.path().join("deep/a/b/c").is_dir());
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_delete_file_then_not_found() {
    let (gateway, counters, temp_dir) = create_gateway();
    std::fs::write(temp_dir.path().join("gone.txt"), "g").unwrap();

    let deleted = gateway.delete_file("gone.txt").await.unwrap();
    assert_eq!(deleted, format!("{}/gone.txt", gateway.root()));
    assert!(!temp_dir.path().join("gone.txt").exists());

    let result = gateway.delete_file("gone.txt").await;
    assert!(matches!(result, Err(GatewayError::NotFound(_))));

    assert_eq!(counters.acquired(), 2);
    assert_eq!(counters.released(), 2);
}

#[tokio::test]
async fn test_list_missing_directory() {
    let (gateway, counters, _temp_dir) = create_gateway();

    let result = gateway.list("/missing").await;

    assert!(matches!(result, Err(GatewayError::NotFound(_))));
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_delete_directory_through_link_keeps_outside_tree() {
    let (gateway, counters, temp_dir) = create_gateway();
    let outside = TempDir::new().unwrap();
    std::fs::write(outside.path().join("keep.txt"), "outside").unwrap();
    std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("link")).unwrap();

    let result = gateway.delete_directory("/link", true).await;

    assert!(matches!(result, Err(GatewayError::InvalidTarget { .. })));
    assert!(outside.path().join("keep.txt").exists());
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}
