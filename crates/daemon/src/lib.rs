//! # SFTP Gateway Library
//!
//! This crate exposes a remote SFTP tree over HTTP while confining every
//! operation to a single root directory.
//!
//! ## Overview
//!
//! - **Path Confinement**: lexical normalization and component-prefix checks
//! - **File Operations**: list, mkdir, upload, download, delete file, delete directory
//! - **Session Scoping**: one remote session per operation, always released
//! - **HTTP Adapter**: an `axum` router guarded by an API key
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                  HTTP Router (axum)                   │
//! ├───────────────────────────────────────────────────────┤
//! │                       Gateway                         │
//! │  ┌─────────────┐  ┌──────────────┐  ┌──────────────┐  │
//! │  │ Confinement │  │ Materializer │  │ Tree Remover │  │
//! │  └─────────────┘  └──────────────┘  └──────────────┘  │
//! │  ┌────────────────────────────────────────────────┐   │
//! │  │          Transfer (upload / download)          │   │
//! │  └────────────────────────────────────────────────┘   │
//! ├───────────────────────────────────────────────────────┤
//! │        SessionConnector  →  RemoteFileService         │
//! │             (SFTP over SSH, or local fs)              │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::backend::LocalConnector;
//! use daemon::{Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = Gateway::new(GatewayConfig::new("/srv/data"), LocalConnector::new());
//!
//!     gateway.make_directory("/uploads").await?;
//!     let listing = gateway.list("/").await?;
//!     println!("{} entries in {}", listing.entries.len(), listing.path);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Confinement, remote abstraction, transfer and removal
//! - [`session`]: Scoped session release
//! - [`gateway`]: The six confined operations
//! - [`backend`]: SFTP and local remote implementations
//! - [`router`]: HTTP routes and error mapping

pub mod backend;
pub mod config;
pub mod error;
pub mod files;
pub mod gateway;
pub mod router;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

pub use config::{BackendKind, Config, ConfigError};
pub use error::{GatewayError, Result};
pub use gateway::{DirectoryRemoval, Gateway, GatewayConfig, Listing};
pub use router::{build_router, AppState, RouterError};
pub use session::SessionGuard;
