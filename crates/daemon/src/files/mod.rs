//! Confined file operations over a remote session.
//!
//! This module provides the building blocks used by the gateway:
//! - Lexical path confinement to a fixed root
//! - The remote file service abstraction and its attribute types
//! - Idempotent directory chain creation
//! - Bounded post-order tree removal
//! - Chunked upload and streaming download
//!
//! # Security
//!
//! Every caller-supplied path passes through [`confinement::resolve`] before
//! it reaches a remote call. Confinement is purely lexical: paths are
//! normalized and compared by component prefix, never resolved on the server.

pub mod browser;
pub mod confinement;
pub mod materialize;
pub mod remote;
pub mod remover;
pub mod transfer;

pub use confinement::{ConfinementError, ResolvedPath};
pub use remote::{RemoteAttributes, RemoteEntry, RemoteError, RemoteFileService, SessionConnector};
pub use remover::RemovalSummary;
pub use transfer::{Download, DownloadStream, TransferOptions};
