//! Remote file service backends.
//!
//! - [`sftp`]: a real SFTP server reached over SSH
//! - [`local`]: the local filesystem, for development and tests

pub mod local;
pub mod sftp;

pub use local::{LocalConnector, LocalFileService};
pub use sftp::{SftpConnector, SftpRemote, SftpSettings};
