//! # SFTP Gateway Protocol Library
//!
//! This crate provides the JSON wire types of the SFTP gateway's HTTP
//! interface, shared between the daemon and any client.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::messages::{ErrorBody, ErrorCode, MkdirResponse};
//!
//! let ok = MkdirResponse {
//!     ok: true,
//!     created: "/srv/data/uploads/2025".to_string(),
//! };
//! assert!(ok.ok);
//!
//! let err = ErrorBody::new(ErrorCode::OutsideRoot, "path outside confined root");
//! assert!(!err.ok);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Request, response and error bodies

pub mod messages;

pub use messages::{ErrorBody, ErrorCode, API_KEY_HEADER, SERVICE_NAME};
