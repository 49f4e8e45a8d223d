//! # Outsync Server
//!
//! In-memory reference record store for outsync.
//!
//! This crate provides:
//! - Record storage partitioned into zones
//! - Optimistic concurrency on every save (version tags)
//! - Per-zone change logs with opaque change tokens
//! - An account-wide feed of changed and deleted zones
//! - Cascade deletes through parent references
//! - Fault injection for tests
//!
//! # Architecture
//!
//! The server keeps one global sequence counter. Every save and delete is
//! logged with the next sequence number; change tokens encode the last
//! sequence a client has seen. A fetch returns the latest state of every
//! record touched after the token, so replaying a fetch is harmless.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use store::RecordServer;
