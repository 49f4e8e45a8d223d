//! # Outsync Engine
//!
//! Offline-first sync engine for outline documents.
//!
//! This crate provides:
//! - Syncable entities (documents, rows, images) with ancestor/server shadow fields
//! - An in-memory account index that applies pulled records
//! - A durable, deduplicated mutation queue with a debounced flush
//! - Per-zone change tokens and a locked state directory
//! - A per-zone push/pull driver with optimistic-concurrency conflict merging
//! - A sync coordinator that serializes cycles and handles push notifications
//!
//! ## Architecture
//!
//! The engine implements a **push-then-pull** model:
//! 1. Local edits mutate entities in memory and queue `(zone, entity)` markers
//! 2. A flush builds records for every marker and saves them conditionally
//! 3. Rejected saves are merged with the server record and retried
//! 4. Remote changes since the stored change token are applied to live entities
//!
//! ## Key Invariants
//!
//! - Markers are cleared only once the remote outcome for them is known
//! - A change token advances only after its batch is fully applied
//! - Applying the same pull batch twice yields the same state
//! - Ancestor and server shadows are empty outside a merge window
//! - A deleted zone removes its local documents and is never retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod account;
mod config;
mod coordinator;
mod debounce;
mod dir;
mod document;
mod entity;
mod error;
mod field;
mod image;
mod observer;
mod queue;
mod row;
mod tokens;
mod transport;
mod zone;

pub use account::Account;
pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{CycleReport, SyncCoordinator, SyncStats};
pub use debounce::Debouncer;
pub use dir::{SyncDir, QUEUE_FILE, TOKENS_FILE};
pub use document::Document;
pub use entity::SyncableRecord;
pub use error::{SyncError, SyncResult};
pub use field::SyncField;
pub use image::Image;
pub use observer::{NoopObserver, SyncObserver};
pub use queue::{DrainedMarkers, MutationQueue, PendingMarker};
pub use row::Row;
pub use tokens::{ChangeTokenStore, TokenSnapshot};
pub use transport::{
    AlwaysReachable, MockRemoteStore, MockRequest, Reachability, ReachabilityFlag, RemoteStore,
};
pub use zone::{PullReport, PushReport, SyncState, ZoneClient};
