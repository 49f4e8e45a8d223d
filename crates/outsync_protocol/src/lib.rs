//! # Outsync Protocol
//!
//! Remote record protocol types for outsync.
//!
//! This crate provides:
//! - `EntityId` for hierarchical entity addressing (account, document, row, image)
//! - `ZoneId` and `RecordId` for remote record addressing
//! - `RemoteRecord` with typed field accessors
//! - Opaque `VersionTag` and `ChangeToken` values
//! - Push/pull messages exchanged with a remote record store
//! - Push-notification parsing
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod ids;
mod messages;
mod notification;
mod record;
mod token;

pub use error::{ProtocolError, ProtocolResult};
pub use ids::{EntityId, RecordId, ZoneId, DEFAULT_ZONE_NAME, DEFAULT_ZONE_OWNER};
pub use messages::{DatabaseChanges, DeletedRecord, ModifyOutcome, RecordOutcome, ZoneChanges};
pub use notification::RemoteNotification;
pub use record::{fields, FieldValue, RecordType, RemoteRecord};
pub use token::{ChangeToken, VersionTag};
