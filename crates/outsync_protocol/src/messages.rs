//! Messages exchanged with a remote record store.

use crate::ids::{RecordId, ZoneId};
use crate::record::{RecordType, RemoteRecord};
use crate::token::ChangeToken;

/// Account-wide changes since a shared-scope token.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseChanges {
    /// Zones with changed records.
    pub changed_zones: Vec<ZoneId>,
    /// Zones that were removed from the store.
    pub deleted_zones: Vec<ZoneId>,
    /// Token to resume from.
    pub token: ChangeToken,
    /// Whether another fetch is needed to catch up.
    pub more_coming: bool,
}

/// A record deleted from a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Type of the deleted record.
    pub record_type: RecordType,
}

/// Changes in one zone since a change token.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneChanges {
    /// Records created or modified.
    pub changed: Vec<RemoteRecord>,
    /// Records deleted.
    pub deleted: Vec<DeletedRecord>,
    /// Token to resume from.
    pub token: ChangeToken,
    /// Whether another fetch is needed to catch up.
    pub more_coming: bool,
}

impl ZoneChanges {
    /// Returns true if the batch carries no records.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Per-record result of a batched write.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// The record was saved; carries the stored record with its new version.
    Saved(RemoteRecord),
    /// The record was deleted.
    Deleted(RecordId),
    /// The stored version differs from the one the client last observed.
    Conflict {
        /// The server's current record.
        server_record: RemoteRecord,
    },
    /// A save referenced a version of a record that no longer exists.
    UnknownItem(RecordId),
    /// The record could not be written.
    Failed {
        /// Record identifier.
        id: RecordId,
        /// Failure description.
        message: String,
        /// Whether the write can be retried later.
        retryable: bool,
    },
}

impl RecordOutcome {
    /// Returns the record this outcome is about.
    pub fn record_id(&self) -> &RecordId {
        match self {
            RecordOutcome::Saved(record) => &record.id,
            RecordOutcome::Deleted(id) | RecordOutcome::UnknownItem(id) => id,
            RecordOutcome::Conflict { server_record } => &server_record.id,
            RecordOutcome::Failed { id, .. } => id,
        }
    }

    /// Returns true if the write took effect.
    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Saved(_) | RecordOutcome::Deleted(_))
    }
}

/// Result of a batched write to one zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifyOutcome {
    /// One outcome per requested save or delete.
    pub outcomes: Vec<RecordOutcome>,
}

impl ModifyOutcome {
    /// Returns the outcomes that conflicted with server state.
    pub fn conflicts(&self) -> impl Iterator<Item = &RemoteRecord> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            RecordOutcome::Conflict { server_record } => Some(server_record),
            _ => None,
        })
    }
}
