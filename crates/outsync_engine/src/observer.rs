//! Callbacks for the presentation layer.

use crate::error::SyncError;
use outsync_protocol::EntityId;

/// Receives sync activity and the structured diffs of pulled changes.
///
/// Every method has an empty default so observers implement only what
/// they display.
pub trait SyncObserver: Send + Sync {
    /// A cycle is about to contact the remote store.
    fn sync_will_begin(&self) {}

    /// A cycle finished, successfully or not.
    fn sync_did_end(&self) {}

    /// Rows of a document changed and should be reloaded.
    fn rows_changed(&self, _document: &EntityId, _rows: &[EntityId]) {}

    /// Documents were removed by the remote store.
    fn documents_deleted(&self, _documents: &[EntityId]) {}

    /// A sync failure that left work queued for the next cycle.
    fn report_error(&self, _error: &SyncError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}
