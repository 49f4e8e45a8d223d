//! Queue commands.

use super::{emit, open, CliResult};
use crate::Format;
use outsync_engine::{MutationQueue, PendingMarker};
use outsync_protocol::ZoneId;
use serde::Serialize;
use std::path::Path;

/// One pending marker, rendered for output.
#[derive(Debug, Serialize)]
pub struct MarkerView {
    /// Zone, as `name@owner`.
    pub zone: String,
    /// Entity identifier.
    pub entity: String,
    /// Remote record name, if the entity has one.
    pub record: Option<String>,
}

impl From<&PendingMarker> for MarkerView {
    fn from(marker: &PendingMarker) -> Self {
        Self {
            zone: marker.zone.to_string(),
            entity: marker.entity.to_string(),
            record: marker.entity.record_name(),
        }
    }
}

/// Result of clearing the queue.
#[derive(Debug, Serialize)]
pub struct ClearResult {
    /// Markers that were (or would be) dropped.
    pub dropped: usize,
    /// Whether the queue was left untouched.
    pub dry_run: bool,
}

/// Reads pending markers, optionally for one zone.
pub fn markers(path: &Path, zone: Option<&ZoneId>) -> CliResult<Vec<MarkerView>> {
    let queue = MutationQueue::load(open(path)?);
    Ok(queue
        .snapshot()
        .iter()
        .filter(|marker| zone.is_none_or(|z| &marker.zone == z))
        .map(MarkerView::from)
        .collect())
}

/// Runs the queue command.
pub fn list(path: &Path, zone: Option<&ZoneId>, format: Format) -> CliResult<()> {
    let views = markers(path, zone)?;
    emit(&views, format, |views| {
        if views.is_empty() {
            println!("No pending markers");
            return;
        }
        for view in views {
            println!("{:<32} {}", view.zone, view.entity);
        }
        println!("{} pending", views.len());
    })
}

/// Runs the clear-queue command.
pub fn clear(path: &Path, dry_run: bool, format: Format) -> CliResult<()> {
    let queue = MutationQueue::load(open(path)?);
    let result = ClearResult {
        dropped: queue.len(),
        dry_run,
    };
    if !dry_run {
        queue.clear();
    }
    emit(&result, format, |result| {
        if result.dry_run {
            println!("Would drop {} pending markers", result.dropped);
        } else {
            println!("Dropped {} pending markers", result.dropped);
        }
    })
}
