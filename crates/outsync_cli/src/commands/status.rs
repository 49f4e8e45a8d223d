//! Status command implementation.

use super::{emit, hex, open, CliResult};
use crate::Format;
use outsync_engine::{ChangeTokenStore, MutationQueue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Summary of a state directory.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// State directory path.
    pub path: String,
    /// Number of pending markers.
    pub pending: usize,
    /// Pending markers per zone.
    pub pending_by_zone: BTreeMap<String, usize>,
    /// Shared-scope change token, hex encoded.
    pub shared_token: Option<String>,
    /// Zones with a stored change token.
    pub synced_zones: usize,
    /// Zones no longer synced.
    pub disabled_zones: Vec<String>,
}

/// Reads the summary of a state directory.
pub fn inspect(path: &Path) -> CliResult<StatusReport> {
    let dir = open(path)?;
    let queue = MutationQueue::load(dir.clone());
    let tokens = ChangeTokenStore::load(dir);

    let mut pending_by_zone = BTreeMap::new();
    for marker in queue.snapshot() {
        *pending_by_zone.entry(marker.zone.to_string()).or_insert(0) += 1;
    }
    let snapshot = tokens.snapshot();

    Ok(StatusReport {
        path: path.display().to_string(),
        pending: queue.len(),
        pending_by_zone,
        shared_token: snapshot.shared.as_ref().map(|t| hex(t.as_bytes())),
        synced_zones: snapshot.zones.len(),
        disabled_zones: snapshot.disabled.iter().map(ToString::to_string).collect(),
    })
}

/// Runs the status command.
pub fn run(path: &Path, format: Format) -> CliResult<()> {
    let report = inspect(path)?;
    emit(&report, format, print_text_output)
}

fn print_text_output(report: &StatusReport) {
    println!("State directory: {}", report.path);
    println!("Pending markers: {}", report.pending);
    for (zone, count) in &report.pending_by_zone {
        println!("  {zone}: {count}");
    }
    println!(
        "Shared token:    {}",
        report.shared_token.as_deref().unwrap_or("(none)")
    );
    println!("Synced zones:    {}", report.synced_zones);
    if !report.disabled_zones.is_empty() {
        println!("Disabled zones:  {}", report.disabled_zones.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outsync_engine::{PendingMarker, SyncDir};
    use outsync_protocol::{ChangeToken, EntityId, ZoneId};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn summarizes_queue_and_tokens() {
        let temp = tempdir().unwrap();
        {
            let dir = Arc::new(SyncDir::open(temp.path(), true).unwrap());
            let queue = MutationQueue::load(dir.clone());
            let zone = ZoneId::default_zone();
            queue.mark(PendingMarker::new(zone.clone(), EntityId::document(1, "A")));
            queue.mark(PendingMarker::new(zone, EntityId::document(1, "B")));
            let tokens = ChangeTokenStore::load(dir);
            tokens.set_shared_token(ChangeToken::from_bytes(vec![0x0f]));
            tokens.disable_zone(&ZoneId::new("Gone", "bob"));
        }

        let report = inspect(temp.path()).unwrap();
        assert_eq!(report.pending, 2);
        assert_eq!(report.pending_by_zone.get("Outlines@__defaultOwner__"), Some(&2));
        assert_eq!(report.shared_token.as_deref(), Some("0f"));
        assert_eq!(report.disabled_zones, vec!["Gone@bob".to_string()]);
    }

    #[test]
    fn missing_directory_fails() {
        let temp = tempdir().unwrap();
        assert!(inspect(&temp.path().join("absent")).is_err());
    }
}
