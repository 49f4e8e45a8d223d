//! The capability every syncable entity implements.

use outsync_merge::{EditScript, RichText};
use outsync_protocol::{EntityId, FieldValue, RecordId, RemoteRecord, VersionTag, ZoneId};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// An entity that maps to one remote record.
///
/// The four sync callbacks are the only way the sync engine touches an
/// entity's fields.
pub trait SyncableRecord {
    /// Stable identifier.
    fn entity_id(&self) -> &EntityId;

    /// Last version tag seen from the remote store.
    fn version(&self) -> Option<&VersionTag>;

    /// Replaces the version tag, after a confirmed save or to retry a
    /// save as a create.
    fn set_version(&mut self, version: Option<VersionTag>);

    /// Applies a pulled record and returns the ids of rows that visibly
    /// changed.
    fn apply(&mut self, record: &RemoteRecord) -> Vec<EntityId>;

    /// Stores a server record that rejected our save in the server slots.
    fn apply_conflict(&mut self, record: &RemoteRecord);

    /// Resolves every field and serializes the entity.
    fn build_record(&mut self, zone: &ZoneId) -> RemoteRecord;

    /// Clears the ancestor and server slots of every field after `saved`
    /// was confirmed. Fields edited since `saved` was built keep its value
    /// as their ancestor.
    fn clear_sync_data(&mut self, saved: &RemoteRecord);

    /// Returns true if a pulled record is the version we already hold.
    fn is_current(&self, record: &RemoteRecord) -> bool {
        record.version.is_some() && record.version.as_ref() == self.version()
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Reads a rich-text field stored in its binary form.
///
/// Undecodable payloads are logged and read as absent.
pub(crate) fn read_rich_text(record: &RemoteRecord, name: &str) -> Option<RichText> {
    let bytes = record.get_bytes(name)?;
    match RichText::from_bytes(&bytes) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(record = %record.id, field = name, error = %e, "dropping undecodable rich text");
            None
        }
    }
}

/// Encodes a rich-text field.
pub(crate) fn rich_text_value(text: Option<&RichText>) -> Option<FieldValue> {
    let text = text?;
    match text.to_bytes() {
        Ok(bytes) => Some(FieldValue::Bytes(bytes)),
        Err(e) => {
            warn!(error = %e, "failed to encode rich text");
            None
        }
    }
}

/// Record id of an entity inside a zone.
pub(crate) fn record_id(id: &EntityId, zone: &ZoneId) -> RecordId {
    RecordId::new(zone.clone(), id.record_name().unwrap_or_else(|| id.to_string()))
}

/// Rows that were inserted into or moved within a child order.
pub(crate) fn reordered_rows(document: &EntityId, old: &[String], new: &[String]) -> Vec<EntityId> {
    let Some(document_id) = document.document_id() else {
        return Vec::new();
    };
    EditScript::between(old, new)
        .inferring_moves()
        .insertions()
        .iter()
        .map(|insertion| EntityId::row(document.account_id(), document_id, insertion.element.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(s: &str) -> Vec<String> {
        s.chars().map(|c| c.to_string()).collect()
    }

    #[test]
    fn reordered_rows_reports_moves_and_inserts() {
        let document = EntityId::document(1, "doc");
        let changed = reordered_rows(&document, &ids("ABC"), &ids("BACD"));

        assert!(changed.contains(&EntityId::row(1, "doc", "D")));
        assert!(!changed.contains(&EntityId::row(1, "doc", "C")));
    }

    #[test]
    fn record_ids_are_deterministic() {
        let zone = ZoneId::default_zone();
        let row = EntityId::row(1, "doc", "row");
        assert_eq!(record_id(&row, &zone), record_id(&row.clone(), &zone));
        assert_eq!(record_id(&row, &zone).name, "doc_row");
    }

    #[test]
    fn garbage_rich_text_reads_as_absent() {
        let zone = ZoneId::default_zone();
        let mut record = RemoteRecord::new(
            RecordId::new(zone, "doc_row"),
            outsync_protocol::RecordType::Row,
        );
        record.set("topicData", FieldValue::Bytes(vec![0xff, 0x00]));
        assert!(read_rich_text(&record, "topicData").is_none());

        let text = RichText::plain("hi");
        record.set_opt("noteData", rich_text_value(Some(&text)));
        assert_eq!(read_rich_text(&record, "noteData"), Some(text));
    }
}
