//! Image attachments.

use crate::entity::{record_id, SyncableRecord};
use crate::field::SyncField;
use outsync_merge::Scalar;
use outsync_protocol::{fields, EntityId, FieldValue, RecordType, RemoteRecord, VersionTag, ZoneId};

/// An image attached to a row's topic or note.
#[derive(Debug, Clone)]
pub struct Image {
    id: EntityId,
    version: Option<VersionTag>,
    is_in_notes: SyncField<bool, Scalar>,
    offset: SyncField<i64, Scalar>,
    asset: SyncField<Vec<u8>, Scalar>,
}

impl Image {
    /// Creates an image at a character offset of the row's topic or note.
    pub fn new(id: EntityId, is_in_notes: bool, offset: i64, asset: Vec<u8>) -> Self {
        Self {
            id,
            version: None,
            is_in_notes: SyncField::new(Some(is_in_notes)),
            offset: SyncField::new(Some(offset)),
            asset: SyncField::new(Some(asset)),
        }
    }

    /// Creates an image with no fields, to be filled by a pulled record.
    pub(crate) fn empty(id: EntityId) -> Self {
        Self {
            id,
            version: None,
            is_in_notes: SyncField::default(),
            offset: SyncField::default(),
            asset: SyncField::default(),
        }
    }

    /// The image identifier within its row.
    pub fn image_id(&self) -> &str {
        self.id.image_id().unwrap_or_default()
    }

    /// Whether the image sits in the note rather than the topic.
    pub fn is_in_notes(&self) -> bool {
        self.is_in_notes.get().copied().unwrap_or(false)
    }

    /// Character offset of the image.
    pub fn offset(&self) -> i64 {
        self.offset.get().copied().unwrap_or(0)
    }

    /// Image payload.
    pub fn asset(&self) -> &[u8] {
        self.asset.get().map(Vec::as_slice).unwrap_or_default()
    }

    /// Moves the image to another offset.
    pub fn set_offset(&mut self, offset: i64) -> Vec<EntityId> {
        let tracked = self.version.is_some();
        if self.offset.set(Some(offset), tracked) {
            vec![self.id.clone()]
        } else {
            Vec::new()
        }
    }

    /// Replaces the payload.
    pub fn set_asset(&mut self, asset: Vec<u8>) -> Vec<EntityId> {
        let tracked = self.version.is_some();
        if self.asset.set(Some(asset), tracked) {
            vec![self.id.clone()]
        } else {
            Vec::new()
        }
    }
}

impl SyncableRecord for Image {
    fn entity_id(&self) -> &EntityId {
        &self.id
    }

    fn version(&self) -> Option<&VersionTag> {
        self.version.as_ref()
    }

    fn set_version(&mut self, version: Option<VersionTag>) {
        self.version = version;
    }

    fn apply(&mut self, record: &RemoteRecord) -> Vec<EntityId> {
        if self.is_current(record) {
            return Vec::new();
        }

        let mut changed = self.is_in_notes.apply_remote(record.get_bool(fields::IS_IN_NOTES));
        changed |= self.offset.apply_remote(record.get_integer(fields::OFFSET));
        changed |= self.asset.apply_remote(record.get_asset(fields::ASSET));
        self.version = record.version.clone();

        match self.id.row_entity() {
            Some(row) if changed => vec![row],
            _ => Vec::new(),
        }
    }

    fn apply_conflict(&mut self, record: &RemoteRecord) {
        self.is_in_notes.set_server(record.get_bool(fields::IS_IN_NOTES));
        self.offset.set_server(record.get_integer(fields::OFFSET));
        self.asset.set_server(record.get_asset(fields::ASSET));
        self.version = record.version.clone();
    }

    fn build_record(&mut self, zone: &ZoneId) -> RemoteRecord {
        let parent = self.id.row_entity().map(|row| record_id(&row, zone));
        let mut record = RemoteRecord::new(record_id(&self.id, zone), RecordType::Image)
            .with_parent(parent)
            .with_version(self.version.clone());

        record.set_opt(fields::IS_IN_NOTES, self.is_in_notes.resolve().copied().map(FieldValue::Bool));
        record.set_opt(fields::OFFSET, self.offset.resolve().copied().map(FieldValue::Integer));
        record.set_opt(fields::ASSET, self.asset.resolve().cloned().map(FieldValue::Asset));
        record
    }

    fn clear_sync_data(&mut self, saved: &RemoteRecord) {
        self.is_in_notes.clear_sync_data(saved.get_bool(fields::IS_IN_NOTES));
        self.offset.clear_sync_data(saved.get_integer(fields::OFFSET));
        self.asset.clear_sync_data(saved.get_asset(fields::ASSET));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Image {
        Image::new(EntityId::image(0, "doc", "row", "img"), false, 3, vec![1, 2, 3])
    }

    #[test]
    fn record_references_row_as_parent() {
        let zone = ZoneId::default_zone();
        let record = image().build_record(&zone);

        assert_eq!(record.record_type, RecordType::Image);
        assert_eq!(record.id.name, "doc_row_img");
        assert_eq!(record.parent.as_ref().map(|p| p.name.as_str()), Some("doc_row"));
        assert_eq!(record.get_integer(fields::OFFSET), Some(3));
        assert_eq!(record.get_asset(fields::ASSET), Some(vec![1, 2, 3]));
    }

    #[test]
    fn apply_reports_owning_row() {
        let zone = ZoneId::default_zone();
        let mut source = image();
        let mut record = source.build_record(&zone);
        record.set(fields::OFFSET, FieldValue::Integer(9));
        record.version = Some(VersionTag::from_bytes(vec![1]));

        let mut target = Image::empty(EntityId::image(0, "doc", "row", "img"));
        let changed = target.apply(&record);
        assert_eq!(changed, vec![EntityId::row(0, "doc", "row")]);
        assert_eq!(target.offset(), 9);

        // Same version again is skipped
        assert!(target.apply(&record).is_empty());
    }

    #[test]
    fn conflict_on_untouched_field_takes_server() {
        let zone = ZoneId::default_zone();
        let mut local = image();
        local.set_version(Some(VersionTag::from_bytes(vec![1])));
        local.set_asset(vec![9, 9]);

        let mut server = image().build_record(&zone);
        server.set(fields::OFFSET, FieldValue::Integer(7));
        server.version = Some(VersionTag::from_bytes(vec![2]));
        local.apply_conflict(&server);

        let merged = local.build_record(&zone);
        assert_eq!(merged.get_integer(fields::OFFSET), Some(7));
        assert_eq!(merged.get_asset(fields::ASSET), Some(vec![9, 9]));
        assert_eq!(merged.version, Some(VersionTag::from_bytes(vec![2])));
    }
}
