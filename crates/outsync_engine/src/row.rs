//! Outline rows.

use crate::entity::{read_rich_text, record_id, reordered_rows, rich_text_value, SyncableRecord};
use crate::field::SyncField;
use crate::image::Image;
use outsync_merge::{OrderedList, RichText, RichTextMerge, Scalar};
use outsync_protocol::{fields, EntityId, FieldValue, RecordType, RemoteRecord, VersionTag, ZoneId};
use std::collections::BTreeMap;

/// A row of an outline: a topic, an optional note, a completion flag and
/// the ordered ids of its child rows.
#[derive(Debug, Clone)]
pub struct Row {
    id: EntityId,
    version: Option<VersionTag>,
    topic: SyncField<RichText, RichTextMerge>,
    note: SyncField<RichText, RichTextMerge>,
    is_complete: SyncField<bool, Scalar>,
    children: SyncField<Vec<String>, OrderedList>,
    images: BTreeMap<String, Image>,
}

impl Row {
    /// Creates a row with a topic.
    pub fn new(id: EntityId, topic: RichText) -> Self {
        Self {
            id,
            version: None,
            topic: SyncField::new(Some(topic)),
            note: SyncField::new(None),
            is_complete: SyncField::new(Some(false)),
            children: SyncField::new(Some(Vec::new())),
            images: BTreeMap::new(),
        }
    }

    /// Creates a row with no fields, to be filled by a pulled record.
    pub(crate) fn empty(id: EntityId) -> Self {
        Self {
            id,
            version: None,
            topic: SyncField::default(),
            note: SyncField::default(),
            is_complete: SyncField::default(),
            children: SyncField::default(),
            images: BTreeMap::new(),
        }
    }

    /// The row identifier within its document.
    pub fn row_id(&self) -> &str {
        self.id.row_id().unwrap_or_default()
    }

    /// The topic text.
    pub fn topic(&self) -> Option<&RichText> {
        self.topic.get()
    }

    /// The note text.
    pub fn note(&self) -> Option<&RichText> {
        self.note.get()
    }

    /// Whether the row is checked off.
    pub fn is_complete(&self) -> bool {
        self.is_complete.get().copied().unwrap_or(false)
    }

    /// Ordered ids of the child rows.
    pub fn child_rows(&self) -> &[String] {
        self.children.get().map(Vec::as_slice).unwrap_or_default()
    }

    /// Attached images by id.
    pub fn images(&self) -> &BTreeMap<String, Image> {
        &self.images
    }

    /// Returns an attached image.
    pub fn image_mut(&mut self, image_id: &str) -> Option<&mut Image> {
        self.images.get_mut(image_id)
    }

    fn tracked(&self) -> bool {
        self.version.is_some()
    }

    fn marks(&self, changed: bool) -> Vec<EntityId> {
        if changed {
            vec![self.id.clone()]
        } else {
            Vec::new()
        }
    }

    /// Replaces the topic.
    pub fn set_topic(&mut self, topic: RichText) -> Vec<EntityId> {
        let tracked = self.tracked();
        let changed = self.topic.set(Some(topic), tracked);
        self.marks(changed)
    }

    /// Replaces or clears the note.
    pub fn set_note(&mut self, note: Option<RichText>) -> Vec<EntityId> {
        let tracked = self.tracked();
        let changed = self.note.set(note, tracked);
        self.marks(changed)
    }

    /// Checks or unchecks the row.
    pub fn set_complete(&mut self, complete: bool) -> Vec<EntityId> {
        let tracked = self.tracked();
        let changed = self.is_complete.set(Some(complete), tracked);
        self.marks(changed)
    }

    pub(crate) fn set_child_rows(&mut self, children: Vec<String>) -> Vec<EntityId> {
        let tracked = self.tracked();
        let changed = self.children.set(Some(children), tracked);
        self.marks(changed)
    }

    /// Attaches an image and inserts its placeholder into the topic or note.
    pub fn add_image(
        &mut self,
        image_id: &str,
        in_notes: bool,
        offset: usize,
        asset: Vec<u8>,
    ) -> Vec<EntityId> {
        let Some(document) = self.id.document_id() else {
            return Vec::new();
        };
        let image_entity = EntityId::image(self.id.account_id(), document, self.row_id(), image_id);

        let current = if in_notes { self.note() } else { self.topic() };
        let mut text = current.cloned().unwrap_or_default();
        let offset = offset.min(text.len());
        if text.insert_image(offset, image_id).is_err() {
            return Vec::new();
        }

        let mut marks = if in_notes {
            self.set_note(Some(text))
        } else {
            self.set_topic(text)
        };
        let image = Image::new(
            image_entity.clone(),
            in_notes,
            i64::try_from(offset).unwrap_or(i64::MAX),
            asset,
        );
        self.images.insert(image_id.to_string(), image);
        marks.push(image_entity);
        marks
    }

    /// Detaches an image. The placeholder character is left to the caller.
    pub fn remove_image(&mut self, image_id: &str) -> Vec<EntityId> {
        match self.images.remove(image_id) {
            Some(image) => vec![image.entity_id().clone()],
            None => Vec::new(),
        }
    }

    pub(crate) fn images_mut(&mut self) -> &mut BTreeMap<String, Image> {
        &mut self.images
    }
}

impl SyncableRecord for Row {
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

        let old_children = self.child_rows().to_vec();
        let mut changed = self.topic.apply_remote(read_rich_text(record, fields::TOPIC));
        changed |= self.note.apply_remote(read_rich_text(record, fields::NOTE));
        changed |= self.is_complete.apply_remote(record.get_bool(fields::IS_COMPLETE));
        let children_changed = self
            .children
            .apply_remote(record.get_text_list(fields::ROW_ORDER));
        self.version = record.version.clone();

        let mut rows = self.marks(changed || children_changed);
        if children_changed {
            if let Some(document) = self.id.document_entity() {
                rows.extend(reordered_rows(&document, &old_children, self.child_rows()));
            }
        }
        rows
    }

    fn apply_conflict(&mut self, record: &RemoteRecord) {
        self.topic.set_server(read_rich_text(record, fields::TOPIC));
        self.note.set_server(read_rich_text(record, fields::NOTE));
        self.is_complete.set_server(record.get_bool(fields::IS_COMPLETE));
        self.children.set_server(record.get_text_list(fields::ROW_ORDER));
        self.version = record.version.clone();
    }

    fn build_record(&mut self, zone: &ZoneId) -> RemoteRecord {
        let parent = self.id.document_entity().map(|document| record_id(&document, zone));
        let mut record = RemoteRecord::new(record_id(&self.id, zone), RecordType::Row)
            .with_parent(parent)
            .with_version(self.version.clone());

        record.set_opt(fields::TOPIC, rich_text_value(self.topic.resolve()));
        record.set_opt(fields::NOTE, rich_text_value(self.note.resolve()));
        record.set_opt(
            fields::IS_COMPLETE,
            self.is_complete.resolve().copied().map(FieldValue::Bool),
        );
        record.set_opt(
            fields::ROW_ORDER,
            self.children.resolve().cloned().map(FieldValue::TextList),
        );
        record
    }

    fn clear_sync_data(&mut self, saved: &RemoteRecord) {
        self.topic.clear_sync_data(read_rich_text(saved, fields::TOPIC));
        self.note.clear_sync_data(read_rich_text(saved, fields::NOTE));
        self.is_complete.clear_sync_data(saved.get_bool(fields::IS_COMPLETE));
        self.children.clear_sync_data(saved.get_text_list(fields::ROW_ORDER));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::new(EntityId::row(0, "doc", "r1"), RichText::plain("Hello world"))
    }

    fn synced(version: u8) -> Row {
        let mut row = row();
        row.set_version(Some(VersionTag::from_bytes(vec![version])));
        row
    }

    #[test]
    fn record_layout() {
        let zone = ZoneId::default_zone();
        let mut row = row();
        row.set_complete(true);
        let record = row.build_record(&zone);

        assert_eq!(record.id.name, "doc_r1");
        assert_eq!(record.parent.as_ref().map(|p| p.name.as_str()), Some("doc"));
        assert_eq!(record.get_bool(fields::IS_COMPLETE), Some(true));
        assert_eq!(
            read_rich_text(&record, fields::TOPIC).map(|t| t.to_string()).as_deref(),
            Some("Hello world")
        );
        assert!(record.get(fields::NOTE).is_none());
    }

    #[test]
    fn edits_before_first_sync_keep_no_ancestor() {
        let mut row = row();
        assert_eq!(row.set_topic(RichText::plain("Changed")), vec![EntityId::row(0, "doc", "r1")]);
        assert!(row.topic.ancestor().is_none());
    }

    #[test]
    fn conflicting_topic_edits_merge() {
        let zone = ZoneId::default_zone();
        let mut local = synced(1);
        local.set_topic(RichText::plain("Hello there world"));

        let mut server = synced(1);
        server.set_topic(RichText::plain("Hello world!"));
        let mut server_record = server.build_record(&zone);
        server_record.version = Some(VersionTag::from_bytes(vec![2]));

        local.apply_conflict(&server_record);
        let merged = local.build_record(&zone);
        assert_eq!(
            read_rich_text(&merged, fields::TOPIC).unwrap().to_string(),
            "Hello there world!"
        );
        assert_eq!(merged.version, Some(VersionTag::from_bytes(vec![2])));

        local.clear_sync_data(&merged);
        assert!(local.topic.ancestor().is_none());
        assert!(local.topic.server().is_none());
    }

    #[test]
    fn apply_is_idempotent() {
        let zone = ZoneId::default_zone();
        let mut remote = synced(1);
        remote.set_complete(true);
        remote.set_child_rows(vec!["c1".into()]);
        let mut record = remote.build_record(&zone);
        record.version = Some(VersionTag::from_bytes(vec![5]));

        let mut local = Row::empty(EntityId::row(0, "doc", "r1"));
        let changed = local.apply(&record);
        assert!(changed.contains(&EntityId::row(0, "doc", "r1")));
        assert!(changed.contains(&EntityId::row(0, "doc", "c1")));

        let before = format!("{local:?}");
        assert!(local.apply(&record).is_empty());
        assert_eq!(format!("{local:?}"), before);
        assert!(local.is_complete());
    }

    #[test]
    fn add_image_inserts_placeholder() {
        let mut row = row();
        let marks = row.add_image("img", false, 5, vec![0xaa]);

        assert!(marks.contains(&EntityId::image(0, "doc", "r1", "img")));
        assert!(marks.contains(&EntityId::row(0, "doc", "r1")));
        assert_eq!(row.topic().unwrap().image_ids(), vec!["img"]);
        assert_eq!(row.images()["img"].offset(), 5);

        assert_eq!(row.remove_image("img"), vec![EntityId::image(0, "doc", "r1", "img")]);
        assert!(row.images().is_empty());
    }
}
