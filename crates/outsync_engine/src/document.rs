//! Outline documents.

use crate::entity::{now_millis, record_id, reordered_rows, SyncableRecord};
use crate::field::SyncField;
use crate::row::Row;
use outsync_merge::{OrderedList, RichText, Scalar};
use outsync_protocol::{fields, EntityId, FieldValue, RecordType, RemoteRecord, VersionTag, ZoneId};
use std::collections::BTreeMap;
use uuid::Uuid;

/// An outline document and the rows it owns.
///
/// Top-level rows are listed in the document's row order; nested rows in
/// their parent row's child order. Every row, at any depth, is stored in
/// one flat map keyed by row id.
#[derive(Debug, Clone)]
pub struct Document {
    id: EntityId,
    zone: ZoneId,
    version: Option<VersionTag>,
    title: SyncField<String, Scalar>,
    owner_name: SyncField<String, Scalar>,
    owner_email: SyncField<String, Scalar>,
    owner_url: SyncField<String, Scalar>,
    tag_names: SyncField<Vec<String>, OrderedList>,
    row_order: SyncField<Vec<String>, OrderedList>,
    document_links: SyncField<Vec<String>, OrderedList>,
    created: SyncField<i64, Scalar>,
    updated: SyncField<i64, Scalar>,
    disambiguator: SyncField<i64, Scalar>,
    rows: BTreeMap<String, Row>,
}

impl Document {
    /// Creates a new, never-synced document with a generated id.
    pub fn create(account: u32, zone: ZoneId, title: impl Into<String>) -> Self {
        let mut document = Self::empty(EntityId::document(account, Uuid::new_v4().to_string()), zone);
        let now = now_millis();
        document.title = SyncField::new(Some(title.into()));
        document.row_order = SyncField::new(Some(Vec::new()));
        document.tag_names = SyncField::new(Some(Vec::new()));
        document.document_links = SyncField::new(Some(Vec::new()));
        document.created = SyncField::new(Some(now));
        document.updated = SyncField::new(Some(now));
        document
    }

    /// Creates a document with no fields, to be filled by a pulled record.
    pub fn empty(id: EntityId, zone: ZoneId) -> Self {
        Self {
            id,
            zone,
            version: None,
            title: SyncField::default(),
            owner_name: SyncField::default(),
            owner_email: SyncField::default(),
            owner_url: SyncField::default(),
            tag_names: SyncField::default(),
            row_order: SyncField::default(),
            document_links: SyncField::default(),
            created: SyncField::default(),
            updated: SyncField::default(),
            disambiguator: SyncField::default(),
            rows: BTreeMap::new(),
        }
    }

    /// The document identifier.
    pub fn document_id(&self) -> &str {
        self.id.document_id().unwrap_or_default()
    }

    /// The zone this document lives in.
    pub fn zone(&self) -> &ZoneId {
        &self.zone
    }

    /// Title.
    pub fn title(&self) -> Option<&str> {
        self.title.get().map(String::as_str)
    }

    /// Owner name, email and URL for shared documents.
    pub fn owner(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.owner_name.get().map(String::as_str),
            self.owner_email.get().map(String::as_str),
            self.owner_url.get().map(String::as_str),
        )
    }

    /// Tag names in order.
    pub fn tag_names(&self) -> &[String] {
        self.tag_names.get().map(Vec::as_slice).unwrap_or_default()
    }

    /// Ids of the top-level rows in order.
    pub fn row_order(&self) -> &[String] {
        self.row_order.get().map(Vec::as_slice).unwrap_or_default()
    }

    /// Linked document ids in order.
    pub fn document_links(&self) -> &[String] {
        self.document_links.get().map(Vec::as_slice).unwrap_or_default()
    }

    /// Creation time in milliseconds.
    pub fn created(&self) -> Option<i64> {
        self.created.get().copied()
    }

    /// Last update time in milliseconds.
    pub fn updated(&self) -> Option<i64> {
        self.updated.get().copied()
    }

    /// Number used to tell apart documents with equal titles.
    pub fn disambiguator(&self) -> Option<i64> {
        self.disambiguator.get().copied()
    }

    /// All rows by id.
    pub fn rows(&self) -> &BTreeMap<String, Row> {
        &self.rows
    }

    /// Returns a row.
    pub fn row(&self, row_id: &str) -> Option<&Row> {
        self.rows.get(row_id)
    }

    /// Returns a row for editing.
    pub fn row_mut(&mut self, row_id: &str) -> Option<&mut Row> {
        self.rows.get_mut(row_id)
    }

    pub(crate) fn rows_mut(&mut self) -> &mut BTreeMap<String, Row> {
        &mut self.rows
    }

    /// Row ids in outline order (depth first), with their depth.
    pub fn outline(&self) -> Vec<(usize, &str)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, &str)> = self
            .row_order()
            .iter()
            .rev()
            .map(|id| (0, id.as_str()))
            .collect();
        while let Some((depth, row_id)) = stack.pop() {
            let Some(row) = self.rows.get(row_id) else {
                continue;
            };
            out.push((depth, row_id));
            stack.extend(row.child_rows().iter().rev().map(|id| (depth + 1, id.as_str())));
        }
        out
    }

    fn tracked(&self) -> bool {
        self.version.is_some()
    }

    fn row_entity(&self, row_id: &str) -> EntityId {
        EntityId::row(self.id.account_id(), self.document_id(), row_id)
    }

    fn touch(&mut self) {
        let tracked = self.tracked();
        self.updated.set(Some(now_millis()), tracked);
    }

    fn marks(&mut self, changed: bool) -> Vec<EntityId> {
        if changed {
            self.touch();
            vec![self.id.clone()]
        } else {
            Vec::new()
        }
    }

    /// Sets the title.
    pub fn set_title(&mut self, title: Option<String>) -> Vec<EntityId> {
        let tracked = self.tracked();
        let changed = self.title.set(title, tracked);
        self.marks(changed)
    }

    /// Sets the tag names.
    pub fn set_tag_names(&mut self, tags: Vec<String>) -> Vec<EntityId> {
        let tracked = self.tracked();
        let changed = self.tag_names.set(Some(tags), tracked);
        self.marks(changed)
    }

    /// Sets the linked document ids.
    pub fn set_document_links(&mut self, links: Vec<String>) -> Vec<EntityId> {
        let tracked = self.tracked();
        let changed = self.document_links.set(Some(links), tracked);
        self.marks(changed)
    }

    /// Sets the owner of a shared document.
    pub fn set_owner(
        &mut self,
        name: Option<String>,
        email: Option<String>,
        url: Option<String>,
    ) -> Vec<EntityId> {
        let tracked = self.tracked();
        let mut changed = self.owner_name.set(name, tracked);
        changed |= self.owner_email.set(email, tracked);
        changed |= self.owner_url.set(url, tracked);
        self.marks(changed)
    }

    /// Sets the disambiguator.
    pub fn set_disambiguator(&mut self, value: i64) -> Vec<EntityId> {
        let tracked = self.tracked();
        let changed = self.disambiguator.set(Some(value), tracked);
        self.marks(changed)
    }

    /// Returns the parent of a row: `Some(None)` for top-level rows.
    pub fn parent_of(&self, row_id: &str) -> Option<Option<&str>> {
        if self.row_order().iter().any(|id| id == row_id) {
            return Some(None);
        }
        self.rows
            .values()
            .find(|row| row.child_rows().iter().any(|id| id == row_id))
            .map(|row| Some(row.row_id()))
    }

    fn child_order(&self, parent: Option<&str>) -> Option<Vec<String>> {
        match parent {
            None => Some(self.row_order().to_vec()),
            Some(parent) => self.rows.get(parent).map(|row| row.child_rows().to_vec()),
        }
    }

    fn set_child_order(&mut self, parent: Option<&str>, order: Vec<String>) -> Vec<EntityId> {
        match parent {
            None => {
                let tracked = self.tracked();
                let changed = self.row_order.set(Some(order), tracked);
                self.marks(changed)
            }
            Some(parent) => match self.rows.get_mut(parent) {
                Some(row) => row.set_child_rows(order),
                None => Vec::new(),
            },
        }
    }

    /// Adds a new row with a generated id under `parent` at `index`.
    pub fn add_row(
        &mut self,
        parent: Option<&str>,
        index: usize,
        topic: RichText,
    ) -> (String, Vec<EntityId>) {
        let row_id = Uuid::new_v4().to_string();
        let row = Row::new(self.row_entity(&row_id), topic);
        let marks = self.insert_row(parent, index, row);
        (row_id, marks)
    }

    /// Inserts a row under `parent` at `index`, clamped to the child count.
    ///
    /// Returns nothing if the parent does not exist.
    pub fn insert_row(&mut self, parent: Option<&str>, index: usize, row: Row) -> Vec<EntityId> {
        let Some(mut order) = self.child_order(parent) else {
            return Vec::new();
        };
        let row_id = row.row_id().to_string();
        order.retain(|id| id != &row_id);
        order.insert(index.min(order.len()), row_id.clone());

        let mut marks = self.set_child_order(parent, order);
        marks.push(row.entity_id().clone());
        self.rows.insert(row_id, row);
        marks
    }

    /// Removes a row and all of its descendants.
    ///
    /// The removed rows are returned for marking; since they no longer
    /// exist locally, pushing them deletes their records.
    pub fn remove_row(&mut self, row_id: &str) -> Vec<EntityId> {
        if !self.rows.contains_key(row_id) {
            return Vec::new();
        }

        let mut marks = Vec::new();
        if let Some(parent) = self.parent_of(row_id).map(|p| p.map(str::to_string)) {
            if let Some(mut order) = self.child_order(parent.as_deref()) {
                order.retain(|id| id != row_id);
                marks.extend(self.set_child_order(parent.as_deref(), order));
            }
        }

        let mut pending = vec![row_id.to_string()];
        while let Some(id) = pending.pop() {
            if let Some(row) = self.rows.remove(&id) {
                pending.extend(row.child_rows().iter().cloned());
                marks.push(row.entity_id().clone());
            }
        }
        marks
    }

    /// Moves a row under a new parent at `index`.
    ///
    /// Moving a row under itself or one of its descendants is refused.
    pub fn move_row(&mut self, row_id: &str, parent: Option<&str>, index: usize) -> Vec<EntityId> {
        if !self.rows.contains_key(row_id) {
            return Vec::new();
        }
        if let Some(target) = parent {
            if !self.rows.contains_key(target) || self.is_descendant(target, row_id) {
                return Vec::new();
            }
        }

        let mut marks = Vec::new();
        if let Some(old_parent) = self.parent_of(row_id).map(|p| p.map(str::to_string)) {
            if let Some(mut order) = self.child_order(old_parent.as_deref()) {
                order.retain(|id| id != row_id);
                marks.extend(self.set_child_order(old_parent.as_deref(), order));
            }
        }

        if let Some(mut order) = self.child_order(parent) {
            order.insert(index.min(order.len()), row_id.to_string());
            marks.extend(self.set_child_order(parent, order));
        }
        marks.sort();
        marks.dedup();
        marks
    }

    /// Returns true if `row_id` is `ancestor` or nested below it.
    fn is_descendant(&self, row_id: &str, ancestor: &str) -> bool {
        let mut pending = vec![ancestor];
        while let Some(id) = pending.pop() {
            if id == row_id {
                return true;
            }
            if let Some(row) = self.rows.get(id) {
                pending.extend(row.child_rows().iter().map(String::as_str));
            }
        }
        false
    }
}

impl SyncableRecord for Document {
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

        let old_order = self.row_order().to_vec();
        self.title.apply_remote(record.get_text(fields::TITLE));
        self.owner_name.apply_remote(record.get_text(fields::OWNER_NAME));
        self.owner_email.apply_remote(record.get_text(fields::OWNER_EMAIL));
        self.owner_url.apply_remote(record.get_text(fields::OWNER_URL));
        self.tag_names.apply_remote(record.get_text_list(fields::TAG_NAMES));
        self.document_links
            .apply_remote(record.get_text_list(fields::DOCUMENT_LINKS));
        self.created.apply_remote(record.get_date(fields::CREATED));
        self.updated.apply_remote(record.get_date(fields::UPDATED));
        self.disambiguator
            .apply_remote(record.get_integer(fields::DISAMBIGUATOR));
        let order_changed = self
            .row_order
            .apply_remote(record.get_text_list(fields::ROW_ORDER));
        self.version = record.version.clone();

        if order_changed {
            reordered_rows(&self.id, &old_order, self.row_order())
        } else {
            Vec::new()
        }
    }

    fn apply_conflict(&mut self, record: &RemoteRecord) {
        self.title.set_server(record.get_text(fields::TITLE));
        self.owner_name.set_server(record.get_text(fields::OWNER_NAME));
        self.owner_email.set_server(record.get_text(fields::OWNER_EMAIL));
        self.owner_url.set_server(record.get_text(fields::OWNER_URL));
        self.tag_names.set_server(record.get_text_list(fields::TAG_NAMES));
        self.row_order.set_server(record.get_text_list(fields::ROW_ORDER));
        self.document_links
            .set_server(record.get_text_list(fields::DOCUMENT_LINKS));
        self.created.set_server(record.get_date(fields::CREATED));
        self.updated.set_server(record.get_date(fields::UPDATED));
        self.disambiguator
            .set_server(record.get_integer(fields::DISAMBIGUATOR));
        self.version = record.version.clone();
    }

    fn build_record(&mut self, zone: &ZoneId) -> RemoteRecord {
        let mut record = RemoteRecord::new(record_id(&self.id, zone), RecordType::Document)
            .with_version(self.version.clone());

        let text = |value: Option<&String>| value.cloned().map(FieldValue::Text);
        let list = |value: Option<&Vec<String>>| value.cloned().map(FieldValue::TextList);

        record.set_opt(fields::TITLE, text(self.title.resolve()));
        record.set_opt(fields::OWNER_NAME, text(self.owner_name.resolve()));
        record.set_opt(fields::OWNER_EMAIL, text(self.owner_email.resolve()));
        record.set_opt(fields::OWNER_URL, text(self.owner_url.resolve()));
        record.set_opt(fields::TAG_NAMES, list(self.tag_names.resolve()));
        record.set_opt(fields::ROW_ORDER, list(self.row_order.resolve()));
        record.set_opt(fields::DOCUMENT_LINKS, list(self.document_links.resolve()));
        record.set_opt(fields::CREATED, self.created.resolve().copied().map(FieldValue::Date));
        record.set_opt(fields::UPDATED, self.updated.resolve().copied().map(FieldValue::Date));
        record.set_opt(
            fields::DISAMBIGUATOR,
            self.disambiguator.resolve().copied().map(FieldValue::Integer),
        );
        record
    }

    fn clear_sync_data(&mut self, saved: &RemoteRecord) {
        self.title.clear_sync_data(saved.get_text(fields::TITLE));
        self.owner_name.clear_sync_data(saved.get_text(fields::OWNER_NAME));
        self.owner_email.clear_sync_data(saved.get_text(fields::OWNER_EMAIL));
        self.owner_url.clear_sync_data(saved.get_text(fields::OWNER_URL));
        self.tag_names.clear_sync_data(saved.get_text_list(fields::TAG_NAMES));
        self.row_order.clear_sync_data(saved.get_text_list(fields::ROW_ORDER));
        self.document_links
            .clear_sync_data(saved.get_text_list(fields::DOCUMENT_LINKS));
        self.created.clear_sync_data(saved.get_date(fields::CREATED));
        self.updated.clear_sync_data(saved.get_date(fields::UPDATED));
        self.disambiguator
            .clear_sync_data(saved.get_integer(fields::DISAMBIGUATOR));
    }
}
