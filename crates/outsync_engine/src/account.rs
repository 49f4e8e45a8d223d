//! In-memory index of the documents of one account.

use crate::document::Document;
use crate::entity::SyncableRecord;
use crate::error::SyncResult;
use crate::image::Image;
use crate::queue::PendingMarker;
use crate::row::Row;
use outsync_protocol::{DeletedRecord, EntityId, RemoteRecord, VersionTag, ZoneId};
use std::collections::BTreeMap;
use tracing::debug;

/// All documents of an account, plus pulled records that arrived before
/// the records they belong to.
#[derive(Debug, Default)]
pub struct Account {
    id: u32,
    documents: BTreeMap<String, Document>,
    parked: BTreeMap<String, Vec<RemoteRecord>>,
}

impl Account {
    /// Creates an empty account.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            documents: BTreeMap::new(),
            parked: BTreeMap::new(),
        }
    }

    /// The account number.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Adds a document and returns markers for it and everything it holds.
    pub fn insert_document(&mut self, document: Document) -> Vec<PendingMarker> {
        let zone = document.zone().clone();
        let mut entities = vec![document.entity_id().clone()];
        for row in document.rows().values() {
            entities.push(row.entity_id().clone());
            entities.extend(row.images().values().map(|image| image.entity_id().clone()));
        }
        self.documents
            .insert(document.document_id().to_string(), document);
        markers(&zone, entities)
    }

    /// Returns a document.
    pub fn document(&self, document_id: &str) -> Option<&Document> {
        self.documents.get(document_id)
    }

    /// All documents by id.
    pub fn documents(&self) -> &BTreeMap<String, Document> {
        &self.documents
    }

    /// Documents stored in a zone.
    pub fn documents_in_zone<'a>(&'a self, zone: &'a ZoneId) -> impl Iterator<Item = &'a Document> {
        self.documents.values().filter(move |doc| doc.zone() == zone)
    }

    /// Runs a local edit on a document and returns the markers to queue.
    pub fn edit_document<F>(&mut self, document_id: &str, edit: F) -> Vec<PendingMarker>
    where
        F: FnOnce(&mut Document) -> Vec<EntityId>,
    {
        let Some(document) = self.documents.get_mut(document_id) else {
            return Vec::new();
        };
        let zone = document.zone().clone();
        markers(&zone, edit(document))
    }

    /// Removes a document locally. The returned marker pushes its deletion;
    /// the remote store removes its rows and images with it.
    pub fn remove_document(&mut self, document_id: &str) -> Vec<PendingMarker> {
        self.parked.remove(document_id);
        match self.documents.remove(document_id) {
            Some(document) => markers(document.zone(), vec![document.entity_id().clone()]),
            None => Vec::new(),
        }
    }

    /// Zone of the document that owns an entity.
    pub fn zone_of(&self, entity: &EntityId) -> Option<&ZoneId> {
        self.documents.get(entity.document_id()?).map(Document::zone)
    }

    /// Number of pulled records waiting for their parent.
    pub fn parked_len(&self) -> usize {
        self.parked.values().map(Vec::len).sum()
    }

    fn entity_mut(&mut self, entity: &EntityId) -> Option<&mut dyn SyncableRecord> {
        match entity {
            EntityId::Account { .. } => None,
            EntityId::Document { document, .. } => self
                .documents
                .get_mut(document)
                .map(|doc| doc as &mut dyn SyncableRecord),
            EntityId::Row { document, row, .. } => self
                .documents
                .get_mut(document)?
                .row_mut(row)
                .map(|row| row as &mut dyn SyncableRecord),
            EntityId::Image {
                document,
                row,
                image,
                ..
            } => self
                .documents
                .get_mut(document)?
                .row_mut(row)?
                .image_mut(image)
                .map(|image| image as &mut dyn SyncableRecord),
        }
    }

    /// Returns true if the entity exists locally.
    pub fn contains(&mut self, entity: &EntityId) -> bool {
        self.entity_mut(entity).is_some()
    }

    /// Builds the record to save for an entity, or `None` if the entity no
    /// longer exists and its record should be deleted.
    pub(crate) fn build_record(&mut self, entity: &EntityId, zone: &ZoneId) -> Option<RemoteRecord> {
        self.entity_mut(entity).map(|e| e.build_record(zone))
    }

    /// Stores a conflicting server record in the entity's server slots.
    pub(crate) fn apply_conflict(&mut self, entity: &EntityId, record: &RemoteRecord) -> bool {
        match self.entity_mut(entity) {
            Some(e) => {
                e.apply_conflict(record);
                true
            }
            None => false,
        }
    }

    /// Finishes a confirmed save of `sent`: shadows are cleared and the new
    /// version kept.
    pub(crate) fn complete_save(&mut self, entity: &EntityId, sent: &RemoteRecord, version: Option<VersionTag>) {
        if let Some(e) = self.entity_mut(entity) {
            e.clear_sync_data(sent);
            e.set_version(version);
        }
    }

    /// Drops the version tag so the next save creates the record anew.
    pub(crate) fn forget_version(&mut self, entity: &EntityId) {
        if let Some(e) = self.entity_mut(entity) {
            e.set_version(None);
        }
    }

    /// Applies a pulled record and returns the rows that visibly changed.
    ///
    /// Unknown entities are created. Rows and images whose parent has not
    /// been seen yet are parked until it arrives.
    pub(crate) fn apply_remote(&mut self, record: &RemoteRecord) -> SyncResult<Vec<EntityId>> {
        let entity = EntityId::from_record(self.id, record.record_type, &record.id.name)?;
        let mut changed = self.apply_one(&entity, record);

        if matches!(entity, EntityId::Document { .. } | EntityId::Row { .. }) {
            if let Some(document_id) = entity.document_id() {
                changed.extend(self.unpark(document_id));
            }
        }
        Ok(changed)
    }

    fn apply_one(&mut self, entity: &EntityId, record: &RemoteRecord) -> Vec<EntityId> {
        match entity {
            EntityId::Account { .. } => Vec::new(),
            EntityId::Document { document, .. } => self
                .documents
                .entry(document.clone())
                .or_insert_with(|| Document::empty(entity.clone(), record.id.zone.clone()))
                .apply(record),
            EntityId::Row { document, row, .. } => {
                let Some(doc) = self.documents.get_mut(document) else {
                    return self.park(document, record);
                };
                doc.rows_mut()
                    .entry(row.clone())
                    .or_insert_with(|| Row::empty(entity.clone()))
                    .apply(record)
            }
            EntityId::Image {
                document,
                row,
                image,
                ..
            } => {
                let Some(owner) = self
                    .documents
                    .get_mut(document)
                    .and_then(|doc| doc.row_mut(row))
                else {
                    return self.park(document, record);
                };
                owner
                    .images_mut()
                    .entry(image.clone())
                    .or_insert_with(|| Image::empty(entity.clone()))
                    .apply(record)
            }
        }
    }

    fn park(&mut self, document_id: &str, record: &RemoteRecord) -> Vec<EntityId> {
        debug!(record = %record.id, "parking record until its parent arrives");
        let parked = self.parked.entry(document_id.to_string()).or_default();
        parked.retain(|r| r.id != record.id);
        parked.push(record.clone());
        Vec::new()
    }

    fn unpark(&mut self, document_id: &str) -> Vec<EntityId> {
        let Some(mut records) = self.parked.remove(document_id) else {
            return Vec::new();
        };
        records.sort_by_key(|r| r.record_type);

        let mut changed = Vec::new();
        for record in &records {
            match EntityId::from_record(self.id, record.record_type, &record.id.name) {
                Ok(entity) => changed.extend(self.apply_one(&entity, record)),
                Err(e) => debug!(record = %record.id, error = %e, "dropping parked record"),
            }
        }
        changed
    }

    /// Applies a pulled deletion.
    ///
    /// Returns the document id for a deleted document, otherwise the rows
    /// that visibly changed.
    pub(crate) fn apply_remote_deletion(&mut self, deleted: &DeletedRecord) -> SyncResult<Vec<EntityId>> {
        let entity = EntityId::from_record(self.id, deleted.record_type, &deleted.id.name)?;
        if let Some(parked) = entity.document_id().and_then(|d| self.parked.get_mut(d)) {
            parked.retain(|r| r.id != deleted.id);
        }

        let changed = match &entity {
            EntityId::Account { .. } => Vec::new(),
            EntityId::Document { document, .. } => {
                self.parked.remove(document);
                match self.documents.remove(document) {
                    Some(_) => vec![entity.clone()],
                    None => Vec::new(),
                }
            }
            EntityId::Row { document, row, .. } => {
                match self
                    .documents
                    .get_mut(document)
                    .and_then(|doc| doc.rows_mut().remove(row))
                {
                    Some(_) => vec![entity.clone()],
                    None => Vec::new(),
                }
            }
            EntityId::Image {
                document,
                row,
                image,
                ..
            } => {
                let removed = self
                    .documents
                    .get_mut(document)
                    .and_then(|doc| doc.row_mut(row))
                    .and_then(|owner| owner.images_mut().remove(image));
                match (removed, entity.row_entity()) {
                    (Some(_), Some(owner)) => vec![owner],
                    _ => Vec::new(),
                }
            }
        };
        Ok(changed)
    }

    /// Removes every document stored in a zone and returns their ids.
    pub(crate) fn delete_zone(&mut self, zone: &ZoneId) -> Vec<EntityId> {
        let doomed: Vec<String> = self
            .documents
            .iter()
            .filter(|(_, doc)| doc.zone() == zone)
            .map(|(id, _)| id.clone())
            .collect();

        let mut deleted = Vec::with_capacity(doomed.len());
        for id in doomed {
            self.parked.remove(&id);
            if let Some(doc) = self.documents.remove(&id) {
                deleted.push(doc.entity_id().clone());
            }
        }
        self.parked
            .retain(|_, records| records.iter().all(|r| &r.id.zone != zone));
        deleted
    }
}

fn markers(zone: &ZoneId, entities: Vec<EntityId>) -> Vec<PendingMarker> {
    entities
        .into_iter()
        .map(|entity| PendingMarker::new(zone.clone(), entity))
        .collect()
}
