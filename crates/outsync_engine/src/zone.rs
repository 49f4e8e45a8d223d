//! Per-zone push and pull driver.

use crate::account::Account;
use crate::config::SyncConfig;
use crate::entity::record_id;
use crate::error::{SyncError, SyncResult};
use crate::tokens::ChangeTokenStore;
use crate::transport::{with_timeout, RemoteStore};
use outsync_protocol::{EntityId, RecordId, RecordOutcome, RemoteRecord, ZoneId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The state of one zone's sync driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing in flight.
    Idle,
    /// Sending local changes.
    Pushing,
    /// Fetching remote changes.
    Pulling,
}

impl SyncState {
    /// Returns true if the driver may move from this state to `next`.
    pub fn can_transition_to(self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::Idle, SyncState::Pushing)
                | (SyncState::Idle, SyncState::Pulling)
                | (SyncState::Pushing, SyncState::Pulling)
                | (SyncState::Pushing, SyncState::Idle)
                | (SyncState::Pulling, SyncState::Idle)
        )
    }

    /// Returns true if a remote call is in flight.
    pub fn is_active(self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// Outcome of pushing one zone.
#[derive(Debug, Default)]
pub struct PushReport {
    /// Entities whose save or delete was confirmed.
    pub succeeded: BTreeSet<EntityId>,
    /// Entities that stay queued.
    pub failed: BTreeSet<EntityId>,
    /// Records saved.
    pub saved: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Conflicts merged and retried.
    pub conflicts_merged: usize,
    /// The error that stopped the push, if any.
    pub error: Option<SyncError>,
}

/// Outcome of pulling one zone.
#[derive(Debug, Default)]
pub struct PullReport {
    /// Rows that visibly changed, by owning document.
    pub changed_rows: BTreeMap<EntityId, BTreeSet<EntityId>>,
    /// Documents removed by the remote store.
    pub deleted_documents: Vec<EntityId>,
    /// Records and deletions applied.
    pub records_applied: usize,
}

impl PullReport {
    fn add_rows(&mut self, rows: Vec<EntityId>) {
        for row in rows {
            if let Some(document) = row.document_entity() {
                self.changed_rows.entry(document).or_default().insert(row);
            }
        }
    }
}

/// Push/pull driver for one zone.
pub struct ZoneClient<S: RemoteStore> {
    zone: ZoneId,
    store: Arc<S>,
    config: SyncConfig,
    state: Mutex<SyncState>,
}

impl<S: RemoteStore> ZoneClient<S> {
    /// Creates a driver for a zone.
    pub fn new(zone: ZoneId, store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            zone,
            store,
            config,
            state: Mutex::new(SyncState::Idle),
        }
    }

    /// The zone this driver serves.
    pub fn zone(&self) -> &ZoneId {
        &self.zone
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    fn transition(&self, next: SyncState) -> SyncResult<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", *state),
                to: format!("{next:?}"),
            });
        }
        debug!(zone = %self.zone, from = ?*state, to = ?next, "zone state change");
        *state = next;
        Ok(())
    }

    fn finish(&self) {
        *self.state.lock() = SyncState::Idle;
    }

    /// Pushes the current state of the given entities.
    ///
    /// Entities that no longer exist locally are deleted remotely. Saves
    /// that conflict are merged with the server record and retried, at
    /// most `max_conflict_retries` times.
    pub async fn push(&self, account: &RwLock<Account>, entities: &[EntityId]) -> SyncResult<PushReport> {
        self.transition(SyncState::Pushing)?;
        let mut report = PushReport::default();
        for chunk in entities.chunks(self.config.push_batch_size.max(1)) {
            if let Err(e) = self.push_batch(account, chunk, &mut report).await {
                report.failed.extend(
                    chunk
                        .iter()
                        .filter(|entity| !report.succeeded.contains(*entity))
                        .cloned(),
                );
                report.error = Some(e);
                break;
            }
        }
        self.finish();

        info!(
            zone = %self.zone,
            saved = report.saved,
            deleted = report.deleted,
            conflicts = report.conflicts_merged,
            failed = report.failed.len(),
            "push finished"
        );
        Ok(report)
    }

    async fn push_batch(
        &self,
        account: &RwLock<Account>,
        batch: &[EntityId],
        report: &mut PushReport,
    ) -> SyncResult<()> {
        let mut pending = batch.to_vec();
        let mut attempt = 0u32;

        while !pending.is_empty() {
            attempt += 1;
            let (saves, deletes) = self.stage(account, &pending);
            let save_records: Vec<RemoteRecord> = saves.iter().map(|(_, r)| r.clone()).collect();
            let delete_ids: Vec<RecordId> = deletes.iter().map(|(_, id)| id.clone()).collect();
            debug!(
                zone = %self.zone,
                attempt,
                saves = save_records.len(),
                deletes = delete_ids.len(),
                "modifying records"
            );

            let outcome = with_timeout(
                self.config.request_timeout,
                self.store.modify_records(&self.zone, save_records, delete_ids),
            )
            .await?;

            let mut outcomes: HashMap<RecordId, RecordOutcome> = outcome
                .outcomes
                .into_iter()
                .map(|o| (o.record_id().clone(), o))
                .collect();

            let mut retry = Vec::new();
            let mut account = account.write();
            for (entity, record) in &saves {
                match outcomes.remove(&record.id) {
                    Some(RecordOutcome::Saved(saved)) => {
                        account.complete_save(entity, record, saved.version);
                        report.succeeded.insert(entity.clone());
                        report.saved += 1;
                    }
                    Some(RecordOutcome::Conflict { server_record }) => {
                        if attempt > self.config.max_conflict_retries {
                            warn!(record = %record.id, attempt, "giving up on conflicting save");
                            report.failed.insert(entity.clone());
                            if report.error.is_none() {
                                report.error = Some(SyncError::ConflictRetriesExhausted {
                                    record: record.id.clone(),
                                    attempts: attempt,
                                });
                            }
                            continue;
                        }
                        debug!(record = %record.id, "merging conflicting save");
                        account.apply_conflict(entity, &server_record);
                        report.conflicts_merged += 1;
                        retry.push(entity.clone());
                    }
                    Some(RecordOutcome::UnknownItem(_)) if attempt <= self.config.max_conflict_retries => {
                        debug!(record = %record.id, "record vanished remotely, saving as new");
                        account.forget_version(entity);
                        retry.push(entity.clone());
                    }
                    Some(RecordOutcome::Failed { message, retryable, .. }) => {
                        warn!(record = %record.id, %message, retryable, "save failed");
                        report.failed.insert(entity.clone());
                    }
                    other => {
                        warn!(record = %record.id, outcome = ?other, "unexpected save outcome");
                        report.failed.insert(entity.clone());
                    }
                }
            }

            for (entity, id) in &deletes {
                match outcomes.remove(id) {
                    Some(RecordOutcome::Deleted(_)) | Some(RecordOutcome::UnknownItem(_)) => {
                        report.succeeded.insert(entity.clone());
                        report.deleted += 1;
                    }
                    other => {
                        warn!(record = %id, outcome = ?other, "delete failed");
                        report.failed.insert(entity.clone());
                    }
                }
            }
            pending = retry;
        }
        Ok(())
    }

    /// Builds records for the entities, splitting saves from deletes.
    fn stage(
        &self,
        account: &RwLock<Account>,
        entities: &[EntityId],
    ) -> (Vec<(EntityId, RemoteRecord)>, Vec<(EntityId, RecordId)>) {
        let mut account = account.write();
        let mut saves = Vec::new();
        let mut deletes = Vec::new();
        for entity in entities {
            match account.build_record(entity, &self.zone) {
                Some(record) => saves.push((entity.clone(), record)),
                None => deletes.push((entity.clone(), record_id(entity, &self.zone))),
            }
        }
        (saves, deletes)
    }

    /// Pulls every change since the stored token.
    ///
    /// The zone token is advanced after each batch has been applied, so an
    /// interrupted pull fetches the same batch again.
    pub async fn pull(&self, account: &RwLock<Account>, tokens: &ChangeTokenStore) -> SyncResult<PullReport> {
        self.transition(SyncState::Pulling)?;
        let result = self.pull_all(account, tokens).await;
        self.finish();
        result
    }

    async fn pull_all(&self, account: &RwLock<Account>, tokens: &ChangeTokenStore) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        loop {
            let token = tokens.zone_token(&self.zone);
            let changes = with_timeout(
                self.config.request_timeout,
                self.store.fetch_zone_changes(&self.zone, token),
            )
            .await?;

            {
                let mut account = account.write();
                for record in &changes.changed {
                    match account.apply_remote(record) {
                        Ok(rows) => report.add_rows(rows),
                        Err(e) => warn!(record = %record.id, error = %e, "skipping malformed record"),
                    }
                }
                for deleted in &changes.deleted {
                    match account.apply_remote_deletion(deleted) {
                        Ok(removed) => {
                            for entity in removed {
                                match entity {
                                    EntityId::Document { .. } => report.deleted_documents.push(entity),
                                    _ => report.add_rows(vec![entity]),
                                }
                            }
                        }
                        Err(e) => warn!(record = %deleted.id, error = %e, "skipping malformed deletion"),
                    }
                }
            }
            report.records_applied += changes.changed.len() + changes.deleted.len();
            tokens.set_zone_token(&self.zone, changes.token);

            if !changes.more_coming {
                break;
            }
        }

        info!(zone = %self.zone, applied = report.records_applied, "pull finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::transport::{MockRemoteStore, MockRequest};
    use outsync_merge::RichText;
    use outsync_protocol::{fields, ChangeToken, FieldValue, ModifyOutcome, VersionTag, ZoneChanges};

    fn setup() -> (RwLock<Account>, String, Vec<EntityId>) {
        let mut account = Account::new(1);
        let mut doc = Document::create(1, ZoneId::default_zone(), "Doc");
        doc.add_row(None, 0, RichText::plain("Row"));
        let id = doc.document_id().to_string();
        let entities = account
            .insert_document(doc)
            .into_iter()
            .map(|m| m.entity)
            .collect();
        (RwLock::new(account), id, entities)
    }

    fn saved(records: &[RemoteRecord], version: u8) -> ModifyOutcome {
        ModifyOutcome {
            outcomes: records
                .iter()
                .map(|r| {
                    RecordOutcome::Saved(r.clone().with_version(Some(VersionTag::from_bytes(vec![version]))))
                })
                .collect(),
        }
    }

    fn client(store: &Arc<MockRemoteStore>) -> ZoneClient<MockRemoteStore> {
        ZoneClient::new(ZoneId::default_zone(), Arc::clone(store), SyncConfig::default())
    }

    #[test]
    fn state_transitions() {
        assert!(SyncState::Idle.can_transition_to(SyncState::Pushing));
        assert!(SyncState::Idle.can_transition_to(SyncState::Pulling));
        assert!(SyncState::Pushing.can_transition_to(SyncState::Pulling));
        assert!(!SyncState::Pulling.can_transition_to(SyncState::Pushing));
        assert!(!SyncState::Idle.can_transition_to(SyncState::Idle));
        assert!(SyncState::Pulling.is_active());
    }

    #[tokio::test]
    async fn push_saves_and_records_versions() {
        let (account, id, entities) = setup();
        let store = Arc::new(MockRemoteStore::new());
        let records: Vec<RemoteRecord> = entities
            .iter()
            .map(|e| account.write().build_record(e, &ZoneId::default_zone()).unwrap())
            .collect();
        store.push_modify(Ok(saved(&records, 1)));

        let report = client(&store).push(&account, &entities).await.unwrap();
        assert_eq!(report.saved, 2);
        assert!(report.failed.is_empty());
        assert!(report.error.is_none());

        let account = account.read();
        let doc = account.document(&id).unwrap();
        assert_eq!(
            crate::entity::SyncableRecord::version(doc),
            Some(&VersionTag::from_bytes(vec![1]))
        );
    }

    #[tokio::test]
    async fn missing_entities_become_deletes() {
        let (account, _, _) = setup();
        let store = Arc::new(MockRemoteStore::new());
        let gone = EntityId::row(1, "doc", "gone");
        let rid = record_id(&gone, &ZoneId::default_zone());
        store.push_modify(Ok(ModifyOutcome {
            outcomes: vec![RecordOutcome::UnknownItem(rid.clone())],
        }));

        let report = client(&store).push(&account, &[gone.clone()]).await.unwrap();
        assert!(report.succeeded.contains(&gone));
        match &store.modify_requests()[0] {
            MockRequest::Modify { saves, deletes, .. } => {
                assert!(saves.is_empty());
                assert_eq!(deletes, &vec![rid]);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[tokio::test]
    async fn conflict_is_merged_and_retried() {
        let (account, id, entities) = setup();
        let doc_entity = entities[0].clone();
        let zone = ZoneId::default_zone();
        let store = Arc::new(MockRemoteStore::new());

        // Synced once, then renamed locally
        let first = account.write().build_record(&doc_entity, &zone).unwrap();
        store.push_modify(Ok(saved(&[first], 1)));
        client(&store).push(&account, &[doc_entity.clone()]).await.unwrap();
        account
            .write()
            .edit_document(&id, |doc| doc.set_tag_names(vec!["local".into()]));

        let mut server = account.write().build_record(&doc_entity, &zone).unwrap();
        server.set(fields::TAG_NAMES, FieldValue::TextList(vec!["remote".into()]));
        server.set(fields::TITLE, FieldValue::Text("Remote title".into()));
        server.version = Some(VersionTag::from_bytes(vec![2]));
        store.push_modify(Ok(ModifyOutcome {
            outcomes: vec![RecordOutcome::Conflict {
                server_record: server,
            }],
        }));
        let retried = account.write().build_record(&doc_entity, &zone).unwrap();
        store.push_modify(Ok(saved(&[retried], 3)));

        let report = client(&store).push(&account, &[doc_entity.clone()]).await.unwrap();
        assert_eq!(report.conflicts_merged, 1);
        assert!(report.succeeded.contains(&doc_entity));

        let requests = store.modify_requests();
        let MockRequest::Modify { saves, .. } = &requests[2] else {
            panic!("expected modify");
        };
        assert_eq!(saves[0].version, Some(VersionTag::from_bytes(vec![2])));
        assert_eq!(
            saves[0].get_text_list(fields::TAG_NAMES),
            Some(vec!["remote".to_string(), "local".to_string()])
        );
        assert_eq!(saves[0].get_text(fields::TITLE).as_deref(), Some("Remote title"));
    }

    /// Renames the document while a save of title "B" is on the wire.
    struct RenamingStore {
        account: Arc<RwLock<Account>>,
        document_id: String,
        inner: MockRemoteStore,
    }

    #[async_trait::async_trait]
    impl RemoteStore for RenamingStore {
        async fn fetch_database_changes(
            &self,
            token: Option<ChangeToken>,
        ) -> SyncResult<outsync_protocol::DatabaseChanges> {
            self.inner.fetch_database_changes(token).await
        }

        async fn fetch_zone_changes(&self, zone: &ZoneId, token: Option<ChangeToken>) -> SyncResult<ZoneChanges> {
            self.inner.fetch_zone_changes(zone, token).await
        }

        async fn modify_records(
            &self,
            zone: &ZoneId,
            saves: Vec<RemoteRecord>,
            deletes: Vec<RecordId>,
        ) -> SyncResult<ModifyOutcome> {
            if saves.iter().any(|r| r.get_text(fields::TITLE).as_deref() == Some("B")) {
                self.account
                    .write()
                    .edit_document(&self.document_id, |doc| doc.set_title(Some("C".into())));
            }
            self.inner.modify_records(zone, saves, deletes).await
        }
    }

    #[tokio::test]
    async fn edit_during_save_survives_later_conflict() {
        let (account, id, entities) = setup();
        let account = Arc::new(account);
        let doc_entity = entities[0].clone();
        let zone = ZoneId::default_zone();
        let store = Arc::new(RenamingStore {
            account: Arc::clone(&account),
            document_id: id.clone(),
            inner: MockRemoteStore::new(),
        });
        let client = ZoneClient::new(zone.clone(), Arc::clone(&store), SyncConfig::default());

        let first = account.write().build_record(&doc_entity, &zone).unwrap();
        store.inner.push_modify(Ok(saved(&[first.clone()], 1)));
        client.push(&account, &[doc_entity.clone()]).await.unwrap();

        // "B" is confirmed, but "C" was typed before the confirmation arrived
        account
            .write()
            .edit_document(&id, |doc| doc.set_title(Some("B".into())));
        store.inner.push_modify(Ok(saved(&[first.clone()], 2)));
        client.push(&account, &[doc_entity.clone()]).await.unwrap();
        assert_eq!(account.read().document(&id).unwrap().title(), Some("C"));

        let mut server = first.clone();
        server.set(fields::TITLE, FieldValue::Text("X".into()));
        server.version = Some(VersionTag::from_bytes(vec![3]));
        store.inner.push_modify(Ok(ModifyOutcome {
            outcomes: vec![RecordOutcome::Conflict {
                server_record: server,
            }],
        }));
        store.inner.push_modify(Ok(saved(&[first], 4)));

        let report = client.push(&account, &[doc_entity.clone()]).await.unwrap();
        assert_eq!(report.conflicts_merged, 1);
        assert_eq!(account.read().document(&id).unwrap().title(), Some("C"));

        let requests = store.inner.modify_requests();
        let Some(MockRequest::Modify { saves, .. }) = requests.last() else {
            panic!("expected modify");
        };
        assert_eq!(saves[0].get_text(fields::TITLE).as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn endless_conflicts_are_bounded() {
        let (account, _, entities) = setup();
        let doc_entity = entities[0].clone();
        let zone = ZoneId::default_zone();
        let store = Arc::new(MockRemoteStore::new());
        let server = account.write().build_record(&doc_entity, &zone).unwrap();
        for _ in 0..10 {
            store.push_modify(Ok(ModifyOutcome {
                outcomes: vec![RecordOutcome::Conflict {
                    server_record: server.clone(),
                }],
            }));
        }

        let config = SyncConfig::default().with_max_conflict_retries(2);
        let client = ZoneClient::new(zone, Arc::clone(&store), config);
        let report = client.push(&account, &[doc_entity.clone()]).await.unwrap();

        assert!(report.failed.contains(&doc_entity));
        assert!(matches!(
            report.error,
            Some(SyncError::ConflictRetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(store.modify_requests().len(), 3);
        assert_eq!(client.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn transport_failure_keeps_batch_queued() {
        let (account, _, entities) = setup();
        let store = Arc::new(MockRemoteStore::new());
        store.push_modify(Err(SyncError::transport_retryable("offline")));

        let report = client(&store).push(&account, &entities).await.unwrap();
        assert_eq!(report.failed.len(), entities.len());
        assert!(report.error.as_ref().is_some_and(SyncError::is_retryable));
    }

    #[tokio::test]
    async fn pull_applies_batches_and_advances_token() {
        let (source, id, entities) = setup();
        let zone = ZoneId::default_zone();
        let records: Vec<RemoteRecord> = entities
            .iter()
            .map(|e| {
                let mut r = source.write().build_record(e, &zone).unwrap();
                r.version = Some(VersionTag::from_bytes(vec![1]));
                r
            })
            .collect();

        let store = Arc::new(MockRemoteStore::new());
        // Row first, document in the next batch
        store.push_zone_changes(Ok(ZoneChanges {
            changed: vec![records[1].clone()],
            deleted: Vec::new(),
            token: ChangeToken::from_bytes(vec![1]),
            more_coming: true,
        }));
        store.push_zone_changes(Ok(ZoneChanges {
            changed: vec![records[0].clone()],
            deleted: Vec::new(),
            token: ChangeToken::from_bytes(vec![2]),
            more_coming: false,
        }));

        let target = RwLock::new(Account::new(1));
        let tokens = ChangeTokenStore::in_memory();
        let report = client(&store).pull(&target, &tokens).await.unwrap();

        assert_eq!(report.records_applied, 2);
        assert_eq!(tokens.zone_token(&zone), Some(ChangeToken::from_bytes(vec![2])));
        assert_eq!(target.read().document(&id).unwrap().rows().len(), 1);
        assert!(report
            .changed_rows
            .contains_key(&EntityId::document(1, id.as_str())));
    }

    #[tokio::test]
    async fn failed_pull_keeps_token() {
        let store = Arc::new(MockRemoteStore::new());
        store.push_zone_changes(Err(SyncError::transport_retryable("reset")));

        let tokens = ChangeTokenStore::in_memory();
        let zone = ZoneId::default_zone();
        tokens.set_zone_token(&zone, ChangeToken::from_bytes(vec![9]));

        let account = RwLock::new(Account::new(1));
        let client = client(&store);
        assert!(client.pull(&account, &tokens).await.is_err());
        assert_eq!(tokens.zone_token(&zone), Some(ChangeToken::from_bytes(vec![9])));
        assert_eq!(client.state(), SyncState::Idle);
    }
}
