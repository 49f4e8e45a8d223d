//! Top-level sync orchestration.

use crate::account::Account;
use crate::config::SyncConfig;
use crate::debounce::Debouncer;
use crate::dir::SyncDir;
use crate::document::Document;
use crate::error::{SyncError, SyncResult};
use crate::observer::{NoopObserver, SyncObserver};
use crate::queue::{MutationQueue, PendingMarker};
use crate::tokens::ChangeTokenStore;
use crate::transport::{with_timeout, AlwaysReachable, Reachability, RemoteStore};
use crate::zone::{PullReport, PushReport, SyncState, ZoneClient};
use futures::future::join_all;
use outsync_protocol::{ChangeToken, EntityId, RemoteNotification, ZoneId};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that contacted the remote store.
    pub cycles_completed: u64,
    /// Cycles skipped because the network was unreachable.
    pub cycles_skipped: u64,
    /// Records saved or deleted remotely.
    pub records_pushed: u64,
    /// Records and deletions applied from pulls.
    pub records_pulled: u64,
    /// Conflicting saves that were merged and retried.
    pub conflicts_merged: u64,
    /// Whole-cycle retries.
    pub retries: u64,
    /// End of the last cycle.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one push-then-pull cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// The network was unreachable and nothing was attempted.
    pub skipped: bool,
    /// Records saved or deleted remotely.
    pub pushed: usize,
    /// Records and deletions applied locally.
    pub pulled: usize,
    /// Conflicting saves that were merged.
    pub conflicts_merged: usize,
    /// Rows that visibly changed, by document.
    pub changed_rows: BTreeMap<EntityId, BTreeSet<EntityId>>,
    /// Documents removed by the remote store.
    pub deleted_documents: Vec<EntityId>,
    /// Zones that no longer exist remotely.
    pub deleted_zones: Vec<ZoneId>,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
enum PullScope {
    All,
    Zone(ZoneId),
}

/// Drives sync for one account.
///
/// Cycles from the debounce timer, push notifications, explicit syncs and
/// app resume are serialized by one async mutex. Each cycle pushes every
/// pending marker, then pulls.
pub struct SyncCoordinator<S: RemoteStore> {
    config: SyncConfig,
    store: Arc<S>,
    reachability: Arc<dyn Reachability>,
    observer: Arc<dyn SyncObserver>,
    account: Arc<RwLock<Account>>,
    queue: MutationQueue,
    tokens: ChangeTokenStore,
    cycle: tokio::sync::Mutex<()>,
    zones: Mutex<BTreeMap<ZoneId, Arc<ZoneClient<S>>>>,
    stats: RwLock<SyncStats>,
    debouncer: Debouncer,
}

impl<S: RemoteStore + 'static> SyncCoordinator<S> {
    /// Creates a coordinator with in-memory queue and tokens.
    pub fn new(config: SyncConfig, store: S, account: Account) -> Self {
        let debouncer = Debouncer::new(config.debounce_delay);
        Self {
            config,
            store: Arc::new(store),
            reachability: Arc::new(AlwaysReachable),
            observer: Arc::new(NoopObserver),
            account: Arc::new(RwLock::new(account)),
            queue: MutationQueue::in_memory(),
            tokens: ChangeTokenStore::in_memory(),
            cycle: tokio::sync::Mutex::new(()),
            zones: Mutex::new(BTreeMap::new()),
            stats: RwLock::new(SyncStats::default()),
            debouncer,
        }
    }

    /// Persists the queue and change tokens in a state directory.
    pub fn with_state_dir(mut self, dir: SyncDir) -> Self {
        let dir = Arc::new(dir);
        self.queue = MutationQueue::load(Arc::clone(&dir));
        self.tokens = ChangeTokenStore::load(dir);
        self
    }

    /// Sets the reachability check.
    pub fn with_reachability(mut self, reachability: Arc<dyn Reachability>) -> Self {
        self.reachability = reachability;
        self
    }

    /// Sets the observer.
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The account being synced.
    pub fn account(&self) -> &Arc<RwLock<Account>> {
        &self.account
    }

    /// The mutation queue.
    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    /// The change-token store.
    pub fn tokens(&self) -> &ChangeTokenStore {
        &self.tokens
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// State of a zone's driver.
    pub fn state(&self, zone: &ZoneId) -> SyncState {
        self.zones
            .lock()
            .get(zone)
            .map_or(SyncState::Idle, |client| client.state())
    }

    fn zone_client(&self, zone: &ZoneId) -> Arc<ZoneClient<S>> {
        let mut zones = self.zones.lock();
        let client = zones.entry(zone.clone()).or_insert_with(|| {
            Arc::new(ZoneClient::new(
                zone.clone(),
                Arc::clone(&self.store),
                self.config.clone(),
            ))
        });
        Arc::clone(client)
    }

    /// Queues markers and arms the debounced flush.
    ///
    /// Markers for zones that were deleted remotely are dropped.
    pub fn mark(self: &Arc<Self>, markers: Vec<PendingMarker>) -> usize {
        let (kept, dropped): (Vec<_>, Vec<_>) = markers
            .into_iter()
            .partition(|marker| !self.tokens.is_disabled(&marker.zone));
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "dropping markers for deleted zones");
        }
        if kept.is_empty() {
            return 0;
        }

        let added = self.queue.mark_all(kept);
        let this = Arc::clone(self);
        self.debouncer.schedule(async move {
            if let Err(e) = this.flush().await {
                debug!(error = %e, "debounced flush failed");
            }
        });
        added
    }

    /// Adds a local document and queues it for pushing.
    pub fn insert_document(self: &Arc<Self>, document: Document) -> usize {
        let markers = self.account.write().insert_document(document);
        self.mark(markers)
    }

    /// Runs a local edit on a document and queues what it changed.
    pub fn edit<F>(self: &Arc<Self>, document_id: &str, edit: F) -> usize
    where
        F: FnOnce(&mut Document) -> Vec<EntityId>,
    {
        let markers = self.account.write().edit_document(document_id, edit);
        self.mark(markers)
    }

    /// Removes a local document and queues its remote deletion.
    pub fn remove_document(self: &Arc<Self>, document_id: &str) -> usize {
        let markers = self.account.write().remove_document(document_id);
        self.mark(markers)
    }

    /// Makes a deleted zone syncable again.
    pub fn enable_zone(&self, zone: &ZoneId) -> bool {
        self.tokens.enable_zone(zone)
    }

    /// Debounce target: a full cycle.
    pub async fn flush(&self) -> SyncResult<CycleReport> {
        self.run_cycle(PullScope::All).await
    }

    /// Explicit, user-initiated sync.
    pub async fn sync(&self) -> SyncResult<CycleReport> {
        self.run_cycle(PullScope::All).await
    }

    /// Sync after the application returns to the foreground.
    pub async fn resume(&self) -> SyncResult<CycleReport> {
        self.run_cycle(PullScope::All).await
    }

    /// Handles a push notification payload.
    ///
    /// A database notification runs a full cycle; a zone notification
    /// pushes every zone and pulls only that zone. Unrecognized payloads
    /// are ignored and yield `None`.
    pub async fn handle_notification(&self, payload: &Value) -> SyncResult<Option<CycleReport>> {
        match RemoteNotification::from_payload(payload) {
            Some(RemoteNotification::Database) => self.run_cycle(PullScope::All).await.map(Some),
            Some(RemoteNotification::Zone(zone)) => {
                self.run_cycle(PullScope::Zone(zone)).await.map(Some)
            }
            None => {
                warn!(%payload, "ignoring unrecognized notification");
                Ok(None)
            }
        }
    }

    /// Performs a sync with retry on transient errors.
    pub async fn sync_with_retry(&self) -> SyncResult<CycleReport> {
        let retry_config = &self.config.retry;
        let mut last_error = None;

        for attempt in 0..retry_config.max_attempts {
            if attempt > 0 {
                let delay = last_error
                    .as_ref()
                    .and_then(SyncError::retry_after)
                    .unwrap_or_else(|| retry_config.delay_for_attempt(attempt));
                tokio::time::sleep(delay).await;
                self.stats.write().retries += 1;
            }

            match self.sync().await {
                Ok(report) => return Ok(report),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry_config.max_attempts {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or(SyncError::Cancelled))
    }

    async fn run_cycle(&self, scope: PullScope) -> SyncResult<CycleReport> {
        let _cycle = self.cycle.lock().await;

        if !self.reachability.is_reachable() {
            info!("remote store not reachable, skipping sync");
            self.stats.write().cycles_skipped += 1;
            return Ok(CycleReport::skipped());
        }

        info!(?scope, pending = self.queue.len(), "sync cycle starting");
        self.observer.sync_will_begin();

        let mut report = CycleReport::default();
        let mut errors = Vec::new();
        self.push_all(&mut report, &mut errors).await;
        self.pull(scope, &mut report, &mut errors).await;

        self.observer.sync_did_end();
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.records_pushed += report.pushed as u64;
            stats.records_pulled += report.pulled as u64;
            stats.conflicts_merged += report.conflicts_merged as u64;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = errors.first().map(ToString::to_string);
        }

        for e in &errors {
            error!(error = %e, "sync failed");
            self.observer.report_error(e);
        }
        info!(
            pushed = report.pushed,
            pulled = report.pulled,
            errors = errors.len(),
            "sync cycle finished"
        );

        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn push_all(&self, report: &mut CycleReport, errors: &mut Vec<SyncError>) {
        let drained = self.queue.drain_for_push();
        if drained.is_empty() {
            return;
        }

        let mut pushes = Vec::new();
        for (zone, entities) in drained.by_zone() {
            if self.tokens.is_disabled(&zone) {
                self.queue.remove_zone(&zone);
                continue;
            }
            let client = self.zone_client(&zone);
            let account = &self.account;
            pushes.push(async move {
                let result = client.push(account, &entities).await;
                (zone, result)
            });
        }

        let mut succeeded = BTreeSet::new();
        let mut failed = BTreeSet::new();
        let mut deleted_zones = Vec::new();
        for (zone, result) in join_all(pushes).await {
            match result {
                Ok(push) => {
                    let PushReport {
                        succeeded: ok,
                        failed: not_ok,
                        saved,
                        deleted,
                        conflicts_merged,
                        error,
                    } = push;
                    report.pushed += saved + deleted;
                    report.conflicts_merged += conflicts_merged;
                    succeeded.extend(ok.into_iter().map(|e| PendingMarker::new(zone.clone(), e)));
                    failed.extend(not_ok.into_iter().map(|e| PendingMarker::new(zone.clone(), e)));
                    match error {
                        Some(SyncError::ZoneDeleted(_)) => deleted_zones.push(zone),
                        Some(e) => errors.push(e),
                        None => {}
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        self.queue.reconcile(&drained, &succeeded, &failed);
        for zone in deleted_zones {
            self.delete_zone(&zone, report);
        }
    }

    async fn pull(&self, scope: PullScope, report: &mut CycleReport, errors: &mut Vec<SyncError>) {
        let (zones, shared_token) = match scope {
            PullScope::Zone(zone) => (vec![zone], None),
            PullScope::All => match self.fetch_database_changes().await {
                Ok((changed, deleted, token)) => {
                    for zone in deleted.iter().filter(|z| !self.tokens.is_disabled(z)) {
                        self.delete_zone(zone, report);
                    }
                    (changed, Some(token))
                }
                Err(e) => {
                    errors.push(e);
                    return;
                }
            },
        };

        let mut pulls = Vec::new();
        for zone in zones {
            if self.tokens.is_disabled(&zone) {
                debug!(%zone, "skipping pull of deleted zone");
                continue;
            }
            let client = self.zone_client(&zone);
            let account = &self.account;
            let tokens = &self.tokens;
            pulls.push(async move {
                let result = client.pull(account, tokens).await;
                (zone, result)
            });
        }

        let mut all_pulled = true;
        for (zone, result) in join_all(pulls).await {
            match result {
                Ok(pull) => self.report_pull(pull, report),
                Err(SyncError::ZoneDeleted(_)) => self.delete_zone(&zone, report),
                Err(e) => {
                    all_pulled = false;
                    errors.push(e);
                }
            }
        }

        if let Some(token) = shared_token {
            if all_pulled {
                self.tokens.set_shared_token(token);
            }
        }
    }

    /// Fetches every zone change since the shared token.
    async fn fetch_database_changes(&self) -> SyncResult<(Vec<ZoneId>, Vec<ZoneId>, ChangeToken)> {
        let mut changed = BTreeSet::new();
        let mut deleted = BTreeSet::new();
        let mut token = self.tokens.shared_token();
        loop {
            let changes = with_timeout(
                self.config.request_timeout,
                self.store.fetch_database_changes(token.clone()),
            )
            .await?;
            changed.extend(changes.changed_zones);
            deleted.extend(changes.deleted_zones);
            let more = changes.more_coming;
            token = Some(changes.token);
            if !more {
                break;
            }
        }

        let changed = changed.difference(&deleted).cloned().collect();
        let token = token.unwrap_or_else(|| ChangeToken::from_bytes(Vec::new()));
        Ok((changed, deleted.into_iter().collect(), token))
    }

    fn report_pull(&self, pull: PullReport, report: &mut CycleReport) {
        report.pulled += pull.records_applied;
        for (document, rows) in pull.changed_rows {
            let rows_vec: Vec<EntityId> = rows.iter().cloned().collect();
            self.observer.rows_changed(&document, &rows_vec);
            report.changed_rows.entry(document).or_default().extend(rows);
        }
        if !pull.deleted_documents.is_empty() {
            self.observer.documents_deleted(&pull.deleted_documents);
            report.deleted_documents.extend(pull.deleted_documents);
        }
    }

    /// Removes everything local that belongs to a deleted zone and stops
    /// syncing it.
    fn delete_zone(&self, zone: &ZoneId, report: &mut CycleReport) {
        warn!(%zone, "zone deleted remotely, removing local documents");
        let documents = self.account.write().delete_zone(zone);
        self.tokens.disable_zone(zone);
        self.queue.remove_zone(zone);
        self.zones.lock().remove(zone);

        if !documents.is_empty() {
            self.observer.documents_deleted(&documents);
        }
        for document in &documents {
            report.changed_rows.remove(document);
        }
        report.deleted_documents.extend(documents);
        report.deleted_zones.push(zone.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockRemoteStore, MockRequest, ReachabilityFlag};
    use outsync_merge::RichText;
    use outsync_protocol::{DatabaseChanges, ModifyOutcome, RecordOutcome, VersionTag, ZoneChanges};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingObserver {
        begins: AtomicUsize,
        ends: AtomicUsize,
        errors: AtomicUsize,
        deleted: AtomicUsize,
    }

    impl SyncObserver for CountingObserver {
        fn sync_will_begin(&self) {
            self.begins.fetch_add(1, Ordering::SeqCst);
        }
        fn sync_did_end(&self) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
        fn documents_deleted(&self, documents: &[EntityId]) {
            self.deleted.fetch_add(documents.len(), Ordering::SeqCst);
        }
        fn report_error(&self, _error: &SyncError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coordinator(store: MockRemoteStore) -> Arc<SyncCoordinator<MockRemoteStore>> {
        let config = SyncConfig::default().with_debounce_delay(Duration::from_secs(3600));
        Arc::new(SyncCoordinator::new(config, store, Account::new(1)))
    }

    fn saved_all(request: &MockRequest, version: u8) -> ModifyOutcome {
        let MockRequest::Modify { saves, .. } = request else {
            return ModifyOutcome::default();
        };
        ModifyOutcome {
            outcomes: saves
                .iter()
                .map(|r| RecordOutcome::Saved(r.clone().with_version(Some(VersionTag::from_bytes(vec![version])))))
                .collect(),
        }
    }

    #[tokio::test]
    async fn unreachable_network_skips_cycle() {
        let flag = Arc::new(ReachabilityFlag::new(false));
        let coordinator = Arc::new(
            SyncCoordinator::new(SyncConfig::default(), MockRemoteStore::new(), Account::new(1))
                .with_reachability(flag.clone()),
        );
        coordinator.insert_document(Document::create(1, ZoneId::default_zone(), "Offline"));

        let report = coordinator.sync().await.unwrap();
        assert!(report.skipped);
        assert_eq!(coordinator.queue().len(), 1);
        assert_eq!(coordinator.stats().cycles_skipped, 1);
        assert!(coordinator.store.requests().is_empty());
    }

    #[tokio::test]
    async fn failed_push_keeps_markers() {
        let store = MockRemoteStore::new();
        store.push_modify(Err(SyncError::transport_retryable("connection reset")));
        let observer = Arc::new(CountingObserver::default());
        let coordinator = Arc::new(
            SyncCoordinator::new(SyncConfig::default(), store, Account::new(1))
                .with_observer(observer.clone()),
        );
        coordinator.insert_document(Document::create(1, ZoneId::default_zone(), "Doc"));

        let result = coordinator.sync().await;
        assert!(matches!(result, Err(SyncError::Transport { .. })));
        assert_eq!(coordinator.queue().len(), 1);
        assert_eq!(observer.begins.load(Ordering::SeqCst), 1);
        assert_eq!(observer.ends.load(Ordering::SeqCst), 1);
        assert_eq!(observer.errors.load(Ordering::SeqCst), 1);
        assert!(coordinator.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn successful_push_clears_markers() {
        let coordinator = coordinator(MockRemoteStore::new());
        let mut doc = Document::create(1, ZoneId::default_zone(), "Doc");
        doc.add_row(None, 0, RichText::plain("Row"));
        coordinator.insert_document(doc);

        // First cycle records the request, the scripted reply saves everything
        let probe = coordinator.sync().await.unwrap();
        assert_eq!(probe.pushed, 0);
        let request = coordinator.store.modify_requests()[0].clone();
        coordinator.store.push_modify(Ok(saved_all(&request, 1)));

        let report = coordinator.sync().await.unwrap();
        assert_eq!(report.pushed, 2);
        assert!(coordinator.queue().is_empty());
    }

    #[tokio::test]
    async fn zone_deletion_cascades_and_disables_zone() {
        let store = MockRemoteStore::new();
        let zone = ZoneId::default_zone();
        store.push_database_changes(Ok(DatabaseChanges {
            changed_zones: vec![zone.clone()],
            deleted_zones: Vec::new(),
            token: ChangeToken::from_bytes(vec![1]),
            more_coming: false,
        }));
        store.push_zone_changes(Err(SyncError::ZoneDeleted(zone.clone())));

        let observer = Arc::new(CountingObserver::default());
        let coordinator = Arc::new(
            SyncCoordinator::new(SyncConfig::default(), store, Account::new(1))
                .with_observer(observer.clone()),
        );
        let doc = Document::create(1, zone.clone(), "Doomed");
        coordinator.account().write().insert_document(doc);

        let report = coordinator.sync().await.unwrap();
        assert_eq!(report.deleted_zones, vec![zone.clone()]);
        assert!(coordinator.account().read().documents().is_empty());
        assert!(coordinator.tokens().is_disabled(&zone));
        assert_eq!(observer.deleted.load(Ordering::SeqCst), 1);
        // The shared token advances since the zone was handled
        assert_eq!(coordinator.tokens().shared_token(), Some(ChangeToken::from_bytes(vec![1])));

        // Later edits to the zone are dropped
        let added = coordinator.insert_document(Document::create(1, zone, "Again"));
        assert_eq!(added, 0);
        assert!(coordinator.queue().is_empty());
    }

    #[tokio::test]
    async fn zone_notification_pulls_only_that_zone() {
        let store = MockRemoteStore::new();
        let zone = ZoneId::new("Shared", "alice");
        store.push_zone_changes(Ok(ZoneChanges {
            changed: Vec::new(),
            deleted: Vec::new(),
            token: ChangeToken::from_bytes(vec![4]),
            more_coming: false,
        }));
        let coordinator = coordinator(store);

        let payload = serde_json::json!({ "scope": "zone", "zone": "Shared", "owner": "alice" });
        let report = coordinator.handle_notification(&payload).await.unwrap();
        assert!(report.is_some());

        let requests = coordinator.store.requests();
        assert_eq!(requests, vec![MockRequest::ZoneChanges(zone.clone(), None)]);
        assert_eq!(coordinator.tokens().zone_token(&zone), Some(ChangeToken::from_bytes(vec![4])));
        assert_eq!(coordinator.tokens().shared_token(), None);
    }

    #[tokio::test]
    async fn malformed_notification_is_ignored() {
        let coordinator = coordinator(MockRemoteStore::new());
        let payload = serde_json::json!({ "scope": "galaxy" });
        assert!(coordinator.handle_notification(&payload).await.unwrap().is_none());
        assert!(coordinator.store.requests().is_empty());
    }

    #[tokio::test]
    async fn failed_zone_pull_holds_shared_token() {
        let store = MockRemoteStore::new();
        store.push_database_changes(Ok(DatabaseChanges {
            changed_zones: vec![ZoneId::default_zone()],
            deleted_zones: Vec::new(),
            token: ChangeToken::from_bytes(vec![8]),
            more_coming: false,
        }));
        store.push_zone_changes(Err(SyncError::Timeout));
        let coordinator = coordinator(store);

        assert!(matches!(coordinator.sync().await, Err(SyncError::Timeout)));
        assert_eq!(coordinator.tokens().shared_token(), None);
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_errors() {
        let store = MockRemoteStore::new();
        store.push_database_changes(Err(SyncError::transport_retryable("flaky")));
        let config = SyncConfig::default().with_retry(
            crate::config::RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        );
        let coordinator = SyncCoordinator::new(config, store, Account::new(1));

        let report = coordinator.sync_with_retry().await.unwrap();
        assert!(!report.skipped);
        assert_eq!(coordinator.stats().retries, 1);
        assert_eq!(coordinator.stats().cycles_completed, 2);
    }

    #[tokio::test]
    async fn debounced_flush_runs_after_quiet_period() {
        let config = SyncConfig::default().with_debounce_delay(Duration::from_millis(20));
        let coordinator = Arc::new(SyncCoordinator::new(config, MockRemoteStore::new(), Account::new(1)));
        coordinator.insert_document(Document::create(1, ZoneId::default_zone(), "Later"));
        assert!(coordinator.store.requests().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(coordinator.store.modify_requests().len(), 1);
        assert_eq!(coordinator.stats().cycles_completed, 1);
    }
}
