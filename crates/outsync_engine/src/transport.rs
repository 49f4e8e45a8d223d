//! Remote store abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use outsync_protocol::{ChangeToken, DatabaseChanges, ModifyOutcome, RecordId, RemoteRecord, ZoneChanges, ZoneId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A record-oriented remote store.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (an HTTPS client, a loopback server, a mock for testing).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the zones that changed since the shared-scope token.
    async fn fetch_database_changes(&self, token: Option<ChangeToken>) -> SyncResult<DatabaseChanges>;

    /// Fetches the records of one zone that changed since the zone token.
    ///
    /// Fails with [`SyncError::ZoneDeleted`] if the zone no longer exists.
    async fn fetch_zone_changes(&self, zone: &ZoneId, token: Option<ChangeToken>) -> SyncResult<ZoneChanges>;

    /// Saves and deletes records in one zone.
    ///
    /// Saves are conditional on the version each record carries. The store
    /// processes every save before any delete.
    async fn modify_records(
        &self,
        zone: &ZoneId,
        saves: Vec<RemoteRecord>,
        deletes: Vec<RecordId>,
    ) -> SyncResult<ModifyOutcome>;
}

/// Network reachability check gating every sync cycle.
pub trait Reachability: Send + Sync {
    /// Returns true if the remote store can be contacted.
    fn is_reachable(&self) -> bool;
}

/// Reachability that always reports the network as up.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReachable;

impl Reachability for AlwaysReachable {
    fn is_reachable(&self) -> bool {
        true
    }
}

/// Reachability driven by a flag the host application flips.
#[derive(Debug)]
pub struct ReachabilityFlag {
    reachable: AtomicBool,
}

impl ReachabilityFlag {
    /// Creates a flag with an initial value.
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    /// Updates the flag.
    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

impl Default for ReachabilityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Reachability for ReachabilityFlag {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Runs a remote call with a deadline.
pub(crate) async fn with_timeout<F, T>(timeout: Duration, call: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout),
    }
}

/// A request recorded by [`MockRemoteStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockRequest {
    /// Database change fetch.
    DatabaseChanges(Option<ChangeToken>),
    /// Zone change fetch.
    ZoneChanges(ZoneId, Option<ChangeToken>),
    /// Record modification.
    Modify {
        /// Target zone.
        zone: ZoneId,
        /// Saved records.
        saves: Vec<RemoteRecord>,
        /// Deleted records.
        deletes: Vec<RecordId>,
    },
}

/// A scripted remote store for testing.
///
/// Responses are queued per call kind and handed out in order. A call with
/// no queued response returns an empty result.
#[derive(Debug, Default)]
pub struct MockRemoteStore {
    database: Mutex<VecDeque<SyncResult<DatabaseChanges>>>,
    zones: Mutex<VecDeque<SyncResult<ZoneChanges>>>,
    modifies: Mutex<VecDeque<SyncResult<ModifyOutcome>>>,
    requests: Mutex<Vec<MockRequest>>,
}

impl MockRemoteStore {
    /// Creates a new mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a database change response.
    pub fn push_database_changes(&self, response: SyncResult<DatabaseChanges>) {
        self.database.lock().push_back(response);
    }

    /// Queues a zone change response.
    pub fn push_zone_changes(&self, response: SyncResult<ZoneChanges>) {
        self.zones.lock().push_back(response);
    }

    /// Queues a modify response.
    pub fn push_modify(&self, response: SyncResult<ModifyOutcome>) {
        self.modifies.lock().push_back(response);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    /// Modify requests received so far.
    pub fn modify_requests(&self) -> Vec<MockRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| matches!(r, MockRequest::Modify { .. }))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn fetch_database_changes(&self, token: Option<ChangeToken>) -> SyncResult<DatabaseChanges> {
        self.requests.lock().push(MockRequest::DatabaseChanges(token.clone()));
        self.database.lock().pop_front().unwrap_or_else(|| {
            Ok(DatabaseChanges {
                changed_zones: Vec::new(),
                deleted_zones: Vec::new(),
                token: token.unwrap_or_else(|| ChangeToken::from_bytes(Vec::new())),
                more_coming: false,
            })
        })
    }

    async fn fetch_zone_changes(&self, zone: &ZoneId, token: Option<ChangeToken>) -> SyncResult<ZoneChanges> {
        self.requests
            .lock()
            .push(MockRequest::ZoneChanges(zone.clone(), token.clone()));
        self.zones.lock().pop_front().unwrap_or_else(|| {
            Ok(ZoneChanges {
                changed: Vec::new(),
                deleted: Vec::new(),
                token: token.unwrap_or_else(|| ChangeToken::from_bytes(Vec::new())),
                more_coming: false,
            })
        })
    }

    async fn modify_records(
        &self,
        zone: &ZoneId,
        saves: Vec<RemoteRecord>,
        deletes: Vec<RecordId>,
    ) -> SyncResult<ModifyOutcome> {
        self.requests.lock().push(MockRequest::Modify {
            zone: zone.clone(),
            saves,
            deletes,
        });
        self.modifies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ModifyOutcome::default()))
    }
}
