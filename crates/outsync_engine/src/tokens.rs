//! Change-token store.
//!
//! Holds one opaque token for the account-wide shared scope and one per
//! zone, plus the zones that were deleted remotely and are no longer
//! synced. Tokens are stored verbatim and never parsed.

use crate::dir::{SyncDir, TOKENS_FILE};
use outsync_protocol::{ChangeToken, ZoneId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

const TOKENS_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TokenState {
    shared: Option<ChangeToken>,
    zones: BTreeMap<ZoneId, ChangeToken>,
    disabled: BTreeSet<ZoneId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokensFile {
    version: u32,
    shared: Option<ChangeToken>,
    zones: Vec<(ZoneId, ChangeToken)>,
    #[serde(default)]
    disabled: Vec<ZoneId>,
}

/// A point-in-time copy of the stored tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSnapshot {
    /// Shared-scope token.
    pub shared: Option<ChangeToken>,
    /// Per-zone tokens.
    pub zones: BTreeMap<ZoneId, ChangeToken>,
    /// Zones that are no longer synced.
    pub disabled: BTreeSet<ZoneId>,
}

/// Persistent change-token store.
#[derive(Debug)]
pub struct ChangeTokenStore {
    dir: Option<Arc<SyncDir>>,
    state: RwLock<TokenState>,
}

impl ChangeTokenStore {
    /// Creates a store that is not persisted.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            state: RwLock::new(TokenState::default()),
        }
    }

    /// Loads tokens from a state directory.
    ///
    /// A missing or unreadable file yields an empty store, which makes the
    /// next pull fetch everything again.
    pub fn load(dir: Arc<SyncDir>) -> Self {
        let state = match dir.load::<TokensFile>(TOKENS_FILE) {
            Ok(Some(file)) if file.version == TOKENS_FORMAT_VERSION => TokenState {
                shared: file.shared,
                zones: file.zones.into_iter().collect(),
                disabled: file.disabled.into_iter().collect(),
            },
            Ok(Some(file)) => {
                warn!(version = file.version, "unknown token format, starting empty");
                TokenState::default()
            }
            Ok(None) => TokenState::default(),
            Err(e) => {
                warn!(error = %e, "failed to read change tokens, starting empty");
                TokenState::default()
            }
        };
        debug!(zones = state.zones.len(), "loaded change tokens");

        Self {
            dir: Some(dir),
            state: RwLock::new(state),
        }
    }

    /// Returns the shared-scope token.
    pub fn shared_token(&self) -> Option<ChangeToken> {
        self.state.read().shared.clone()
    }

    /// Stores the shared-scope token.
    pub fn set_shared_token(&self, token: ChangeToken) {
        let mut state = self.state.write();
        state.shared = Some(token);
        self.persist(&state);
    }

    /// Returns the token of a zone.
    pub fn zone_token(&self, zone: &ZoneId) -> Option<ChangeToken> {
        self.state.read().zones.get(zone).cloned()
    }

    /// Stores the token of a zone.
    pub fn set_zone_token(&self, zone: &ZoneId, token: ChangeToken) {
        let mut state = self.state.write();
        state.zones.insert(zone.clone(), token);
        self.persist(&state);
    }

    /// Forgets the token of a zone so the next pull starts over.
    pub fn reset_zone(&self, zone: &ZoneId) -> bool {
        let mut state = self.state.write();
        let removed = state.zones.remove(zone).is_some();
        if removed {
            self.persist(&state);
        }
        removed
    }

    /// Forgets every token.
    pub fn reset_all(&self) {
        let mut state = self.state.write();
        state.shared = None;
        state.zones.clear();
        self.persist(&state);
    }

    /// Stops syncing a zone and forgets its token.
    pub fn disable_zone(&self, zone: &ZoneId) {
        let mut state = self.state.write();
        state.zones.remove(zone);
        state.disabled.insert(zone.clone());
        self.persist(&state);
    }

    /// Resumes syncing a previously disabled zone.
    pub fn enable_zone(&self, zone: &ZoneId) -> bool {
        let mut state = self.state.write();
        let removed = state.disabled.remove(zone);
        if removed {
            self.persist(&state);
        }
        removed
    }

    /// Returns true if a zone is no longer synced.
    pub fn is_disabled(&self, zone: &ZoneId) -> bool {
        self.state.read().disabled.contains(zone)
    }

    /// Returns the zones that have a token.
    pub fn zones(&self) -> Vec<ZoneId> {
        self.state.read().zones.keys().cloned().collect()
    }

    /// Returns a copy of everything stored.
    pub fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.read();
        TokenSnapshot {
            shared: state.shared.clone(),
            zones: state.zones.clone(),
            disabled: state.disabled.clone(),
        }
    }

    fn persist(&self, state: &TokenState) {
        let Some(dir) = &self.dir else {
            return;
        };
        let file = TokensFile {
            version: TOKENS_FORMAT_VERSION,
            shared: state.shared.clone(),
            zones: state
                .zones
                .iter()
                .map(|(zone, token)| (zone.clone(), token.clone()))
                .collect(),
            disabled: state.disabled.iter().cloned().collect(),
        };
        if let Err(e) = dir.store(TOKENS_FILE, &file) {
            warn!(error = %e, "failed to persist change tokens");
        }
    }
}
