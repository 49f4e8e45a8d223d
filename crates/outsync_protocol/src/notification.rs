//! Push-notification intake.

use crate::ids::ZoneId;
use serde::Deserialize;
use serde_json::Value;

/// A change notification delivered by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteNotification {
    /// The account or shared scope changed; a full cycle is needed.
    Database,
    /// A specific zone changed.
    Zone(ZoneId),
}

#[derive(Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
enum Payload {
    Database,
    Zone { zone: String, owner: String },
}

impl RemoteNotification {
    /// Parses a notification payload.
    ///
    /// Payloads look like `{"scope": "database"}` or
    /// `{"scope": "zone", "zone": "Outlines", "owner": "__defaultOwner__"}`.
    /// Anything else yields `None` and should be ignored by the caller.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        match Payload::deserialize(payload).ok()? {
            Payload::Database => Some(RemoteNotification::Database),
            Payload::Zone { zone, owner } => Some(RemoteNotification::Zone(ZoneId::new(zone, owner))),
        }
    }
}
