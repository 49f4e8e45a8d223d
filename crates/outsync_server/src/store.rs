//! Zone-partitioned record storage.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use outsync_protocol::{
    ChangeToken, DatabaseChanges, DeletedRecord, ModifyOutcome, RecordId, RecordOutcome, RecordType,
    RemoteRecord, VersionTag, ZoneChanges, ZoneId,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// One entry of a zone's change log.
#[derive(Debug, Clone)]
struct LogEntry {
    sequence: u64,
    name: String,
    record_type: RecordType,
}

#[derive(Debug, Default)]
struct Zone {
    records: BTreeMap<String, RemoteRecord>,
    log: Vec<LogEntry>,
    last_change: u64,
}

impl Zone {
    fn log(&mut self, sequence: u64, name: &str, record_type: RecordType) {
        self.log.push(LogEntry {
            sequence,
            name: name.to_string(),
            record_type,
        });
        self.last_change = sequence;
    }

    /// Removes a record and every record below it through parent references.
    fn remove_cascade(&mut self, name: &str, sequence: &mut u64) -> usize {
        let mut pending = vec![name.to_string()];
        let mut removed = 0;
        while let Some(name) = pending.pop() {
            let Some(record) = self.records.remove(&name) else {
                continue;
            };
            *sequence += 1;
            self.log(*sequence, &name, record.record_type);
            removed += 1;
            pending.extend(
                self.records
                    .values()
                    .filter(|r| r.parent.as_ref().is_some_and(|p| p.name == name))
                    .map(|r| r.id.name.clone()),
            );
        }
        removed
    }
}

#[derive(Debug, Default)]
struct ServerState {
    sequence: u64,
    next_version: u64,
    zones: BTreeMap<ZoneId, Zone>,
    deleted_zones: BTreeMap<ZoneId, u64>,
    faults: VecDeque<ServerError>,
}

impl ServerState {
    fn take_fault(&mut self) -> ServerResult<()> {
        match self.faults.pop_front() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn check_zone(&self, zone: &ZoneId) -> ServerResult<()> {
        if self.deleted_zones.contains_key(zone) {
            return Err(ServerError::ZoneDeleted(zone.clone()));
        }
        Ok(())
    }
}

fn encode_token(sequence: u64) -> ChangeToken {
    ChangeToken::from_bytes(sequence.to_be_bytes())
}

fn decode_token(token: Option<&ChangeToken>) -> ServerResult<u64> {
    let Some(token) = token else {
        return Ok(0);
    };
    let bytes: [u8; 8] = token
        .as_bytes()
        .try_into()
        .map_err(|_| ServerError::InvalidToken)?;
    Ok(u64::from_be_bytes(bytes))
}

/// In-memory record store with optimistic concurrency.
#[derive(Debug, Default)]
pub struct RecordServer {
    config: ServerConfig,
    state: RwLock<ServerState>,
}

impl RecordServer {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty server with a configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ServerState::default()),
        }
    }

    /// Makes the next request fail with `error`.
    pub fn inject_fault(&self, error: ServerError) {
        self.state.write().faults.push_back(error);
    }

    /// Current global sequence number.
    pub fn sequence(&self) -> u64 {
        self.state.read().sequence
    }

    /// Zones that currently exist.
    pub fn zones(&self) -> Vec<ZoneId> {
        self.state.read().zones.keys().cloned().collect()
    }

    /// Returns a stored record.
    pub fn record(&self, id: &RecordId) -> Option<RemoteRecord> {
        self.state
            .read()
            .zones
            .get(&id.zone)
            .and_then(|zone| zone.records.get(&id.name))
            .cloned()
    }

    /// All records of a zone.
    pub fn records(&self, zone: &ZoneId) -> Vec<RemoteRecord> {
        self.state
            .read()
            .zones
            .get(zone)
            .map(|z| z.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Creates a zone, reviving it if it was deleted.
    pub fn create_zone(&self, zone: &ZoneId) {
        let mut state = self.state.write();
        state.deleted_zones.remove(zone);
        state.sequence += 1;
        let sequence = state.sequence;
        state.zones.entry(zone.clone()).or_default().last_change = sequence;
    }

    /// Deletes a zone and everything in it.
    pub fn delete_zone(&self, zone: &ZoneId) -> bool {
        let mut state = self.state.write();
        if state.zones.remove(zone).is_none() {
            return false;
        }
        state.sequence += 1;
        let sequence = state.sequence;
        state.deleted_zones.insert(zone.clone(), sequence);
        debug!(%zone, "zone deleted");
        true
    }

    /// Returns the zones changed or deleted since `token`.
    pub fn fetch_database_changes(&self, token: Option<&ChangeToken>) -> ServerResult<DatabaseChanges> {
        let mut state = self.state.write();
        state.take_fault()?;
        let since = decode_token(token)?;

        let changed_zones = state
            .zones
            .iter()
            .filter(|(_, zone)| zone.last_change > since)
            .map(|(id, _)| id.clone())
            .collect();
        let deleted_zones = state
            .deleted_zones
            .iter()
            .filter(|(_, sequence)| **sequence > since)
            .map(|(id, _)| id.clone())
            .collect();

        Ok(DatabaseChanges {
            changed_zones,
            deleted_zones,
            token: encode_token(state.sequence.max(since)),
            more_coming: false,
        })
    }

    /// Returns the latest state of every record of a zone touched after
    /// `token`, in batches of at most `max_fetch_batch` log entries.
    pub fn fetch_zone_changes(&self, zone_id: &ZoneId, token: Option<&ChangeToken>) -> ServerResult<ZoneChanges> {
        let mut state = self.state.write();
        state.take_fault()?;
        state.check_zone(zone_id)?;
        let since = decode_token(token)?;

        let Some(zone) = state.zones.get(zone_id) else {
            return Ok(ZoneChanges {
                changed: Vec::new(),
                deleted: Vec::new(),
                token: encode_token(since),
                more_coming: false,
            });
        };

        let pending: Vec<&LogEntry> = zone.log.iter().filter(|e| e.sequence > since).collect();
        let window = &pending[..pending.len().min(self.config.max_fetch_batch)];
        let more_coming = pending.len() > window.len();
        let next = window.last().map_or(since, |e| e.sequence);

        let mut latest: BTreeMap<&str, &LogEntry> = BTreeMap::new();
        for entry in window {
            latest.insert(entry.name.as_str(), *entry);
        }
        let mut entries: Vec<&LogEntry> = latest.into_values().collect();
        entries.sort_by_key(|e| e.sequence);

        let mut changed = Vec::new();
        let mut deleted = Vec::new();
        for entry in entries {
            match zone.records.get(&entry.name) {
                Some(record) => changed.push(record.clone()),
                None => deleted.push(DeletedRecord {
                    id: RecordId::new(zone_id.clone(), entry.name.clone()),
                    record_type: entry.record_type,
                }),
            }
        }

        debug!(
            zone = %zone_id,
            changed = changed.len(),
            deleted = deleted.len(),
            more_coming,
            "served zone changes"
        );
        Ok(ZoneChanges {
            changed,
            deleted,
            token: encode_token(next),
            more_coming,
        })
    }

    /// Saves and deletes records in one zone.
    ///
    /// A save succeeds only if it carries the stored version, or no version
    /// for a record that does not exist yet. Saves are processed before
    /// deletes, and deletes cascade to child records.
    pub fn modify_records(
        &self,
        zone_id: &ZoneId,
        saves: Vec<RemoteRecord>,
        deletes: Vec<RecordId>,
    ) -> ServerResult<ModifyOutcome> {
        if saves.len() + deletes.len() > self.config.max_modify_batch {
            return Err(ServerError::InvalidRequest(format!(
                "batch of {} exceeds limit of {}",
                saves.len() + deletes.len(),
                self.config.max_modify_batch
            )));
        }

        let mut guard = self.state.write();
        guard.take_fault()?;
        guard.check_zone(zone_id)?;

        let ServerState {
            sequence,
            next_version,
            zones,
            ..
        } = &mut *guard;
        let zone = zones.entry(zone_id.clone()).or_default();
        let mut outcomes = Vec::with_capacity(saves.len() + deletes.len());

        for mut record in saves {
            if &record.id.zone != zone_id {
                outcomes.push(RecordOutcome::Failed {
                    id: record.id.clone(),
                    message: format!("record belongs to zone {}", record.id.zone),
                    retryable: false,
                });
                continue;
            }

            let outcome = match zone.records.get(&record.id.name) {
                None if record.version.is_some() => RecordOutcome::UnknownItem(record.id.clone()),
                Some(stored) if stored.version != record.version => RecordOutcome::Conflict {
                    server_record: stored.clone(),
                },
                _ => {
                    *sequence += 1;
                    *next_version += 1;
                    record.version = Some(VersionTag::from_bytes(next_version.to_be_bytes()));
                    zone.log(*sequence, &record.id.name, record.record_type);
                    zone.records.insert(record.id.name.clone(), record.clone());
                    RecordOutcome::Saved(record)
                }
            };
            outcomes.push(outcome);
        }

        for id in deletes {
            if zone.remove_cascade(&id.name, sequence) > 0 {
                outcomes.push(RecordOutcome::Deleted(id));
            } else {
                outcomes.push(RecordOutcome::UnknownItem(id));
            }
        }

        debug!(zone = %zone_id, outcomes = outcomes.len(), "modified records");
        Ok(ModifyOutcome { outcomes })
    }
}
