//! Room presence
//!
//! `PresenceState` mirrors the service's raw presence map (presence key to a
//! list of metas) and folds `presence_state` / `presence_diff` frames into it.
//! `PresenceCache` is the reconciled view a session exposes. Only a full sync
//! changes the cache; joins and leaves are observed and logged.

use std::collections::HashMap;

use roomkit_core::PresenceRecord;
use serde_json::Value;
use tracing::{debug, trace};

const PHX_REF: &str = "phx_ref";

/// Records that joined and left in one diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceChanges {
    pub joins: Vec<PresenceRecord>,
    pub leaves: Vec<PresenceRecord>,
}

/// Raw presence map: key -> metas, oldest first
#[derive(Debug, Clone, Default)]
pub struct PresenceState {
    entries: HashMap<String, Vec<Value>>,
}

impl PresenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a `presence_state` payload
    pub fn apply_state(&mut self, payload: &Value) {
        self.entries = parse_presence_map(payload);
    }

    /// Fold a `presence_diff` payload (`{joins, leaves}`) into the map
    pub fn apply_diff(&mut self, payload: &Value) -> PresenceChanges {
        let joins = payload.get("joins").map(parse_presence_map).unwrap_or_default();
        let leaves = payload.get("leaves").map(parse_presence_map).unwrap_or_default();
        let mut changes = PresenceChanges::default();

        for (key, new_metas) in joins {
            changes.joins.extend(new_metas.iter().filter_map(|m| to_record(&key, m)));

            let joined_refs: Vec<Option<&str>> = new_metas.iter().map(phx_ref).collect();
            let mut metas: Vec<Value> = self
                .entries
                .remove(&key)
                .unwrap_or_default()
                .into_iter()
                .filter(|m| !joined_refs.contains(&phx_ref(m)))
                .collect();
            metas.extend(new_metas);
            self.entries.insert(key, metas);
        }

        for (key, left_metas) in leaves {
            changes.leaves.extend(left_metas.iter().filter_map(|m| to_record(&key, m)));

            let left_refs: Vec<Option<&str>> = left_metas.iter().map(phx_ref).collect();
            if let Some(metas) = self.entries.get_mut(&key) {
                metas.retain(|m| !left_refs.contains(&phx_ref(m)));
                if metas.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }

        changes
    }

    /// One record per key (the most recent meta), ordered by participant id
    pub fn snapshot(&self) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> = self
            .entries
            .iter()
            .filter_map(|(key, metas)| metas.last().and_then(|m| to_record(key, m)))
            .collect();
        records.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        records
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Parse `{ "key": { "metas": [...] } }`
fn parse_presence_map(value: &Value) -> HashMap<String, Vec<Value>> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(key, entry)| {
                    entry
                        .get("metas")
                        .and_then(Value::as_array)
                        .map(|metas| (key.clone(), metas.clone()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn phx_ref(meta: &Value) -> Option<&str> {
    meta.get(PHX_REF).and_then(Value::as_str)
}

/// Decode a meta into a record, falling back to the presence key for the id
fn to_record(key: &str, meta: &Value) -> Option<PresenceRecord> {
    let mut meta = meta.clone();
    if let Some(obj) = meta.as_object_mut() {
        obj.entry("participantId")
            .or_insert_with(|| Value::from(key));
    }
    match serde_json::from_value(meta) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(key = %key, error = %e, "Skipping unreadable presence meta");
            None
        }
    }
}

/// Reconciled member list for one room
#[derive(Debug, Clone, Default)]
pub struct PresenceCache {
    members: HashMap<String, PresenceRecord>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mapping with a full-sync snapshot
    pub fn apply_sync(&mut self, snapshot: impl IntoIterator<Item = PresenceRecord>) {
        self.members = snapshot
            .into_iter()
            .map(|record| (record.participant_id.clone(), record))
            .collect();
        trace!(members = self.members.len(), "Presence synced");
    }

    /// Observed join. The next sync is authoritative.
    pub fn apply_join(&self, records: &[PresenceRecord]) {
        for record in records {
            debug!(participant_id = %record.participant_id, status = %record.status, "Participant joined");
        }
    }

    /// Observed leave. The next sync is authoritative.
    pub fn apply_leave(&self, records: &[PresenceRecord]) {
        for record in records {
            debug!(participant_id = %record.participant_id, "Participant left");
        }
    }

    pub fn get(&self, participant_id: &str) -> Option<&PresenceRecord> {
        self.members.get(participant_id)
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.members.contains_key(participant_id)
    }

    /// Members ordered by participant id
    pub fn members(&self) -> Vec<PresenceRecord> {
        let mut members: Vec<PresenceRecord> = self.members.values().cloned().collect();
        members.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}
