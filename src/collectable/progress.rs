//! Per-player unlock state as a flat, typed record.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collectable::errors::CodexError;
use crate::collectable::key::NamespacedKey;

pub const PROGRESS_SCHEMA_VERSION: u8 = 1;

/// State of one entry for one player.
///
/// `first_unlocked_at` is written on each Locked -> Unlocked transition and left
/// alone by replays. A relock keeps both timestamps; only `unlocked` flips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryProgress {
    pub unlocked: bool,
    #[serde(default)]
    pub first_unlocked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_replayed_at: Option<DateTime<Utc>>,
}

/// Everything known about one player's collectables. Also the snapshot format
/// exchanged with storage adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProgress {
    pub player: Uuid,
    #[serde(default)]
    pub entries: BTreeMap<NamespacedKey, EntryProgress>,
    pub schema_version: u8,
}

impl PlayerProgress {
    pub fn new(player: Uuid) -> Self {
        Self {
            player,
            entries: BTreeMap::new(),
            schema_version: PROGRESS_SCHEMA_VERSION,
        }
    }

    pub fn is_unlocked(&self, key: &NamespacedKey) -> bool {
        self.entries.get(key).is_some_and(|e| e.unlocked)
    }

    /// Mark `key` unlocked at `when`. Returns false, changing nothing, if it
    /// already was.
    pub fn mark_unlock(&mut self, key: &NamespacedKey, when: DateTime<Utc>) -> bool {
        let entry = self.entries.entry(key.clone()).or_default();
        if entry.unlocked {
            return false;
        }
        entry.unlocked = true;
        entry.first_unlocked_at = Some(when);
        true
    }

    /// Mark `key` unlocked without knowing when (state learned from storage).
    pub fn mark_unlocked_untimed(&mut self, key: &NamespacedKey) {
        self.entries.entry(key.clone()).or_default().unlocked = true;
    }

    pub fn mark_replay(&mut self, key: &NamespacedKey, when: DateTime<Utc>) {
        self.entries.entry(key.clone()).or_default().last_replayed_at = Some(when);
    }

    /// Flip `key` back to locked. Returns whether it was unlocked.
    pub fn relock(&mut self, key: &NamespacedKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.unlocked => {
                entry.unlocked = false;
                true
            }
            _ => false,
        }
    }

    /// Drop every entry of `namespace`, timestamps included. Returns how many
    /// were unlocked.
    pub fn clear_namespace(&mut self, namespace: &str) -> usize {
        let before = self.unlocked_ids(namespace).len();
        self.entries.retain(|key, _| key.namespace() != namespace);
        before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Make the unlocked set of `namespace` equal to `ids`, keeping any
    /// timestamps already recorded.
    pub fn reconcile_namespace(&mut self, namespace: &str, ids: &BTreeSet<String>) {
        for (key, entry) in self.entries.iter_mut() {
            if key.namespace() == namespace && !ids.contains(key.id()) {
                entry.unlocked = false;
            }
        }
        for id in ids {
            match NamespacedKey::new(namespace, id) {
                Ok(key) => self.mark_unlocked_untimed(&key),
                Err(err) => log::warn!("ignoring stored id '{}' in {}: {}", id, namespace, err),
            }
        }
    }

    pub fn unlocked_ids(&self, namespace: &str) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(key, entry)| entry.unlocked && key.namespace() == namespace)
            .map(|(key, _)| key.id().to_string())
            .collect()
    }

    pub fn unlocked_keys(&self) -> impl Iterator<Item = &NamespacedKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.unlocked)
            .map(|(key, _)| key)
    }

    pub fn namespaces(&self) -> BTreeSet<String> {
        self.entries
            .keys()
            .map(|key| key.namespace().to_string())
            .collect()
    }

    pub fn first_unlocked_at(&self, key: &NamespacedKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).and_then(|e| e.first_unlocked_at)
    }

    pub fn last_replayed_at(&self, key: &NamespacedKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).and_then(|e| e.last_replayed_at)
    }

    fn check_schema(self) -> Result<Self, CodexError> {
        if self.schema_version != PROGRESS_SCHEMA_VERSION {
            return Err(CodexError::SchemaMismatch {
                entity: "player progress",
                expected: PROGRESS_SCHEMA_VERSION,
                found: self.schema_version,
            });
        }
        Ok(self)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodexError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodexError> {
        bincode::deserialize::<Self>(bytes)?.check_schema()
    }

    pub fn to_json(&self) -> Result<String, CodexError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, CodexError> {
        serde_json::from_str::<Self>(text)?.check_schema()
    }
}
