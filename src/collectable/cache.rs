//! Per-player progress cache.
//!
//! Each player gets one slot guarded by an async mutex. Holding the slot is
//! what serializes that player's operations, including the storage calls made
//! while deciding.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::collectable::progress::PlayerProgress;

/// Cached state for one player plus which namespaces have been filled from
/// storage.
#[derive(Debug)]
pub struct CachedPlayer {
    pub progress: PlayerProgress,
    loaded_namespaces: HashSet<String>,
}

impl CachedPlayer {
    fn new(player: Uuid) -> Self {
        Self {
            progress: PlayerProgress::new(player),
            loaded_namespaces: HashSet::new(),
        }
    }

    pub fn is_loaded(&self, namespace: &str) -> bool {
        self.loaded_namespaces.contains(namespace)
    }

    pub fn mark_loaded(&mut self, namespace: &str) {
        self.loaded_namespaces.insert(namespace.to_string());
    }

    /// Replace the whole record, e.g. after a snapshot import. Every namespace
    /// present in `progress` counts as loaded.
    pub fn replace(&mut self, progress: PlayerProgress) {
        self.loaded_namespaces = progress.namespaces().into_iter().collect();
        self.progress = progress;
    }

    /// Drop everything, e.g. after clearing the player's progress in storage.
    /// All namespaces are then known to be empty, so they count as loaded.
    pub fn reset_all_loaded(&mut self, namespaces: impl IntoIterator<Item = String>) {
        self.progress.clear();
        self.loaded_namespaces = namespaces.into_iter().collect();
    }
}

pub type PlayerSlot = Arc<AsyncMutex<CachedPlayer>>;

#[derive(Debug, Default)]
pub struct ProgressCache {
    slots: Mutex<HashMap<Uuid, PlayerSlot>>,
}

impl ProgressCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `player`, created empty on first use.
    pub fn slot(&self, player: Uuid) -> PlayerSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(player).or_insert_with(|| {
            debug!("creating progress slot for {}", player);
            Arc::new(AsyncMutex::new(CachedPlayer::new(player)))
        }))
    }

    /// Forget a player. An operation already holding the slot finishes
    /// against the detached copy; the next one starts from storage.
    pub fn evict(&self, player: Uuid) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&player)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
