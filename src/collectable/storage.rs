//! Storage adapter contract for per-player unlock state, plus an in-memory
//! reference adapter and a timeout wrapper.
//!
//! Adapters are keyed by player id, namespace and entry id. Every call may fail
//! with a [`StorageError`]; the orchestrator surfaces those unchanged.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::collectable::errors::StorageError;
use crate::collectable::key::NamespacedKey;
use crate::collectable::progress::PlayerProgress;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CollectableStorage: Send + Sync {
    async fn load_unlocked_ids(
        &self,
        player: Uuid,
        namespace: &str,
    ) -> Result<BTreeSet<String>, StorageError>;

    /// Persist an unlock. Must report atomically whether the entry was newly
    /// inserted; `false` means it was already unlocked and nothing changed.
    async fn put_unlock(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
        when: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    async fn record_replay(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
        when: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Relock one entry. Returns whether it was unlocked.
    async fn delete_unlock(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
    ) -> Result<bool, StorageError>;

    /// Remove every unlock in `namespace`. Returns how many were removed.
    async fn clear_namespace(&self, player: Uuid, namespace: &str) -> Result<usize, StorageError>;

    async fn clear_all(&self, player: Uuid) -> Result<(), StorageError>;

    async fn is_unlocked(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
    ) -> Result<bool, StorageError>;

    /// Full export of one player's progress. Optional.
    async fn load_snapshot(&self, _player: Uuid) -> Result<PlayerProgress, StorageError> {
        Err(StorageError::Unsupported("load_snapshot"))
    }

    /// Replace one player's progress wholesale. Optional.
    async fn save_snapshot(
        &self,
        _player: Uuid,
        _snapshot: &PlayerProgress,
    ) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("save_snapshot"))
    }
}

#[async_trait]
impl<S: CollectableStorage + ?Sized> CollectableStorage for Arc<S> {
    async fn load_unlocked_ids(
        &self,
        player: Uuid,
        namespace: &str,
    ) -> Result<BTreeSet<String>, StorageError> {
        (**self).load_unlocked_ids(player, namespace).await
    }

    async fn put_unlock(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
        when: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        (**self).put_unlock(player, namespace, id, when).await
    }

    async fn record_replay(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
        when: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        (**self).record_replay(player, namespace, id, when).await
    }

    async fn delete_unlock(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
    ) -> Result<bool, StorageError> {
        (**self).delete_unlock(player, namespace, id).await
    }

    async fn clear_namespace(&self, player: Uuid, namespace: &str) -> Result<usize, StorageError> {
        (**self).clear_namespace(player, namespace).await
    }

    async fn clear_all(&self, player: Uuid) -> Result<(), StorageError> {
        (**self).clear_all(player).await
    }

    async fn is_unlocked(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
    ) -> Result<bool, StorageError> {
        (**self).is_unlocked(player, namespace, id).await
    }

    async fn load_snapshot(&self, player: Uuid) -> Result<PlayerProgress, StorageError> {
        (**self).load_snapshot(player).await
    }

    async fn save_snapshot(
        &self,
        player: Uuid,
        snapshot: &PlayerProgress,
    ) -> Result<(), StorageError> {
        (**self).save_snapshot(player, snapshot).await
    }
}

fn storage_key(namespace: &str, id: &str) -> Result<NamespacedKey, StorageError> {
    NamespacedKey::new(namespace, id).map_err(|err| StorageError::Serialization(err.to_string()))
}

/// Process-local adapter holding [`PlayerProgress`] records in a map. Nothing
/// survives a restart; meant for tests, tools, and as a reference for real
/// adapters.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    players: Mutex<HashMap<Uuid, PlayerProgress>>,
    latency: Option<Duration>,
    unlock_writes: AtomicUsize,
    replay_writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every operation, to widen race windows in tests
    /// or exercise [`TimeoutStorage`].
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `put_unlock` calls that inserted a new unlock.
    pub fn unlock_writes(&self) -> usize {
        self.unlock_writes.load(Ordering::SeqCst)
    }

    pub fn replay_writes(&self) -> usize {
        self.replay_writes.load(Ordering::SeqCst)
    }

    /// Copy of a player's stored record, if any.
    pub fn stored(&self, player: Uuid) -> Option<PlayerProgress> {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&player)
            .cloned()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn with_player<T>(&self, player: Uuid, f: impl FnOnce(&mut PlayerProgress) -> T) -> T {
        let mut players = self.players.lock().unwrap_or_else(PoisonError::into_inner);
        let progress = players
            .entry(player)
            .or_insert_with(|| PlayerProgress::new(player));
        f(progress)
    }
}

#[async_trait]
impl CollectableStorage for MemoryStorage {
    async fn load_unlocked_ids(
        &self,
        player: Uuid,
        namespace: &str,
    ) -> Result<BTreeSet<String>, StorageError> {
        self.pause().await;
        Ok(self.with_player(player, |p| p.unlocked_ids(namespace)))
    }

    async fn put_unlock(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
        when: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        self.pause().await;
        let key = storage_key(namespace, id)?;
        let inserted = self.with_player(player, |p| p.mark_unlock(&key, when));
        if inserted {
            self.unlock_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(inserted)
    }

    async fn record_replay(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
        when: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.pause().await;
        let key = storage_key(namespace, id)?;
        self.with_player(player, |p| p.mark_replay(&key, when));
        self.replay_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_unlock(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
    ) -> Result<bool, StorageError> {
        self.pause().await;
        let key = storage_key(namespace, id)?;
        Ok(self.with_player(player, |p| p.relock(&key)))
    }

    async fn clear_namespace(&self, player: Uuid, namespace: &str) -> Result<usize, StorageError> {
        self.pause().await;
        Ok(self.with_player(player, |p| p.clear_namespace(namespace)))
    }

    async fn clear_all(&self, player: Uuid) -> Result<(), StorageError> {
        self.pause().await;
        self.with_player(player, PlayerProgress::clear);
        Ok(())
    }

    async fn is_unlocked(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
    ) -> Result<bool, StorageError> {
        self.pause().await;
        let key = storage_key(namespace, id)?;
        Ok(self.with_player(player, |p| p.is_unlocked(&key)))
    }

    async fn load_snapshot(&self, player: Uuid) -> Result<PlayerProgress, StorageError> {
        self.pause().await;
        Ok(self.with_player(player, |p| p.clone()))
    }

    async fn save_snapshot(
        &self,
        player: Uuid,
        snapshot: &PlayerProgress,
    ) -> Result<(), StorageError> {
        self.pause().await;
        let mut record = snapshot.clone();
        record.player = player;
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player, record);
        Ok(())
    }
}

/// Wraps an adapter so that any call running past `timeout` fails with
/// [`StorageError::Timeout`] instead of hanging the caller.
pub struct TimeoutStorage<S> {
    inner: S,
    timeout: Duration,
}

impl<S: CollectableStorage> TimeoutStorage<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn guard<T, F>(&self, operation: &'static str, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                operation,
                millis: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl<S: CollectableStorage> CollectableStorage for TimeoutStorage<S> {
    async fn load_unlocked_ids(
        &self,
        player: Uuid,
        namespace: &str,
    ) -> Result<BTreeSet<String>, StorageError> {
        self.guard(
            "load_unlocked_ids",
            self.inner.load_unlocked_ids(player, namespace),
        )
        .await
    }

    async fn put_unlock(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
        when: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        self.guard("put_unlock", self.inner.put_unlock(player, namespace, id, when))
            .await
    }

    async fn record_replay(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
        when: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.guard(
            "record_replay",
            self.inner.record_replay(player, namespace, id, when),
        )
        .await
    }

    async fn delete_unlock(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
    ) -> Result<bool, StorageError> {
        self.guard("delete_unlock", self.inner.delete_unlock(player, namespace, id))
            .await
    }

    async fn clear_namespace(&self, player: Uuid, namespace: &str) -> Result<usize, StorageError> {
        self.guard("clear_namespace", self.inner.clear_namespace(player, namespace))
            .await
    }

    async fn clear_all(&self, player: Uuid) -> Result<(), StorageError> {
        self.guard("clear_all", self.inner.clear_all(player)).await
    }

    async fn is_unlocked(
        &self,
        player: Uuid,
        namespace: &str,
        id: &str,
    ) -> Result<bool, StorageError> {
        self.guard("is_unlocked", self.inner.is_unlocked(player, namespace, id))
            .await
    }

    async fn load_snapshot(&self, player: Uuid) -> Result<PlayerProgress, StorageError> {
        self.guard("load_snapshot", self.inner.load_snapshot(player))
            .await
    }

    async fn save_snapshot(
        &self,
        player: Uuid,
        snapshot: &PlayerProgress,
    ) -> Result<(), StorageError> {
        self.guard("save_snapshot", self.inner.save_snapshot(player, snapshot))
            .await
    }
}
