//! Unlock orchestration.
//!
//! [`CollectableManager`] is the only writer of player progress. Every
//! operation takes the player's cache slot, fills the namespace from storage if
//! needed, decides, writes storage, and only then updates the cache. Discovery
//! hooks run before the slot is released, so a player's notices are queued in
//! the same order as the unlocks that produced them.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::collectable::cache::{CachedPlayer, ProgressCache};
use crate::collectable::clock::{Clock, SystemClock};
use crate::collectable::errors::CodexError;
use crate::collectable::key::NamespacedKey;
use crate::collectable::notice::{DiscoveryContext, NoticeOutbox, PlayerRef};
use crate::collectable::progress::PlayerProgress;
use crate::collectable::registry::RepositoryRegistry;
use crate::collectable::repository::{CollectableEntry, Repository};
use crate::collectable::storage::CollectableStorage;

/// Result of an unlock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Locked before this call; the discover hook ran.
    NewlyUnlocked,
    /// Already unlocked and the entry allows replay; the replay hook ran.
    Replayed,
    /// Already unlocked and replay is not allowed. Nothing was written.
    Denied,
}

impl UnlockOutcome {
    /// Collapsed boolean: true unless denied.
    pub fn unlocked(self) -> bool {
        !matches!(self, UnlockOutcome::Denied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoProgress {
    pub unlocked: usize,
    pub total: usize,
}

impl RepoProgress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.unlocked >= self.total
    }

    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.unlocked as f32 * 100.0 / self.total as f32
    }
}

/// An entry as a given player sees it.
#[derive(Debug, Clone)]
pub struct EntryStatus {
    pub entry: CollectableEntry,
    pub unlocked: bool,
}

pub struct CollectableManager {
    registry: Arc<RepositoryRegistry>,
    storage: Arc<dyn CollectableStorage>,
    cache: ProgressCache,
    clock: Arc<dyn Clock>,
    outbox: NoticeOutbox,
}

impl CollectableManager {
    pub fn new(registry: Arc<RepositoryRegistry>, storage: Arc<dyn CollectableStorage>) -> Self {
        Self {
            registry,
            storage,
            cache: ProgressCache::new(),
            clock: Arc::new(SystemClock),
            outbox: NoticeOutbox::disabled(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Where discovery hooks send their notices. Disabled by default.
    pub fn with_outbox(mut self, outbox: NoticeOutbox) -> Self {
        self.outbox = outbox;
        self
    }

    pub fn registry(&self) -> &Arc<RepositoryRegistry> {
        &self.registry
    }

    pub fn cached_players(&self) -> usize {
        self.cache.len()
    }

    fn resolve(&self, key: &NamespacedKey) -> Result<CollectableEntry, CodexError> {
        self.registry
            .resolve(key)
            .ok_or_else(|| CodexError::UnknownCollectable(key.to_string()))
    }

    fn repository(&self, namespace: &str) -> Result<Arc<Repository>, CodexError> {
        self.registry
            .get(namespace)
            .ok_or_else(|| CodexError::UnknownNamespace(namespace.to_string()))
    }

    /// Make sure `namespace` has been read from storage into `cached`.
    async fn fill(
        &self,
        player: Uuid,
        cached: &mut CachedPlayer,
        namespace: &str,
    ) -> Result<(), CodexError> {
        if cached.is_loaded(namespace) {
            return Ok(());
        }
        let ids = self.storage.load_unlocked_ids(player, namespace).await?;
        debug!(
            "loaded {} unlocked ids in '{}' for {}",
            ids.len(),
            namespace,
            player
        );
        cached.progress.reconcile_namespace(namespace, &ids);
        cached.mark_loaded(namespace);
        Ok(())
    }

    /// Attempt to unlock `key` for `player`.
    ///
    /// Concurrent calls for the same player are serialized, so of several
    /// racing unlocks of a locked entry exactly one reports
    /// [`UnlockOutcome::NewlyUnlocked`]. On a storage error nothing in the
    /// cache changes and no hook runs.
    pub async fn unlock(
        &self,
        player: &PlayerRef,
        key: &NamespacedKey,
    ) -> Result<UnlockOutcome, CodexError> {
        let entry = self.resolve(key)?;
        let slot = self.cache.slot(player.id);
        let mut cached = slot.lock().await;
        self.fill(player.id, &mut cached, key.namespace()).await?;

        let now = self.clock.now();
        let mut newly = false;
        if !cached.progress.is_unlocked(key) {
            newly = self
                .storage
                .put_unlock(player.id, key.namespace(), key.id(), now)
                .await?;
            if newly {
                cached.progress.mark_unlock(key, now);
            } else {
                debug!("{} was already unlocked in storage for {}", key, player.id);
                cached.progress.mark_unlocked_untimed(key);
            }
        }

        let outcome = if newly {
            UnlockOutcome::NewlyUnlocked
        } else if entry.allow_replay() {
            self.storage
                .record_replay(player.id, key.namespace(), key.id(), now)
                .await?;
            cached.progress.mark_replay(key, now);
            UnlockOutcome::Replayed
        } else {
            UnlockOutcome::Denied
        };

        debug!("unlock {} for {} ({}): {:?}", key, player.name, player.id, outcome);
        // Hooks only queue notices, so holding the slot here never blocks on a consumer.
        self.run_hook(&entry, player, outcome);
        drop(cached);
        Ok(outcome)
    }

    fn run_hook(&self, entry: &CollectableEntry, player: &PlayerRef, outcome: UnlockOutcome) {
        let Some(hook) = entry.collectable().as_discoverable() else {
            return;
        };
        let ctx = DiscoveryContext::new(player, entry.key(), &self.outbox);
        match outcome {
            UnlockOutcome::NewlyUnlocked => hook.on_discover(&ctx),
            UnlockOutcome::Replayed => hook.on_replay(&ctx),
            UnlockOutcome::Denied => {}
        }
    }

    pub async fn is_unlocked(&self, player: Uuid, key: &NamespacedKey) -> Result<bool, CodexError> {
        self.resolve(key)?;
        let slot = self.cache.slot(player);
        let mut cached = slot.lock().await;
        self.fill(player, &mut cached, key.namespace()).await?;
        Ok(cached.progress.is_unlocked(key))
    }

    /// Unlocked ids in `namespace` that still name a registered entry.
    pub async fn unlocked_ids(
        &self,
        player: Uuid,
        namespace: &str,
    ) -> Result<BTreeSet<String>, CodexError> {
        let repo = self.repository(namespace)?;
        let slot = self.cache.slot(player);
        let mut cached = slot.lock().await;
        self.fill(player, &mut cached, namespace).await?;
        Ok(cached
            .progress
            .unlocked_ids(namespace)
            .into_iter()
            .filter(|id| repo.get(id).is_some())
            .collect())
    }

    /// Lock `key` again. Returns whether it was unlocked in storage. Recorded
    /// timestamps are kept.
    pub async fn relock(&self, player: Uuid, key: &NamespacedKey) -> Result<bool, CodexError> {
        self.repository(key.namespace())?;
        let slot = self.cache.slot(player);
        let mut cached = slot.lock().await;
        let existed = self
            .storage
            .delete_unlock(player, key.namespace(), key.id())
            .await?;
        cached.progress.relock(key);
        debug!("relocked {} for {} (existed: {})", key, player, existed);
        Ok(existed)
    }

    /// Remove every unlock in `namespace`. Returns the count storage removed,
    /// which includes ids no longer registered and so can exceed what
    /// [`unlocked_ids`](Self::unlocked_ids) reported.
    pub async fn clear_repo(&self, player: Uuid, namespace: &str) -> Result<usize, CodexError> {
        self.repository(namespace)?;
        let slot = self.cache.slot(player);
        let mut cached = slot.lock().await;
        let removed = self.storage.clear_namespace(player, namespace).await?;
        cached.progress.clear_namespace(namespace);
        cached.mark_loaded(namespace);
        info!("cleared {} unlocks in '{}' for {}", removed, namespace, player);
        Ok(removed)
    }

    pub async fn clear_all(&self, player: Uuid) -> Result<(), CodexError> {
        let slot = self.cache.slot(player);
        let mut cached = slot.lock().await;
        self.storage.clear_all(player).await?;
        cached.reset_all_loaded(self.registry.namespaces());
        info!("cleared all unlocks for {}", player);
        Ok(())
    }

    /// When `key` was last unlocked. Only known for unlocks performed by this
    /// process or carried in an imported snapshot; ids read back through
    /// `load_unlocked_ids` have no timestamp.
    pub async fn first_unlocked_at(
        &self,
        player: Uuid,
        key: &NamespacedKey,
    ) -> Result<Option<DateTime<Utc>>, CodexError> {
        self.resolve(key)?;
        let slot = self.cache.slot(player);
        let mut cached = slot.lock().await;
        self.fill(player, &mut cached, key.namespace()).await?;
        Ok(cached.progress.first_unlocked_at(key))
    }

    pub async fn last_replayed_at(
        &self,
        player: Uuid,
        key: &NamespacedKey,
    ) -> Result<Option<DateTime<Utc>>, CodexError> {
        self.resolve(key)?;
        let slot = self.cache.slot(player);
        let mut cached = slot.lock().await;
        self.fill(player, &mut cached, key.namespace()).await?;
        Ok(cached.progress.last_replayed_at(key))
    }

    pub async fn progress(&self, player: Uuid, namespace: &str) -> Result<RepoProgress, CodexError> {
        let total = self.repository(namespace)?.len();
        let unlocked = self.unlocked_ids(player, namespace).await?.len();
        Ok(RepoProgress { unlocked, total })
    }

    /// Entries of `namespace` the player may see, in id order. Locked entries
    /// with `show_when_locked = false` are left out.
    pub async fn visible_entries(
        &self,
        player: Uuid,
        namespace: &str,
    ) -> Result<Vec<EntryStatus>, CodexError> {
        let repo = self.repository(namespace)?;
        let unlocked = self.unlocked_ids(player, namespace).await?;
        Ok(repo
            .entries()
            .iter()
            .map(|(id, entry)| EntryStatus {
                entry: entry.clone(),
                unlocked: unlocked.contains(id),
            })
            .filter(|status| status.unlocked || status.entry.show_when_locked())
            .collect())
    }

    /// Full progress record as storage holds it.
    pub async fn export_snapshot(&self, player: Uuid) -> Result<PlayerProgress, CodexError> {
        let slot = self.cache.slot(player);
        let _cached = slot.lock().await;
        Ok(self.storage.load_snapshot(player).await?)
    }

    /// Replace the player's progress with `snapshot`, in storage and cache.
    pub async fn import_snapshot(
        &self,
        player: Uuid,
        mut snapshot: PlayerProgress,
    ) -> Result<(), CodexError> {
        snapshot.player = player;
        let slot = self.cache.slot(player);
        let mut cached = slot.lock().await;
        self.storage.save_snapshot(player, &snapshot).await?;
        info!(
            "imported snapshot for {} with {} unlocks",
            player,
            snapshot.unlocked_keys().count()
        );
        cached.replace(snapshot);
        Ok(())
    }

    /// Drop the player's cached progress. Returns whether anything was cached.
    pub fn evict(&self, player: Uuid) -> bool {
        let evicted = self.cache.evict(player);
        if evicted {
            debug!("evicted progress for {}", player);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectable::clock::ManualClock;
    use crate::collectable::codec::TypeRegistry;
    use crate::collectable::errors::StorageError;
    use crate::collectable::notice::Notice;
    use crate::collectable::storage::{MemoryStorage, MockCollectableStorage};
    use crate::collectable::types::BasicCollectable;
    use chrono::{Duration, TimeZone};

    fn registry() -> Arc<RepositoryRegistry> {
        let registry = RepositoryRegistry::new(Arc::new(TypeRegistry::with_builtin()));
        registry
            .register(
                Repository::builder("notes")
                    .entry("a", BasicCollectable::new("Note A").with_player_message("found a"))
                    .entry("b", BasicCollectable::new("Note B").with_replay(true))
                    .entry("secret", BasicCollectable::new("Secret").hidden_when_locked())
                    .build()
                    .unwrap(),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn key(text: &str) -> NamespacedKey {
        text.parse().unwrap()
    }

    fn player() -> PlayerRef {
        PlayerRef::new(Uuid::new_v4(), "Alex")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn failing(operation: &'static str) -> StorageError {
        StorageError::backend(operation, "connection reset")
    }

    fn empty_namespace_loads(mock: &mut MockCollectableStorage) {
        mock.expect_load_unlocked_ids()
            .returning(|_, _| Ok(BTreeSet::new()));
    }

    #[tokio::test]
    async fn unlock_then_deny_or_replay() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = CollectableManager::new(registry(), storage.clone()).with_clock(clock.clone());
        let alex = player();

        assert_eq!(
            manager.unlock(&alex, &key("notes:a")).await.unwrap(),
            UnlockOutcome::NewlyUnlocked
        );
        assert_eq!(
            manager.unlock(&alex, &key("notes:a")).await.unwrap(),
            UnlockOutcome::Denied
        );

        manager.unlock(&alex, &key("notes:b")).await.unwrap();
        clock.advance(Duration::minutes(10));
        let replay = manager.unlock(&alex, &key("notes:b")).await.unwrap();
        assert_eq!(replay, UnlockOutcome::Replayed);
        assert!(replay.unlocked());

        assert_eq!(storage.unlock_writes(), 2);
        assert_eq!(storage.replay_writes(), 1);
        assert_eq!(
            manager.first_unlocked_at(alex.id, &key("notes:b")).await.unwrap(),
            Some(t0())
        );
        assert_eq!(
            manager.last_replayed_at(alex.id, &key("notes:b")).await.unwrap(),
            Some(t0() + Duration::minutes(10))
        );
    }

    #[tokio::test]
    async fn unknown_keys_and_namespaces_are_rejected() {
        let manager = CollectableManager::new(registry(), Arc::new(MemoryStorage::new()));
        let alex = player();
        assert!(matches!(
            manager.unlock(&alex, &key("notes:zzz")).await,
            Err(CodexError::UnknownCollectable(k)) if k == "notes:zzz"
        ));
        assert!(matches!(
            manager.is_unlocked(alex.id, &key("fish:cod")).await,
            Err(CodexError::UnknownCollectable(_))
        ));
        assert!(matches!(
            manager.unlocked_ids(alex.id, "fish").await,
            Err(CodexError::UnknownNamespace(_))
        ));
        assert!(matches!(
            manager.clear_repo(alex.id, "fish").await,
            Err(CodexError::UnknownNamespace(_))
        ));
        assert!(matches!(
            manager.relock(alex.id, &key("fish:cod")).await,
            Err(CodexError::UnknownNamespace(_))
        ));
        // Relock only needs the namespace.
        assert!(!manager.relock(alex.id, &key("notes:zzz")).await.unwrap());
    }

    #[tokio::test]
    async fn hooks_fire_only_on_transitions() {
        let (outbox, mut rx) = NoticeOutbox::channel();
        let manager =
            CollectableManager::new(registry(), Arc::new(MemoryStorage::new())).with_outbox(outbox);
        let alex = player();

        manager.unlock(&alex, &key("notes:a")).await.unwrap();
        manager.unlock(&alex, &key("notes:a")).await.unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            Notice::PlayerMessage {
                player: alex.id,
                text: "found a".into()
            }
        );
        assert!(rx.try_recv().is_err(), "denied unlock must not notify");
    }

    #[tokio::test]
    async fn visible_entries_hide_locked_secrets() {
        let manager = CollectableManager::new(registry(), Arc::new(MemoryStorage::new()));
        let alex = player();

        let ids = |entries: Vec<EntryStatus>| {
            entries
                .into_iter()
                .map(|s| s.entry.key().id().to_string())
                .collect::<Vec<_>>()
        };
        let visible = manager.visible_entries(alex.id, "notes").await.unwrap();
        assert_eq!(ids(visible), vec!["a", "b"]);

        manager.unlock(&alex, &key("notes:secret")).await.unwrap();
        let visible = manager.visible_entries(alex.id, "notes").await.unwrap();
        assert!(visible.iter().any(|s| s.unlocked && s.entry.key().id() == "secret"));
        assert_eq!(ids(visible).len(), 3);

        let progress = manager.progress(alex.id, "notes").await.unwrap();
        assert_eq!(progress, RepoProgress { unlocked: 1, total: 3 });
        assert!(!progress.is_complete());
    }

    #[tokio::test]
    async fn failed_put_leaves_cache_locked_and_skips_hook() {
        let mut mock = MockCollectableStorage::new();
        empty_namespace_loads(&mut mock);
        mock.expect_put_unlock()
            .times(1)
            .returning(|_, _, _, _| Err(failing("put_unlock")));
        let (outbox, mut rx) = NoticeOutbox::channel();
        let manager = CollectableManager::new(registry(), Arc::new(mock)).with_outbox(outbox);
        let alex = player();

        let err = manager.unlock(&alex, &key("notes:a")).await.unwrap_err();
        assert!(err.is_storage());
        assert!(!manager.is_unlocked(alex.id, &key("notes:a")).await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn store_reporting_existing_unlock_is_treated_as_unlocked() {
        let mut mock = MockCollectableStorage::new();
        empty_namespace_loads(&mut mock);
        mock.expect_put_unlock()
            .times(1)
            .returning(|_, _, _, _| Ok(false));
        let manager = CollectableManager::new(registry(), Arc::new(mock));
        let alex = player();

        assert_eq!(
            manager.unlock(&alex, &key("notes:a")).await.unwrap(),
            UnlockOutcome::Denied
        );
        assert!(manager.is_unlocked(alex.id, &key("notes:a")).await.unwrap());
        assert_eq!(
            manager.first_unlocked_at(alex.id, &key("notes:a")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn failed_replay_keeps_previous_timestamp() {
        let mut mock = MockCollectableStorage::new();
        mock.expect_load_unlocked_ids()
            .returning(|_, _| Ok(["b".to_string()].into_iter().collect()));
        mock.expect_record_replay()
            .times(1)
            .returning(|_, _, _, _| Err(StorageError::Timeout { operation: "record_replay", millis: 50 }));
        let manager = CollectableManager::new(registry(), Arc::new(mock));
        let alex = player();

        let err = manager.unlock(&alex, &key("notes:b")).await.unwrap_err();
        assert!(matches!(err, CodexError::Storage(StorageError::Timeout { .. })));
        assert_eq!(
            manager.last_replayed_at(alex.id, &key("notes:b")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn failed_clears_and_relock_change_nothing() {
        let mut mock = MockCollectableStorage::new();
        mock.expect_load_unlocked_ids()
            .times(1)
            .returning(|_, _| Ok(["a".to_string(), "b".to_string()].into_iter().collect()));
        mock.expect_clear_all()
            .returning(|_| Err(failing("clear_all")));
        mock.expect_clear_namespace()
            .returning(|_, _| Err(failing("clear_namespace")));
        mock.expect_delete_unlock()
            .returning(|_, _, _| Err(failing("delete_unlock")));
        let manager = CollectableManager::new(registry(), Arc::new(mock));
        let id = Uuid::new_v4();

        assert_eq!(manager.unlocked_ids(id, "notes").await.unwrap().len(), 2);
        assert!(manager.clear_all(id).await.is_err());
        assert!(manager.clear_repo(id, "notes").await.is_err());
        assert!(manager.relock(id, &key("notes:a")).await.is_err());
        assert_eq!(manager.unlocked_ids(id, "notes").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_stored_ids_are_filtered() {
        let mut mock = MockCollectableStorage::new();
        mock.expect_load_unlocked_ids()
            .returning(|_, _| Ok(["a".to_string(), "removed".to_string()].into_iter().collect()));
        let manager = CollectableManager::new(registry(), Arc::new(mock));

        let ids = manager.unlocked_ids(Uuid::new_v4(), "notes").await.unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn eviction_reloads_from_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = CollectableManager::new(registry(), storage.clone());
        let alex = player();

        manager.unlock(&alex, &key("notes:a")).await.unwrap();
        assert!(manager.evict(alex.id));
        assert!(!manager.evict(alex.id));
        assert_eq!(manager.cached_players(), 0);

        assert!(manager.is_unlocked(alex.id, &key("notes:a")).await.unwrap());
        // The timestamp lived only in the evicted cache.
        assert_eq!(
            manager.first_unlocked_at(alex.id, &key("notes:a")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn snapshots_round_trip_through_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = CollectableManager::new(registry(), storage.clone()).with_clock(clock);
        let alex = player();
        manager.unlock(&alex, &key("notes:a")).await.unwrap();

        let snapshot = manager.export_snapshot(alex.id).await.unwrap();
        let other = Uuid::new_v4();
        manager.import_snapshot(other, snapshot).await.unwrap();

        assert!(manager.is_unlocked(other, &key("notes:a")).await.unwrap());
        assert_eq!(
            manager.first_unlocked_at(other, &key("notes:a")).await.unwrap(),
            Some(t0())
        );
        assert_eq!(storage.stored(other).unwrap().player, other);
    }

    #[tokio::test]
    async fn unsupported_snapshots_surface_as_storage_errors() {
        let mut mock = MockCollectableStorage::new();
        mock.expect_load_snapshot()
            .returning(|_| Err(StorageError::Unsupported("load_snapshot")));
        let manager = CollectableManager::new(registry(), Arc::new(mock));
        let err = manager.export_snapshot(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CodexError::Storage(StorageError::Unsupported(_))));
    }
}
