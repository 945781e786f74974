//! End-to-end unlock, replay, relock and clear behaviour through the `Codex` handle.
mod common;

use chrono::Duration;
use codex::collectable::{CodexError, CollectableStorage, Notice, NoticeOutbox, UnlockOutcome};
use common::{harness, key, player, t0};
use tokio_test::assert_ok;

#[tokio::test]
async fn test_double_unlock_without_replay_is_denied() {
    let h = harness();
    let manager = h.codex.collectables();
    let alex = player("alex");

    let first = assert_ok!(manager.unlock(&alex, &key("notes:a")).await);
    let second = assert_ok!(manager.unlock(&alex, &key("notes:a")).await);

    assert_eq!(first, UnlockOutcome::NewlyUnlocked);
    assert_eq!(second, UnlockOutcome::Denied);
    assert!(!second.unlocked());
    assert_eq!(h.storage.unlock_writes(), 1);
    assert_eq!(h.storage.replay_writes(), 0);
}

#[tokio::test]
async fn test_double_unlock_with_replay_replays() {
    let h = harness();
    let manager = h.codex.collectables();
    let alex = player("alex");

    assert_eq!(
        manager.unlock(&alex, &key("notes:b")).await.unwrap(),
        UnlockOutcome::NewlyUnlocked
    );
    h.clock.advance(Duration::seconds(30));
    assert_eq!(
        manager.unlock(&alex, &key("notes:b")).await.unwrap(),
        UnlockOutcome::Replayed
    );

    assert_eq!(h.storage.unlock_writes(), 1);
    assert_eq!(h.storage.replay_writes(), 1);
    assert_eq!(
        manager.first_unlocked_at(alex.id, &key("notes:b")).await.unwrap(),
        Some(t0()),
        "replay must not move the first unlock time"
    );
    assert_eq!(
        manager.last_replayed_at(alex.id, &key("notes:b")).await.unwrap(),
        Some(t0() + Duration::seconds(30))
    );
}

#[tokio::test]
async fn test_relock_then_unlock_is_a_fresh_discovery() {
    let h = harness();
    let manager = h.codex.collectables();
    let alex = player("alex");

    manager.unlock(&alex, &key("notes:a")).await.unwrap();
    assert!(manager.relock(alex.id, &key("notes:a")).await.unwrap());
    assert!(!manager.is_unlocked(alex.id, &key("notes:a")).await.unwrap());
    assert!(!manager.relock(alex.id, &key("notes:a")).await.unwrap());

    h.clock.advance(Duration::days(2));
    assert_eq!(
        manager.unlock(&alex, &key("notes:a")).await.unwrap(),
        UnlockOutcome::NewlyUnlocked
    );
    assert_eq!(
        manager.first_unlocked_at(alex.id, &key("notes:a")).await.unwrap(),
        Some(t0() + Duration::days(2))
    );
    assert_eq!(h.storage.unlock_writes(), 2);
}

#[tokio::test]
async fn test_clear_repo_counts_and_leaves_other_namespaces() {
    let h = harness();
    let manager = h.codex.collectables();
    let alex = player("alex");

    for k in ["notes:a", "notes:b", "fish:cod"] {
        manager.unlock(&alex, &key(k)).await.unwrap();
    }

    assert_eq!(manager.clear_repo(alex.id, "notes").await.unwrap(), 2);
    assert!(manager.unlocked_ids(alex.id, "notes").await.unwrap().is_empty());
    assert!(manager.is_unlocked(alex.id, &key("fish:cod")).await.unwrap());
    assert_eq!(
        manager.first_unlocked_at(alex.id, &key("notes:a")).await.unwrap(),
        None
    );
    assert_eq!(manager.clear_repo(alex.id, "notes").await.unwrap(), 0);
}

#[tokio::test]
async fn test_clear_repo_counts_stored_ids_no_longer_registered() {
    let h = harness();
    let manager = h.codex.collectables();
    let alex = player("alex");

    manager.unlock(&alex, &key("notes:a")).await.unwrap();
    // Left behind by an entry since removed from configuration.
    assert!(h
        .storage
        .put_unlock(alex.id, "notes", "removed", t0())
        .await
        .unwrap());
    manager.evict(alex.id);

    let listed = manager.unlocked_ids(alex.id, "notes").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(manager.clear_repo(alex.id, "notes").await.unwrap(), 2);
    assert!(manager.unlocked_ids(alex.id, "notes").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_all_empties_every_namespace() {
    let h = harness();
    let manager = h.codex.collectables();
    let alex = player("alex");
    let sam = player("sam");

    manager.unlock(&alex, &key("notes:a")).await.unwrap();
    manager.unlock(&alex, &key("fish:cod")).await.unwrap();
    manager.unlock(&sam, &key("fish:cod")).await.unwrap();

    assert_ok!(manager.clear_all(alex.id).await);
    for namespace in ["notes", "fish"] {
        assert!(manager.unlocked_ids(alex.id, namespace).await.unwrap().is_empty());
    }
    assert!(manager.is_unlocked(sam.id, &key("fish:cod")).await.unwrap());

    // Cleared state is also what storage reports after eviction.
    manager.evict(alex.id);
    assert!(!manager.is_unlocked(alex.id, &key("fish:cod")).await.unwrap());
}

#[tokio::test]
async fn test_unknown_keys_surface_domain_errors() {
    let h = harness();
    let manager = h.codex.collectables();
    let alex = player("alex");

    let err = manager.unlock(&alex, &key("notes:missing")).await.unwrap_err();
    assert!(matches!(err, CodexError::UnknownCollectable(_)));
    assert!(!err.is_storage());

    let err = manager.progress(alex.id, "birds").await.unwrap_err();
    assert!(matches!(err, CodexError::UnknownNamespace(ns) if ns == "birds"));
    assert_eq!(h.storage.unlock_writes(), 0);
}

#[tokio::test]
async fn test_progress_and_visibility() {
    let h = harness();
    let manager = h.codex.collectables();
    let alex = player("alex");

    let visible = manager.visible_entries(alex.id, "notes").await.unwrap();
    assert_eq!(visible.len(), 2, "hidden entry is not listed while locked");

    manager.unlock(&alex, &key("notes:hidden")).await.unwrap();
    manager.unlock(&alex, &key("notes:a")).await.unwrap();
    let visible = manager.visible_entries(alex.id, "notes").await.unwrap();
    assert_eq!(visible.len(), 3);
    assert_eq!(visible.iter().filter(|s| s.unlocked).count(), 2);

    let progress = manager.progress(alex.id, "notes").await.unwrap();
    assert_eq!((progress.unlocked, progress.total), (2, 3));
    assert!((progress.percent() - 66.67).abs() < 0.01);
    manager.unlock(&alex, &key("notes:b")).await.unwrap();
    let progress = manager.progress(alex.id, "notes").await.unwrap();
    assert!(progress.is_complete());
    assert_eq!(progress.percent(), 100.0);
}

#[tokio::test]
async fn test_hooks_emit_notices_for_discover_and_replay() {
    let (outbox, mut rx) = NoticeOutbox::channel();
    let codex = codex::collectable::Codex::builder(common::fixture_config())
        .outbox(outbox)
        .build()
        .unwrap();
    let manager = codex.collectables();
    let alex = player("alex");

    manager.unlock(&alex, &key("notes:b")).await.unwrap();
    manager.unlock(&alex, &key("notes:b")).await.unwrap();

    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    assert_eq!(
        notices,
        vec![
            Notice::Broadcast {
                text: "Someone found note B".into()
            },
            // Replay broadcast falls back to the discover message.
            Notice::Broadcast {
                text: "Someone found note B".into()
            },
            Notice::PlayerMessage {
                player: alex.id,
                text: "Note B again".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_snapshot_export_and_import() {
    let h = harness();
    let manager = h.codex.collectables();
    let alex = player("alex");
    let clone = player("clone");

    manager.unlock(&alex, &key("notes:a")).await.unwrap();
    manager.unlock(&alex, &key("fish:cod")).await.unwrap();

    let snapshot = manager.export_snapshot(alex.id).await.unwrap();
    let bytes = snapshot.to_bytes().unwrap();
    let restored = codex::collectable::PlayerProgress::from_bytes(&bytes).unwrap();

    manager.import_snapshot(clone.id, restored).await.unwrap();
    assert!(manager.is_unlocked(clone.id, &key("fish:cod")).await.unwrap());
    assert_eq!(
        manager.first_unlocked_at(clone.id, &key("notes:a")).await.unwrap(),
        Some(t0())
    );
    assert_eq!(
        manager.unlock(&clone, &key("notes:a")).await.unwrap(),
        UnlockOutcome::Denied
    );
}
