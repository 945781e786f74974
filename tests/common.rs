//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use codex::collectable::{Codex, ManualClock, MemoryStorage, NamespacedKey, PlayerRef};
use codex::config::Config;
use uuid::Uuid;

/// Two repositories: `notes` (a, b replayable, hidden) and `fish` (cod).
pub const FIXTURE_TOML: &str = r#"
[codex]
default_type = "basic"

[[repositories]]
namespace = "notes"
display_name = "<gold>Notes"
plain_display_name = "Notes"

[repositories.entries.a]
display_name = "Note A"
player_message_on_discover = "You found note A"

[repositories.entries.b]
display_name = "Note B"
allow_replay = true
global_message_on_discover = "Someone found note B"
player_message_on_replay = "Note B again"

[repositories.entries.hidden]
display_name = "Hidden note"
show_when_locked = false

[[repositories]]
namespace = "fish"
display_name = "Fish"

[repositories.entries.cod]
display_name = "Cod"
"#;

pub fn fixture_config() -> Config {
    toml::from_str(FIXTURE_TOML).expect("fixture config parses")
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()
}

pub struct Harness {
    pub codex: Codex,
    pub storage: Arc<MemoryStorage>,
    pub clock: Arc<ManualClock>,
}

/// Codex over the fixture config with an inspectable in-memory store and a
/// manual clock starting at [`t0`].
pub fn harness() -> Harness {
    harness_with(MemoryStorage::new())
}

pub fn harness_with(storage: MemoryStorage) -> Harness {
    let storage = Arc::new(storage);
    let clock = Arc::new(ManualClock::new(t0()));
    let codex = Codex::builder(fixture_config())
        .storage(Arc::clone(&storage))
        .clock(clock.clone())
        .build()
        .expect("fixture codex builds");
    Harness {
        codex,
        storage,
        clock,
    }
}

pub fn player(name: &str) -> PlayerRef {
    PlayerRef::new(Uuid::new_v4(), name)
}

pub fn key(text: &str) -> NamespacedKey {
    text.parse().expect("valid key")
}
