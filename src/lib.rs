//! # Codex - collectable unlock and progress tracking
//!
//! Codex keeps namespaced repositories of collectable entries and tracks, per
//! player, which entries are unlocked, when they were first unlocked, and when
//! they were last replayed.
//!
//! ## Features
//!
//! - **Repositories from configuration**: entries are raw TOML tables decoded by
//!   a registered collectable type (`basic` out of the box).
//! - **Exactly-once discovery**: concurrent unlocks of the same entry for the
//!   same player yield a single `NewlyUnlocked`.
//! - **Replay**: entries may allow unlocking again, which runs a replay hook
//!   instead of the discover hook.
//! - **Pluggable storage**: an async adapter trait, an in-memory adapter, and a
//!   timeout wrapper.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use codex::collectable::{Codex, NamespacedKey, PlayerRef, UnlockOutcome};
//! use codex::config::Config;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let codex = Codex::builder(Config::sample()).build()?;
//!     let player = PlayerRef::new(Uuid::new_v4(), "Alex");
//!     let key: NamespacedKey = "notes:first".parse()?;
//!
//!     let first = codex.collectables().unlock(&player, &key).await?;
//!     assert_eq!(first, UnlockOutcome::NewlyUnlocked);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`collectable`] - keys, types, repositories, storage and the unlock manager
//! - [`config`] - TOML configuration

pub mod collectable;
pub mod config;
