//! # Collectables
//!
//! Namespaced repositories of collectable entries and per-player unlock
//! progress.
//!
//! - [`key`]: `namespace:id` keys
//! - [`types`] and [`codec`]: the [`Collectable`] contract, the built-in
//!   `basic` type, and the type registry that decodes raw entries
//! - [`repository`] and [`registry`]: the catalog
//! - [`progress`], [`storage`] and [`cache`]: per-player state and where it lives
//! - [`manager`]: the unlock state machine
//! - [`api`]: the assembled [`Codex`] handle
//!
//! ```rust,no_run
//! use codex::collectable::{Codex, MemoryStorage, NamespacedKey, PlayerRef};
//! use codex::config::Config;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("codex.toml").await?;
//!     let mut builder = Codex::builder(config).storage(MemoryStorage::new());
//!     let ready = builder.subscribe();
//!     builder.build()?;
//!
//!     let codex = ready.await?;
//!     let player = PlayerRef::new(Uuid::new_v4(), "Alex");
//!     let key: NamespacedKey = "notes:first".parse()?;
//!     let outcome = codex.collectables().unlock(&player, &key).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod errors;
pub mod key;
pub mod manager;
pub mod notice;
pub mod progress;
pub mod registry;
pub mod repository;
pub mod storage;
pub mod types;

pub use api::{Codex, CodexBuilder, API_VERSION};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{CollectableType, SerdeCodec, TypeCodec, TypeRegistry, BASIC_TYPE_ID};
pub use errors::{CodexError, StorageError};
pub use key::NamespacedKey;
pub use manager::{CollectableManager, EntryStatus, RepoProgress, UnlockOutcome};
pub use notice::{DiscoveryContext, Notice, NoticeOutbox, PlayerRef};
pub use progress::{EntryProgress, PlayerProgress};
pub use registry::{LoadReport, RepositoryRegistry};
pub use repository::{CollectableEntry, Repository, RepositoryBuilder};
pub use storage::{CollectableStorage, MemoryStorage, TimeoutStorage};
pub use types::{BasicCollectable, Collectable, CollectableMeta, Discoverable, ItemConfig};
