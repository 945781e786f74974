//! The assembled service handle and its builder.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::oneshot;

use crate::collectable::clock::{Clock, SystemClock};
use crate::collectable::codec::{CollectableType, TypeRegistry};
use crate::collectable::errors::CodexError;
use crate::collectable::manager::CollectableManager;
use crate::collectable::notice::NoticeOutbox;
use crate::collectable::registry::{LoadReport, RepositoryRegistry};
use crate::collectable::repository::Repository;
use crate::collectable::storage::{CollectableStorage, MemoryStorage, TimeoutStorage};
use crate::config::{Config, RepositoryConfig};

/// Bumped whenever the public surface of [`Codex`] changes incompatibly.
pub const API_VERSION: u32 = 1;

/// Cheap to clone; every clone shares the same registries, cache and storage.
#[derive(Clone)]
pub struct Codex {
    types: Arc<TypeRegistry>,
    registry: Arc<RepositoryRegistry>,
    collectables: Arc<CollectableManager>,
    load_report: Arc<LoadReport>,
}

impl Codex {
    pub fn builder(config: Config) -> CodexBuilder {
        CodexBuilder::new(config)
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn registry(&self) -> &Arc<RepositoryRegistry> {
        &self.registry
    }

    pub fn collectables(&self) -> &Arc<CollectableManager> {
        &self.collectables
    }

    /// What happened to the configured repositories during build.
    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn api_version(&self) -> u32 {
        API_VERSION
    }
}

pub struct CodexBuilder {
    config: Config,
    types: TypeRegistry,
    extra_configs: Vec<RepositoryConfig>,
    repositories: Vec<Repository>,
    storage: Option<Arc<dyn CollectableStorage>>,
    clock: Arc<dyn Clock>,
    outbox: NoticeOutbox,
    listeners: Vec<oneshot::Sender<Codex>>,
}

impl CodexBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            types: TypeRegistry::with_builtin(),
            extra_configs: Vec::new(),
            repositories: Vec::new(),
            storage: None,
            clock: Arc::new(SystemClock),
            outbox: NoticeOutbox::disabled(),
            listeners: Vec::new(),
        }
    }

    /// Register an additional collectable type before repositories load.
    pub fn register_type(self, collectable_type: CollectableType) -> Result<Self, CodexError> {
        self.types.register(collectable_type)?;
        Ok(self)
    }

    /// Repository configurations beyond those inline in the config, such as
    /// the contents of `repositories_dir`.
    pub fn repository_configs(mut self, configs: Vec<RepositoryConfig>) -> Self {
        self.extra_configs.extend(configs);
        self
    }

    /// A repository built in code. Registration failures fail the build.
    pub fn repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Storage adapter to use. Wrapped in a [`TimeoutStorage`] when
    /// `storage.timeout_ms` is set.
    pub fn storage<S: CollectableStorage + 'static>(mut self, storage: S) -> Self {
        self.storage = Some(self.wrap_storage(storage));
        self
    }

    fn wrap_storage<S: CollectableStorage + 'static>(&self, storage: S) -> Arc<dyn CollectableStorage> {
        match self.config.storage.timeout() {
            Some(timeout) => {
                debug!("storage calls time out after {:?}", timeout);
                Arc::new(TimeoutStorage::new(storage, timeout))
            }
            None => Arc::new(storage),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn outbox(mut self, outbox: NoticeOutbox) -> Self {
        self.outbox = outbox;
        self
    }

    /// Receive the [`Codex`] once [`build`](Self::build) succeeds. Fires at
    /// most once; dropped unfired if the build fails.
    pub fn subscribe(&mut self) -> oneshot::Receiver<Codex> {
        let (tx, rx) = oneshot::channel();
        self.listeners.push(tx);
        rx
    }

    pub fn build(self) -> Result<Codex, CodexError> {
        let default_type = self.config.codex.default_type.to_ascii_lowercase();
        if self.types.lookup(&default_type).is_none() {
            return Err(CodexError::UnknownType {
                type_id: default_type,
                entry: "codex.default_type".to_string(),
            });
        }

        let storage = match &self.storage {
            Some(storage) => Arc::clone(storage),
            None => {
                warn!("no storage adapter configured; progress is kept in memory only");
                self.wrap_storage(MemoryStorage::new())
            }
        };

        let types = Arc::new(self.types);
        let registry = Arc::new(RepositoryRegistry::with_default_type(
            Arc::clone(&types),
            &default_type,
        ));
        for repository in self.repositories {
            registry.register(repository)?;
        }
        let configs = self.config.repositories.iter().chain(&self.extra_configs);
        let load_report = registry.load_all(configs);

        let collectables = CollectableManager::new(Arc::clone(&registry), storage)
            .with_clock(self.clock)
            .with_outbox(self.outbox);

        let codex = Codex {
            types,
            registry,
            collectables: Arc::new(collectables),
            load_report: Arc::new(load_report),
        };
        info!(
            "codex ready: {} repositories, {} types, {} failed",
            codex.registry.namespaces().len(),
            codex.types.ids().len(),
            codex.load_report.failed.len()
        );

        for listener in self.listeners {
            if listener.send(codex.clone()).is_err() {
                debug!("readiness listener dropped before build finished");
            }
        }
        Ok(codex)
    }
}
