//! The catalog of registered repositories.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info, warn};
use serde_json::Value;

use crate::collectable::codec::{TypeRegistry, BASIC_TYPE_ID};
use crate::collectable::errors::CodexError;
use crate::collectable::key::{validate_namespace, NamespacedKey};
use crate::collectable::repository::{CollectableEntry, Repository};
use crate::config::RepositoryConfig;

/// Outcome of loading a batch of repository configurations.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// Namespaces whose configuration was disabled.
    pub skipped: Vec<String>,
    pub failed: Vec<(String, CodexError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Read-mostly map of namespace to [`Repository`]. Lookups take a read lock,
/// registration is serialized by the write lock.
#[derive(Debug)]
pub struct RepositoryRegistry {
    repositories: RwLock<BTreeMap<String, Arc<Repository>>>,
    types: Arc<TypeRegistry>,
    default_type: String,
}

impl RepositoryRegistry {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self::with_default_type(types, BASIC_TYPE_ID)
    }

    /// `default_type` is used for raw entries without a `type` field.
    pub fn with_default_type(types: Arc<TypeRegistry>, default_type: &str) -> Self {
        Self {
            repositories: RwLock::new(BTreeMap::new()),
            types,
            default_type: default_type.to_ascii_lowercase(),
        }
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn register(&self, repository: Repository) -> Result<Arc<Repository>, CodexError> {
        let mut repositories = self
            .repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let namespace = repository.namespace().to_string();
        if repositories.contains_key(&namespace) {
            return Err(CodexError::DuplicateNamespace(namespace));
        }
        info!(
            "registered repository '{}' with {} entries",
            namespace,
            repository.len()
        );
        let repository = Arc::new(repository);
        repositories.insert(namespace, Arc::clone(&repository));
        Ok(repository)
    }

    /// Build a repository from configuration and register it. Disabled
    /// configurations are skipped and yield `None`.
    pub fn load_from_config(
        &self,
        config: &RepositoryConfig,
    ) -> Result<Option<Arc<Repository>>, CodexError> {
        if !config.enabled {
            info!("repository '{}' is disabled; skipping", config.namespace);
            return Ok(None);
        }
        validate_namespace(&config.namespace)?;
        if self.get(&config.namespace).is_some() {
            return Err(CodexError::DuplicateNamespace(config.namespace.clone()));
        }

        let mut builder = Repository::builder(&config.namespace)
            .display_name(&config.display_name)
            .plain_display_name(config.plain_display_name.as_deref())
            .icon(config.icon.clone())
            .selected_icon(config.selected_icon.clone());

        for (id, raw) in &config.entries {
            let entry_name = format!("{}:{}", config.namespace, id);
            let type_id = raw
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| self.default_type.clone());
            let Some(collectable_type) = self.types.lookup(&type_id) else {
                return Err(CodexError::UnknownType {
                    type_id,
                    entry: entry_name,
                });
            };
            let collectable = collectable_type
                .decode(raw)
                .map_err(|err| CodexError::CodecDecode {
                    type_id: type_id.clone(),
                    entry: entry_name.clone(),
                    message: err.to_string(),
                })?;
            debug!("decoded {} as '{}'", entry_name, type_id);
            builder = builder.typed_entry(id, &type_id, collectable);
        }

        self.register(builder.build()?).map(Some)
    }

    /// Load every configuration, continuing past failures. Each failure is
    /// logged and reported; it only affects its own repository.
    pub fn load_all<'a, I>(&self, configs: I) -> LoadReport
    where
        I: IntoIterator<Item = &'a RepositoryConfig>,
    {
        let mut report = LoadReport::default();
        for config in configs {
            match self.load_from_config(config) {
                Ok(Some(repo)) => report.loaded.push(repo.namespace().to_string()),
                Ok(None) => report.skipped.push(config.namespace.clone()),
                Err(err) => {
                    warn!("failed to load repository '{}': {}", config.namespace, err);
                    report.failed.push((config.namespace.clone(), err));
                }
            }
        }
        report
    }

    pub fn get(&self, namespace: &str) -> Option<Arc<Repository>> {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .cloned()
    }

    pub fn resolve(&self, key: &NamespacedKey) -> Option<CollectableEntry> {
        self.get(key.namespace())?.get(key.id()).cloned()
    }

    /// All repositories in namespace order.
    pub fn repositories(&self) -> Vec<Arc<Repository>> {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Encode a registered repository back into configuration form. Entries
    /// registered programmatically have no type id and are left out.
    pub fn export_config(&self, namespace: &str) -> Result<RepositoryConfig, CodexError> {
        let repo = self
            .get(namespace)
            .ok_or_else(|| CodexError::UnknownNamespace(namespace.to_string()))?;
        let mut entries = BTreeMap::new();
        for (id, entry) in repo.entries() {
            let Some(type_id) = entry.type_id() else {
                debug!("skipping untyped entry {} during export", entry.key());
                continue;
            };
            let collectable_type =
                self.types
                    .lookup(type_id)
                    .ok_or_else(|| CodexError::UnknownType {
                        type_id: type_id.to_string(),
                        entry: entry.key().to_string(),
                    })?;
            let raw = collectable_type
                .encode(entry.collectable().as_ref())
                .map_err(|err| CodexError::CodecDecode {
                    type_id: type_id.to_string(),
                    entry: entry.key().to_string(),
                    message: err.to_string(),
                })?;
            entries.insert(id.clone(), raw);
        }
        Ok(RepositoryConfig {
            enabled: true,
            namespace: repo.namespace().to_string(),
            display_name: repo.display_name().to_string(),
            plain_display_name: Some(repo.plain_display_name().to_string())
                .filter(|plain| plain != repo.display_name()),
            icon: repo.icon().clone(),
            selected_icon: Some(repo.selected_icon().clone())
                .filter(|selected| selected != repo.icon()),
            entries,
        })
    }
}
