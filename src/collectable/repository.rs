//! Namespaced repositories of collectables.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::collectable::errors::CodexError;
use crate::collectable::key::{validate_namespace, NamespacedKey};
use crate::collectable::types::{Collectable, CollectableMeta, ItemConfig};

/// A collectable as registered in a repository: the entry plus where it lives.
#[derive(Clone)]
pub struct CollectableEntry {
    meta: CollectableMeta,
    key: NamespacedKey,
    type_id: Option<String>,
    collectable: Arc<dyn Collectable>,
}

impl CollectableEntry {
    pub fn meta(&self) -> &CollectableMeta {
        &self.meta
    }

    pub fn key(&self) -> &NamespacedKey {
        &self.key
    }

    /// Type id the entry was decoded with; `None` for programmatic entries.
    pub fn type_id(&self) -> Option<&str> {
        self.type_id.as_deref()
    }

    pub fn collectable(&self) -> &Arc<dyn Collectable> {
        &self.collectable
    }

    pub fn display_name(&self) -> &str {
        self.collectable.display_name()
    }

    pub fn plain_display_name(&self) -> &str {
        self.collectable
            .plain_display_name()
            .unwrap_or_else(|| self.collectable.display_name())
    }

    pub fn allow_replay(&self) -> bool {
        self.collectable.allow_replay()
    }

    pub fn show_when_locked(&self) -> bool {
        self.collectable.show_when_locked()
    }

    pub fn icon(&self) -> Option<&ItemConfig> {
        self.collectable.icon()
    }

    pub fn locked_icon(&self) -> Option<&ItemConfig> {
        self.collectable.locked_icon().or_else(|| self.icon())
    }
}

impl std::fmt::Debug for CollectableEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectableEntry")
            .field("key", &self.key.to_string())
            .field("type_id", &self.type_id)
            .field("display_name", &self.display_name())
            .finish()
    }
}

/// Fixed set of collectables under one namespace. Entries cannot change after
/// the repository is built.
#[derive(Debug)]
pub struct Repository {
    namespace: String,
    display_name: String,
    plain_display_name: Option<String>,
    icon: ItemConfig,
    selected_icon: Option<ItemConfig>,
    entries: BTreeMap<String, CollectableEntry>,
}

impl Repository {
    pub fn builder(namespace: &str) -> RepositoryBuilder {
        RepositoryBuilder::new(namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn plain_display_name(&self) -> &str {
        self.plain_display_name
            .as_deref()
            .unwrap_or(&self.display_name)
    }

    pub fn icon(&self) -> &ItemConfig {
        &self.icon
    }

    /// Icon for the selected state; the normal icon unless configured.
    pub fn selected_icon(&self) -> &ItemConfig {
        self.selected_icon.as_ref().unwrap_or(&self.icon)
    }

    pub fn entries(&self) -> &BTreeMap<String, CollectableEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CollectableEntry> {
        self.entries.get(id)
    }

    /// Look up by full key; `None` when the key belongs to another namespace.
    pub fn get_key(&self, key: &NamespacedKey) -> Option<&CollectableEntry> {
        if key.namespace() != self.namespace {
            return None;
        }
        self.entries.get(key.id())
    }
}

pub struct RepositoryBuilder {
    namespace: String,
    display_name: Option<String>,
    plain_display_name: Option<String>,
    icon: ItemConfig,
    selected_icon: Option<ItemConfig>,
    entries: Vec<(String, Option<String>, Arc<dyn Collectable>)>,
}

impl RepositoryBuilder {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            display_name: None,
            plain_display_name: None,
            icon: ItemConfig::default(),
            selected_icon: None,
            entries: Vec::new(),
        }
    }

    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn plain_display_name(mut self, name: Option<&str>) -> Self {
        self.plain_display_name = name.map(str::to_string);
        self
    }

    pub fn icon(mut self, icon: ItemConfig) -> Self {
        self.icon = icon;
        self
    }

    pub fn selected_icon(mut self, icon: Option<ItemConfig>) -> Self {
        self.selected_icon = icon;
        self
    }

    pub fn entry(mut self, id: &str, collectable: impl Collectable) -> Self {
        self.entries
            .push((id.to_string(), None, Arc::new(collectable)));
        self
    }

    /// Add an entry produced by a registered type.
    pub fn typed_entry(mut self, id: &str, type_id: &str, collectable: Arc<dyn Collectable>) -> Self {
        self.entries
            .push((id.to_string(), Some(type_id.to_string()), collectable));
        self
    }

    /// Validate the namespace and every entry id, then freeze the repository.
    pub fn build(self) -> Result<Repository, CodexError> {
        validate_namespace(&self.namespace)?;
        let mut entries = BTreeMap::new();
        for (id, type_id, collectable) in self.entries {
            let key = NamespacedKey::new(&self.namespace, &id)?;
            let entry = CollectableEntry {
                meta: CollectableMeta {
                    namespace: self.namespace.clone(),
                    entry_id: id.clone(),
                },
                key,
                type_id,
                collectable,
            };
            if entries.insert(id.clone(), entry).is_some() {
                return Err(CodexError::InvalidKey {
                    key: format!("{}:{}", self.namespace, id),
                    reason: "duplicate entry id",
                });
            }
        }
        Ok(Repository {
            display_name: self.display_name.unwrap_or_else(|| self.namespace.clone()),
            namespace: self.namespace,
            plain_display_name: self.plain_display_name,
            icon: self.icon,
            selected_icon: self.selected_icon,
            entries,
        })
    }
}
