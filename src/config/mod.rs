//! # Configuration
//!
//! Codex reads a single TOML file. Repositories can be declared inline as
//! `[[repositories]]` tables or as one file each in `codex.repositories_dir`.
//!
//! ```toml
//! [codex]
//! default_type = "basic"
//! repositories_dir = "repositories"
//!
//! [storage]
//! timeout_ms = 2000
//!
//! [logging]
//! level = "info"
//! file = "codex.log"
//!
//! [[repositories]]
//! namespace = "notes"
//! display_name = "Notes"
//!
//! [repositories.icon]
//! material = "PAPER"
//!
//! [repositories.entries.first]
//! display_name = "The first note"
//! player_message_on_discover = "You found a note!"
//! ```
//!
//! Entry tables are kept as raw values and decoded by the collectable type
//! named in their `type` field (`codex.default_type` when absent).
//!
//! ```rust,no_run
//! use codex::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("codex.toml").await?;
//!     let repositories = config.all_repositories().await?;
//!     println!("{} repositories configured", repositories.len());
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::fs;

use crate::collectable::codec::BASIC_TYPE_ID;
use crate::collectable::types::ItemConfig;

fn default_true() -> bool {
    true
}

fn default_type_id() -> String {
    BASIC_TYPE_ID.to_string()
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub codex: CodexConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodexConfig {
    /// Type id for entries without a `type` field.
    #[serde(default = "default_type_id")]
    pub default_type: String,
    /// Directory of `*.toml` files, one repository each.
    #[serde(default)]
    pub repositories_dir: Option<String>,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            default_type: default_type_id(),
            repositories_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Per-call deadline for the storage adapter. Unset or 0 disables it.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl StorageConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

/// What a scan of `codex.repositories_dir` produced.
#[derive(Debug, Default)]
pub struct RepositoryFiles {
    pub repositories: Vec<RepositoryConfig>,
    /// Files that could not be read or parsed. Each failure costs only its
    /// own repository.
    pub failed: Vec<(PathBuf, anyhow::Error)>,
}

/// One repository as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub namespace: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_display_name: Option<String>,
    #[serde(default)]
    pub icon: ItemConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_icon: Option<ItemConfig>,
    /// Entry id to raw definition.
    #[serde(default)]
    pub entries: BTreeMap<String, Value>,
}

impl RepositoryConfig {
    /// Parse a standalone repository file.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize repository {}: {}", self.namespace, e))
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Write a default configuration with one sample repository
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::sample();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Defaults plus a small `notes` repository showing the entry format.
    pub fn sample() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "first".to_string(),
            json!({
                "display_name": "The first note",
                "player_message_on_discover": "You found the first note!",
            }),
        );
        entries.insert(
            "second".to_string(),
            json!({
                "display_name": "The second note",
                "allow_replay": true,
                "global_message_on_discover": "Someone found the second note.",
                "player_message_on_replay": "You read the second note again.",
            }),
        );
        entries.insert(
            "hidden".to_string(),
            json!({
                "display_name": "A hidden note",
                "show_when_locked": false,
                "commands_on_discover": {
                    "commands": [{ "command": "/give {player} paper 1", "run_as": "console" }],
                },
            }),
        );

        Config {
            repositories: vec![RepositoryConfig {
                enabled: true,
                namespace: "notes".to_string(),
                display_name: "Notes".to_string(),
                plain_display_name: None,
                icon: ItemConfig {
                    material: "PAPER".to_string(),
                    ..ItemConfig::default()
                },
                selected_icon: None,
                entries,
            }],
            ..Config::default()
        }
    }

    /// Read every `*.toml` file in `codex.repositories_dir`, sorted by file
    /// name. A file that fails to load is logged and listed in
    /// [`RepositoryFiles::failed`]; the rest still load. Only an unreadable
    /// directory is an error.
    pub async fn load_repositories_dir(&self) -> Result<RepositoryFiles> {
        let mut files = RepositoryFiles::default();
        let Some(dir) = &self.codex.repositories_dir else {
            return Ok(files);
        };
        let mut reader = fs::read_dir(dir)
            .await
            .map_err(|e| anyhow!("Failed to read repositories dir {}: {}", dir, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            match load_repository_file(&path).await {
                Ok(repository) => {
                    debug!(
                        "Loaded repository {} from {}",
                        repository.namespace,
                        path.display()
                    );
                    files.repositories.push(repository);
                }
                Err(e) => {
                    warn!("Skipping repository file {}: {}", path.display(), e);
                    files.failed.push((path, e));
                }
            }
        }
        Ok(files)
    }

    /// Inline repositories followed by those from `repositories_dir`. Files
    /// that fail to load are skipped.
    pub async fn all_repositories(&self) -> Result<Vec<RepositoryConfig>> {
        let mut repositories = self.repositories.clone();
        repositories.extend(self.load_repositories_dir().await?.repositories);
        Ok(repositories)
    }
}

async fn load_repository_file(path: &Path) -> Result<RepositoryConfig> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read repository file {}: {}", path.display(), e))?;
    RepositoryConfig::from_toml(&content)
        .map_err(|e| anyhow!("Failed to parse repository file {}: {}", path.display(), e))
}
