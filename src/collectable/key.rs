//! `namespace:id` identifiers for collectables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::collectable::errors::CodexError;

/// Fully qualified collectable identifier, e.g. `notes:first_page`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespacedKey {
    namespace: String,
    id: String,
}

fn valid_namespace_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '.' | '_' | '-')
}

fn valid_id_char(c: char) -> bool {
    valid_namespace_char(c) || c == '/'
}

/// Check that a repository namespace is non-empty and uses `[a-z0-9._-]`.
pub fn validate_namespace(namespace: &str) -> Result<(), CodexError> {
    if namespace.is_empty() {
        return Err(CodexError::InvalidKey {
            key: namespace.to_string(),
            reason: "empty namespace",
        });
    }
    if !namespace.chars().all(valid_namespace_char) {
        return Err(CodexError::InvalidKey {
            key: namespace.to_string(),
            reason: "namespace must match [a-z0-9._-]",
        });
    }
    Ok(())
}

fn validate_id(key: &str, id: &str) -> Result<(), CodexError> {
    if id.is_empty() {
        return Err(CodexError::InvalidKey {
            key: key.to_string(),
            reason: "empty entry id",
        });
    }
    if !id.chars().all(valid_id_char) {
        return Err(CodexError::InvalidKey {
            key: key.to_string(),
            reason: "entry id must match [a-z0-9/._-]",
        });
    }
    Ok(())
}

impl NamespacedKey {
    pub fn new(namespace: &str, id: &str) -> Result<Self, CodexError> {
        validate_namespace(namespace)?;
        validate_id(&format!("{}:{}", namespace, id), id)?;
        Ok(Self {
            namespace: namespace.to_string(),
            id: id.to_string(),
        })
    }

    /// Parse the textual `namespace:id` form.
    pub fn parse(text: &str) -> Result<Self, CodexError> {
        let Some((namespace, id)) = text.split_once(':') else {
            return Err(CodexError::InvalidKey {
                key: text.to_string(),
                reason: "missing ':' separator",
            });
        };
        validate_namespace(namespace).map_err(|_| CodexError::InvalidKey {
            key: text.to_string(),
            reason: "namespace must be non-empty and match [a-z0-9._-]",
        })?;
        validate_id(text, id)?;
        Ok(Self {
            namespace: namespace.to_string(),
            id: id.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for NamespacedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

impl FromStr for NamespacedKey {
    type Err = CodexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for NamespacedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NamespacedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        NamespacedKey::parse(&text).map_err(serde::de::Error::custom)
    }
}
