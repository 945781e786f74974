use thiserror::Error;

/// Errors raised by a storage adapter. Kept apart from [`CodexError`] so callers can
/// tell a failed write from a domain rejection.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The adapter did not answer within its configured deadline.
    #[error("storage timed out during {operation} after {millis}ms")]
    Timeout { operation: &'static str, millis: u64 },

    /// Backend I/O or driver failure.
    #[error("storage error in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    /// Encoding or decoding of persisted progress failed.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// The adapter declines an optional operation (snapshots).
    #[error("storage adapter does not support {0}")]
    Unsupported(&'static str),
}

impl StorageError {
    pub fn backend(operation: &'static str, message: impl ToString) -> Self {
        Self::Backend {
            operation,
            message: message.to_string(),
        }
    }
}

/// Errors that can arise while loading repositories or running unlock operations.
#[derive(Debug, Error)]
pub enum CodexError {
    /// A repository with this namespace is already registered.
    #[error("duplicate namespace: {0}")]
    DuplicateNamespace(String),

    /// A collectable type with this id (case-insensitive) is already registered.
    #[error("duplicate collectable type: {0}")]
    DuplicateType(String),

    /// An entry declared a type id nobody registered.
    #[error("unknown collectable type '{type_id}' for entry {entry}")]
    UnknownType { type_id: String, entry: String },

    /// The type's codec rejected an entry's raw definition.
    #[error("failed to decode entry {entry} as '{type_id}': {message}")]
    CodecDecode {
        type_id: String,
        entry: String,
        message: String,
    },

    /// Malformed `namespace:id` key or namespace.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// The key does not resolve to a registered collectable.
    #[error("unknown collectable: {0}")]
    UnknownCollectable(String),

    /// No repository is registered under this namespace.
    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),

    /// Storage adapter failure, surfaced unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Returned when decoding a snapshot with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around serde_json errors (snapshot export, raw entry encoding).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodexError {
    /// True for failures that originate in the storage adapter.
    pub fn is_storage(&self) -> bool {
        matches!(self, CodexError::Storage(_))
    }

    /// True for configuration problems that only affect loading one repository.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CodexError::DuplicateNamespace(_)
                | CodexError::DuplicateType(_)
                | CodexError::UnknownType { .. }
                | CodexError::CodecDecode { .. }
                | CodexError::InvalidKey { .. }
        )
    }
}
