//! Type ids, codecs, and the factory registry used to turn raw entry
//! definitions into collectables.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::collectable::errors::CodexError;
use crate::collectable::types::{BasicCollectable, Collectable};

/// Id of the built-in configuration-driven type.
pub const BASIC_TYPE_ID: &str = "basic";

#[derive(Debug, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError(err.to_string())
    }
}

/// Reads and writes values of `T` from the JSON value model used for raw
/// configuration. Missing values resolve to `default`.
pub trait TypeCodec<T>: Send + Sync {
    /// Decode the value at a dotted `path` inside `section`.
    fn decode(&self, section: &Value, path: &str, default: Option<T>)
        -> Result<Option<T>, CodecError>;

    /// Decode a value that was already extracted.
    fn decode_from_raw(&self, raw: Option<&Value>, default: Option<T>)
        -> Result<Option<T>, CodecError>;

    fn encode(&self, value: &T) -> Result<Value, CodecError>;
}

fn lookup_path<'a>(section: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(section);
    }
    path.split('.')
        .try_fold(section, |node, segment| node.as_object()?.get(segment))
}

/// Codec for anything serde can handle.
pub struct SerdeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TypeCodec<T> for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn decode(
        &self,
        section: &Value,
        path: &str,
        default: Option<T>,
    ) -> Result<Option<T>, CodecError> {
        self.decode_from_raw(lookup_path(section, path), default)
    }

    fn decode_from_raw(
        &self,
        raw: Option<&Value>,
        default: Option<T>,
    ) -> Result<Option<T>, CodecError> {
        match raw {
            None | Some(Value::Null) => Ok(default),
            Some(value) => Ok(Some(T::deserialize(value)?)),
        }
    }

    fn encode(&self, value: &T) -> Result<Value, CodecError> {
        Ok(serde_json::to_value(value)?)
    }
}

type DecodeFn = dyn Fn(&Value) -> Result<Arc<dyn Collectable>, CodecError> + Send + Sync;
type EncodeFn = dyn Fn(&dyn Collectable) -> Result<Value, CodecError> + Send + Sync;

/// A registered collectable implementation: its id plus the factory and
/// encoder derived from its codec.
pub struct CollectableType {
    id: String,
    type_name: &'static str,
    decode: Box<DecodeFn>,
    encode: Box<EncodeFn>,
}

impl CollectableType {
    pub fn new<T, C>(id: &str, codec: C) -> Self
    where
        T: Collectable,
        C: TypeCodec<T> + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let codec = Arc::new(codec);
        let decoder = Arc::clone(&codec);
        Self {
            id: id.to_ascii_lowercase(),
            type_name,
            decode: Box::new(move |raw| {
                decoder
                    .decode_from_raw(Some(raw), None)?
                    .map(|value| Arc::new(value) as Arc<dyn Collectable>)
                    .ok_or_else(|| CodecError("entry definition is empty".to_string()))
            }),
            encode: Box::new(move |value| {
                let typed = value
                    .as_any()
                    .downcast_ref::<T>()
                    .ok_or_else(|| CodecError(format!("entry is not a {}", type_name)))?;
                codec.encode(typed)
            }),
        }
    }

    /// Type backed by [`SerdeCodec`].
    pub fn of<T>(id: &str) -> Self
    where
        T: Collectable + Serialize + DeserializeOwned,
    {
        Self::new(id, SerdeCodec::<T>::new())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rust type name of the implementation, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn decode(&self, raw: &Value) -> Result<Arc<dyn Collectable>, CodecError> {
        (self.decode)(raw)
    }

    /// Encode an entry back to its raw form, tagged with this type's id.
    pub fn encode(&self, value: &dyn Collectable) -> Result<Value, CodecError> {
        let mut raw = (self.encode)(value)?;
        if let Value::Object(map) = &mut raw {
            map.insert("type".to_string(), Value::String(self.id.clone()));
        }
        Ok(raw)
    }
}

impl std::fmt::Debug for CollectableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectableType")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Case-insensitive map from type id to [`CollectableType`].
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<CollectableType>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the `basic` type.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        let mut types = registry
            .types
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        types.insert(
            BASIC_TYPE_ID.to_string(),
            Arc::new(CollectableType::of::<BasicCollectable>(BASIC_TYPE_ID)),
        );
        drop(types);
        registry
    }

    pub fn register(&self, collectable_type: CollectableType) -> Result<(), CodexError> {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        let id = collectable_type.id().to_string();
        if types.contains_key(&id) {
            return Err(CodexError::DuplicateType(id));
        }
        debug!(
            "registered collectable type '{}' ({})",
            id,
            collectable_type.type_name()
        );
        types.insert(id, Arc::new(collectable_type));
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<CollectableType>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id.to_ascii_lowercase())
            .cloned()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
