use std::path::PathBuf;

use tessera_cache::CacheError;
use tessera_model::{AdapterError, Hook, SchemaError};
use tessera_types::ValueError;

/// Errors returned by the store.
///
/// Every variant is cheap to clone so a failed lookup can be cached and
/// handed to each later reader.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Value(#[from] ValueError),

    /// Parameters were passed for a model without an `id` field.
    #[error("model '{0}' does not support parameters")]
    ParametersNotSupported(String),

    #[error("model instance must be an object or null: {0}")]
    NotAnObject(String),

    #[error("list of models must be an array: {0}")]
    NotAList(String),

    #[error("model instance must match model definition: expected '{expected}', found '{found}'")]
    ModelMismatch { expected: String, found: String },

    /// The instance was superseded by a newer version or comes from another store.
    #[error("instance is not registered with this store")]
    UnregisteredInstance,

    #[error("model '{0}' does not support 'get' action")]
    ReadUnsupported(String),

    #[error("model '{0}' does not support 'set' action")]
    WriteUnsupported(String),

    #[error("model '{0}' does not support listing")]
    ListUnsupported(String),

    #[error("{hook} hook failed: {source}")]
    Adapter { hook: Hook, source: AdapterError },

    /// A hook answered with a future but no tokio runtime is running.
    #[error("deferred hook reply needs a running tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("config error in {path}: {message}")]
    Config { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn adapter(hook: Hook, source: AdapterError) -> Self {
        Self::Adapter { hook, source }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
