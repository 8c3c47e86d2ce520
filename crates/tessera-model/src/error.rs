use tessera_types::ValueError;

/// Errors in a model definition, raised when it is compiled.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The shape handed in was not an object.
    #[error("model definition must be an object: {0}")]
    NotAnObject(String),

    /// The `id` field was declared with something other than `true`.
    #[error("'id' key must be set to true or not defined: {0}")]
    InvalidId(String),

    /// A default value whose kind cannot describe a field.
    #[error("unsupported default for '{key}': {source}")]
    UnsupportedDefault { key: String, source: ValueError },

    /// The same field name was declared twice.
    #[error("duplicate field '{0}'")]
    DuplicateField(String),
}

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// A failure reported by a storage hook.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AdapterError {
    message: String,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for AdapterError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for AdapterError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result alias for storage hooks.
pub type AdapterResult<T> = Result<T, AdapterError>;
