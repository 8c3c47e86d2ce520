use thiserror::Error;

use crate::kind::Kind;

/// Errors produced while interpreting dynamic values.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    /// A structured value was supplied where a scalar was expected.
    #[error("cannot coerce {found} into {kind}")]
    NotCoercible { kind: Kind, found: String },

    /// A default value whose kind cannot describe a field.
    #[error("property type must be string, number or boolean: {0}")]
    UnsupportedKind(String),

    /// Parameters that cannot be turned into a cache id.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A parameter object carried a structured value under `key`.
    #[error("you must use primitive value for '{key}' key: {found}")]
    NestedParameter { key: String, found: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for value operations.
pub type ValueResult<T> = Result<T, ValueError>;
