//! Lookup parameters and their canonical cache ids.
//!
//! Parameters address one entity of an id-addressed model. Two parameter
//! values that differ only in key order must land on the same cache entry,
//! so objects are serialized with their keys sorted.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{ValueError, ValueResult};
use crate::kind::{format_number, Primitive};

/// Parameters passed to a lookup.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Parameters {
    /// No parameters. Used by singleton models and "list everything" calls.
    #[default]
    None,
    /// A scalar id or a flat object of primitive values.
    Value(Value),
}

impl Parameters {
    /// Returns `true` if no parameters were supplied.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The raw parameter value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::None => None,
            Self::Value(v) => Some(v),
        }
    }

    /// Compute the stable cache id for these parameters.
    ///
    /// Returns `Ok(None)` when there are no parameters. Scalars are
    /// stringified directly; objects are serialized as JSON with sorted keys
    /// and must only hold primitive values.
    pub fn canonical_id(&self) -> ValueResult<Option<String>> {
        let value = match self {
            Self::None => return Ok(None),
            Self::Value(v) => v,
        };
        let id = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() => format_number(f),
                _ => n.to_string(),
            },
            Value::Bool(b) => b.to_string(),
            Value::Null => {
                return Err(ValueError::InvalidParameters("null".into()));
            }
            Value::Array(_) => {
                return Err(ValueError::InvalidParameters(
                    "arrays cannot address a model".into(),
                ));
            }
            Value::Object(map) => {
                let mut sorted = BTreeMap::new();
                for (key, v) in map {
                    if v.is_object() || v.is_array() {
                        return Err(ValueError::NestedParameter {
                            key: key.clone(),
                            found: "object".into(),
                        });
                    }
                    // Numbers go through the same formatting as scalar ids.
                    let v = Primitive::from_json(v).map_or_else(|| v.clone(), |p| p.to_json());
                    sorted.insert(key.as_str(), v);
                }
                serde_json::to_string(&sorted)
                    .map_err(|e| ValueError::Serialization(e.to_string()))?
            }
        };
        Ok(Some(id))
    }
}

impl From<Value> for Parameters {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Option<Value>> for Parameters {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::None, Self::Value)
    }
}

impl From<&str> for Parameters {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Parameters {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<&String> for Parameters {
    fn from(value: &String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Option<&str>> for Parameters {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Self::None, Self::from)
    }
}

impl From<i64> for Parameters {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}
