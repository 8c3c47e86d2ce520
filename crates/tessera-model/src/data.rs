use std::collections::BTreeMap;

use serde_json::Value;
use tessera_types::{Kind, Primitive, ValueError, ValueResult};

use crate::instance::Instance;

/// Dynamic input for creating or updating an instance.
///
/// Besides plain JSON-like values, data may carry existing [`Instance`]s.
/// The store uses that to keep identity: an instance it already knows is
/// linked rather than copied.
#[derive(Clone, Debug, Default)]
pub enum Data {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Data>),
    Map(BTreeMap<String, Data>),
    Model(Instance),
}

impl Data {
    /// An empty object.
    pub fn empty() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Build an object from key/value pairs.
    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Data>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Look up a key of an object.
    pub fn get(&self, key: &str) -> Option<&Data> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Data>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Name of the value's shape, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "array",
            Self::Map(_) | Self::Model(_) => "object",
        }
    }

    /// The scalar held by this value, if it is one.
    pub fn to_primitive(&self) -> Option<Primitive> {
        match self {
            Self::Bool(b) => Some(Primitive::Bool(*b)),
            Self::Number(n) => Some(Primitive::Number(*n)),
            Self::String(s) => Some(Primitive::String(s.clone())),
            _ => None,
        }
    }

    /// Convert into a field of the given kind.
    pub fn coerce(&self, kind: Kind) -> ValueResult<Primitive> {
        match self {
            Self::Null => Ok(kind.coerce_null()),
            other => match other.to_primitive() {
                Some(p) => Ok(kind.coerce(&p)),
                None => Err(ValueError::NotCoercible {
                    kind,
                    found: other.kind_name().to_string(),
                }),
            },
        }
    }

    /// Plain JSON form. Instances are serialized with their fields.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Primitive::Number(*n).to_json(),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Data::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Model(instance) => instance.to_json(),
        }
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Data::from).collect()),
            Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Data::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for Data {
    fn from(value: &Value) -> Self {
        Self::from(value.clone())
    }
}

impl From<Instance> for Data {
    fn from(instance: Instance) -> Self {
        Self::Model(instance)
    }
}

impl From<&Instance> for Data {
    fn from(instance: &Instance) -> Self {
        Self::Model(instance.clone())
    }
}

impl From<Option<Instance>> for Data {
    fn from(instance: Option<Instance>) -> Self {
        instance.map_or(Self::Null, Self::Model)
    }
}

impl From<Primitive> for Data {
    fn from(value: Primitive) -> Self {
        match value {
            Primitive::String(s) => Self::String(s),
            Primitive::Number(n) => Self::Number(n),
            Primitive::Bool(b) => Self::Bool(b),
        }
    }
}

impl From<&str> for Data {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Data {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for Data {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Data {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for Data {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<Data>> for Data {
    fn from(items: Vec<Data>) -> Self {
        Self::List(items)
    }
}
