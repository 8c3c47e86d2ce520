//! Model definitions.
//!
//! A definition lists its fields in declaration order. Each field is declared
//! by example: a default value, a computed function, or another definition.
//! Definitions are compared by identity, so two structurally equal shapes
//! built separately are two distinct models.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::connection::Connection;
use crate::data::Data;
use crate::error::{SchemaError, SchemaResult};
use crate::instance::Instance;

static NEXT_DEFINITION: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`ModelDefinition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(u64);

impl DefinitionId {
    fn next() -> Self {
        Self(NEXT_DEFINITION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def#{}", self.0)
    }
}

/// A function deriving a field from the rest of an instance.
pub type ComputedFn = Arc<dyn Fn(&Instance) -> Value + Send + Sync>;

/// How a single field was declared.
#[derive(Clone)]
pub enum FieldDecl {
    /// A default value. Its JSON kind decides the field's semantics.
    Value(Value),
    /// Derived on first read, then memoized per instance.
    Computed(ComputedFn),
    /// A nested model.
    Model(ModelDefinition),
    /// A list of nested models with the given default items.
    Models {
        element: ModelDefinition,
        defaults: Vec<Data>,
    },
}

impl fmt::Debug for FieldDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
            Self::Model(def) => f.debug_tuple("Model").field(def).finish(),
            Self::Models { element, defaults } => f
                .debug_struct("Models")
                .field("element", element)
                .field("defaults", &defaults.len())
                .finish(),
        }
    }
}

struct DefinitionInner {
    id: DefinitionId,
    name: String,
    fields: Vec<(String, FieldDecl)>,
    connection: Option<Connection>,
}

/// Shared, immutable handle on a model definition.
#[derive(Clone)]
pub struct ModelDefinition {
    inner: Arc<DefinitionInner>,
}

impl ModelDefinition {
    /// Start building a definition field by field.
    pub fn builder(name: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder::new(name)
    }

    /// Build a definition from a JSON shape.
    ///
    /// Nested objects become nested definitions and arrays whose first item
    /// is an object become lists of nested models.
    pub fn from_shape(shape: Value) -> SchemaResult<Self> {
        Self::from_shape_named("model", shape)
    }

    /// Like [`ModelDefinition::from_shape`] with an explicit name.
    pub fn from_shape_named(name: impl Into<String>, shape: Value) -> SchemaResult<Self> {
        match shape {
            Value::Object(map) => Ok(infer_object(name.into(), map)),
            other => Err(SchemaError::NotAnObject(value_kind(&other).into())),
        }
    }

    pub fn id(&self) -> DefinitionId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn fields(&self) -> &[(String, FieldDecl)] {
        &self.inner.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldDecl> {
        self.inner
            .fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, decl)| decl)
    }

    /// The nested definition behind a model or list field.
    pub fn nested(&self, key: &str) -> Option<&ModelDefinition> {
        match self.field(key)? {
            FieldDecl::Model(def) => Some(def),
            FieldDecl::Models { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Whether the definition declares an `id` field.
    pub fn has_id(&self) -> bool {
        self.field("id").is_some()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.inner.connection.as_ref()
    }
}

impl PartialEq for ModelDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ModelDefinition {}

impl std::hash::Hash for ModelDefinition {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("fields", &self.inner.fields.len())
            .field("connected", &self.inner.connection.is_some())
            .finish()
    }
}

/// Builder for [`ModelDefinition`].
pub struct DefinitionBuilder {
    name: String,
    fields: Vec<(String, FieldDecl)>,
    connection: Option<Connection>,
}

impl DefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            connection: None,
        }
    }

    /// Declare the `id` field, making the model id-addressed.
    pub fn id(self) -> Self {
        self.decl("id", FieldDecl::Value(Value::Bool(true)))
    }

    /// Declare a field by its default value. Objects and arrays of objects
    /// are inferred as nested models the same way shapes are.
    pub fn field(self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        let key = key.into();
        let decl = infer_field(&key, default.into());
        self.decl(key, decl)
    }

    pub fn computed<F>(self, key: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Instance) -> Value + Send + Sync + 'static,
    {
        self.decl(key, FieldDecl::Computed(Arc::new(compute)))
    }

    pub fn model(self, key: impl Into<String>, definition: &ModelDefinition) -> Self {
        self.decl(key, FieldDecl::Model(definition.clone()))
    }

    pub fn models(self, key: impl Into<String>, element: &ModelDefinition) -> Self {
        self.models_with(key, element, Vec::new())
    }

    /// A list field with default items, used when creating a fresh instance.
    pub fn models_with(
        self,
        key: impl Into<String>,
        element: &ModelDefinition,
        defaults: Vec<Data>,
    ) -> Self {
        self.decl(
            key,
            FieldDecl::Models {
                element: element.clone(),
                defaults,
            },
        )
    }

    /// Back the model with storage hooks.
    pub fn connect(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn decl(mut self, key: impl Into<String>, decl: FieldDecl) -> Self {
        self.fields.push((key.into(), decl));
        self
    }

    pub fn build(self) -> ModelDefinition {
        ModelDefinition {
            inner: Arc::new(DefinitionInner {
                id: DefinitionId::next(),
                name: self.name,
                fields: self.fields,
                connection: self.connection,
            }),
        }
    }
}

fn infer_object(name: String, map: Map<String, Value>) -> ModelDefinition {
    map.into_iter()
        .fold(DefinitionBuilder::new(name), |builder, (key, value)| {
            builder.field(key, value)
        })
        .build()
}

fn infer_field(key: &str, default: Value) -> FieldDecl {
    match default {
        Value::Object(map) => FieldDecl::Model(infer_object(key.to_string(), map)),
        Value::Array(items) => match items.first() {
            Some(Value::Object(first)) => FieldDecl::Models {
                element: infer_object(key.to_string(), first.clone()),
                defaults: items.into_iter().map(Data::from).collect(),
            },
            _ => FieldDecl::Value(Value::Array(items)),
        },
        other => FieldDecl::Value(other),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
