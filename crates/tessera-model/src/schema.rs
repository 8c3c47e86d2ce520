//! Compiling definitions into configs.
//!
//! Compilation validates a definition and turns each declared field into a
//! [`FieldKind`]. It happens once per definition; the registry hands out the
//! same [`Config`] on every later call, including for definitions reached
//! through nested fields.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tessera_types::{Kind, Primitive, ValueError};
use tracing::debug;

use crate::connection::Connection;
use crate::data::Data;
use crate::definition::{value_kind, ComputedFn, DefinitionId, FieldDecl, ModelDefinition};
use crate::error::{SchemaError, SchemaResult};

/// Where a model's instances come from.
#[derive(Clone, Debug)]
pub enum Hooks {
    /// Held only in memory. Singletons are created from defaults on demand.
    Local,
    /// Backed by storage hooks.
    Connected(Connection),
}

/// The compiled form of one field.
#[derive(Clone)]
pub enum FieldKind {
    /// The `id` field: kept from the previous version, else taken from the
    /// data, else generated.
    Id,
    Computed(ComputedFn),
    /// A scalar with its default.
    Primitive { kind: Kind, default: Primitive },
    /// A list of scalars with its default.
    Primitives { kind: Kind, default: Arc<[Primitive]> },
    /// A nested model. External nested models are stored as references.
    Model(Arc<Config>),
    /// A list of nested models with the items used for fresh instances.
    Models {
        list: Arc<ListConfig>,
        defaults: Arc<[Data]>,
    },
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => f.write_str("Id"),
            Self::Computed(_) => f.write_str("Computed"),
            Self::Primitive { kind, default } => f
                .debug_struct("Primitive")
                .field("kind", kind)
                .field("default", default)
                .finish(),
            Self::Primitives { kind, default } => f
                .debug_struct("Primitives")
                .field("kind", kind)
                .field("default", default)
                .finish(),
            Self::Model(config) => f.debug_tuple("Model").field(&config.definition().name()).finish(),
            Self::Models { list, defaults } => f
                .debug_struct("Models")
                .field("element", &list.definition().name())
                .field("defaults", &defaults.len())
                .finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldSchema {
    key: String,
    kind: FieldKind,
}

impl FieldSchema {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }
}

/// A compiled model definition.
#[derive(Debug)]
pub struct Config {
    definition: ModelDefinition,
    external: bool,
    hooks: Hooks,
    fields: Vec<FieldSchema>,
}

impl Config {
    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    /// Whether instances are addressed by id.
    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn connection(&self) -> Option<&Connection> {
        match &self.hooks {
            Hooks::Local => None,
            Hooks::Connected(connection) => Some(connection),
        }
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.key == key)
    }
}

/// A compiled list of models. Mirrors the element's addressing and hooks.
#[derive(Debug)]
pub struct ListConfig {
    element: Arc<Config>,
}

impl ListConfig {
    pub fn element(&self) -> &Arc<Config> {
        &self.element
    }

    pub fn definition(&self) -> &ModelDefinition {
        self.element.definition()
    }

    pub fn is_external(&self) -> bool {
        self.element.is_external()
    }
}

/// Memoizes compiled configs per definition.
#[derive(Default)]
pub struct SchemaRegistry {
    configs: RwLock<HashMap<DefinitionId, Arc<Config>>>,
    lists: RwLock<HashMap<DefinitionId, Arc<ListConfig>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a definition, or return its config if already compiled.
    pub fn compile(&self, definition: &ModelDefinition) -> SchemaResult<Arc<Config>> {
        if let Some(config) = self
            .configs
            .read()
            .expect("lock poisoned")
            .get(&definition.id())
        {
            return Ok(Arc::clone(config));
        }

        let config = Arc::new(self.build(definition)?);
        debug!(
            definition = %definition.id(),
            name = definition.name(),
            fields = config.fields.len(),
            external = config.external,
            "compiled model definition"
        );

        let mut configs = self.configs.write().expect("lock poisoned");
        Ok(Arc::clone(configs.entry(definition.id()).or_insert(config)))
    }

    /// Compile the list form of a definition.
    pub fn compile_list(&self, element: &ModelDefinition) -> SchemaResult<Arc<ListConfig>> {
        if let Some(list) = self
            .lists
            .read()
            .expect("lock poisoned")
            .get(&element.id())
        {
            return Ok(Arc::clone(list));
        }

        let list = Arc::new(ListConfig {
            element: self.compile(element)?,
        });
        let mut lists = self.lists.write().expect("lock poisoned");
        Ok(Arc::clone(lists.entry(element.id()).or_insert(list)))
    }

    pub fn get(&self, id: DefinitionId) -> Option<Arc<Config>> {
        self.configs.read().expect("lock poisoned").get(&id).cloned()
    }

    /// Number of compiled definitions.
    pub fn len(&self) -> usize {
        self.configs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build(&self, definition: &ModelDefinition) -> SchemaResult<Config> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(definition.fields().len());
        for (key, decl) in definition.fields() {
            if !seen.insert(key.as_str()) {
                return Err(SchemaError::DuplicateField(key.clone()));
            }
            fields.push(FieldSchema {
                key: key.clone(),
                kind: self.compile_field(key, decl)?,
            });
        }

        let hooks = match definition.connection() {
            Some(connection) => Hooks::Connected(connection.clone()),
            None => Hooks::Local,
        };

        Ok(Config {
            definition: definition.clone(),
            external: definition.has_id(),
            hooks,
            fields,
        })
    }

    fn compile_field(&self, key: &str, decl: &FieldDecl) -> SchemaResult<FieldKind> {
        if key == "id" {
            return match decl {
                FieldDecl::Value(Value::Bool(true)) => Ok(FieldKind::Id),
                FieldDecl::Value(other) => Err(SchemaError::InvalidId(value_kind(other).into())),
                _ => Err(SchemaError::InvalidId("object".into())),
            };
        }

        let unsupported = |source: ValueError| SchemaError::UnsupportedDefault {
            key: key.to_string(),
            source,
        };

        match decl {
            FieldDecl::Computed(compute) => Ok(FieldKind::Computed(Arc::clone(compute))),
            FieldDecl::Model(definition) => Ok(FieldKind::Model(self.compile(definition)?)),
            FieldDecl::Models { element, defaults } => Ok(FieldKind::Models {
                list: self.compile_list(element)?,
                defaults: defaults.clone().into(),
            }),
            FieldDecl::Value(Value::Array(items)) => {
                let first = items
                    .first()
                    .ok_or_else(|| unsupported(ValueError::UnsupportedKind("undefined".into())))?;
                let kind = Kind::of(first).map_err(unsupported)?;
                let default = items
                    .iter()
                    .map(|item| kind.coerce_json(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(unsupported)?;
                Ok(FieldKind::Primitives {
                    kind,
                    default: default.into(),
                })
            }
            FieldDecl::Value(value) => {
                let kind = Kind::of(value).map_err(unsupported)?;
                let default = kind.coerce_json(value).map_err(unsupported)?;
                Ok(FieldKind::Primitive { kind, default })
            }
        }
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("configs", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Reply;
    use serde_json::json;

    #[test]
    fn compiles_field_kinds() {
        let registry = SchemaRegistry::new();
        let def = ModelDefinition::from_shape(json!({
            "id": true,
            "string": "value",
            "number": 1,
            "bool": false,
            "tags": ["a"],
            "nested": { "value": "test" },
            "items": [{ "one": "one" }],
        }))
        .unwrap();
        let config = registry.compile(&def).unwrap();

        assert!(config.is_external());
        assert!(matches!(config.hooks(), Hooks::Local));
        assert!(matches!(config.field("id").unwrap().kind(), FieldKind::Id));
        assert!(matches!(
            config.field("number").unwrap().kind(),
            FieldKind::Primitive { kind: Kind::Number, .. }
        ));
        assert!(matches!(
            config.field("tags").unwrap().kind(),
            FieldKind::Primitives { kind: Kind::String, .. }
        ));
        match config.field("nested").unwrap().kind() {
            FieldKind::Model(nested) => assert!(!nested.is_external()),
            other => panic!("unexpected kind: {other:?}"),
        }
        match config.field("items").unwrap().kind() {
            FieldKind::Models { list, defaults } => {
                assert!(!list.is_external());
                assert_eq!(defaults.len(), 1);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn compilation_is_memoized() {
        let registry = SchemaRegistry::new();
        let nested = ModelDefinition::builder("Nested").field("value", "").build();
        let def = ModelDefinition::builder("Parent").model("nested", &nested).build();

        let first = registry.compile(&def).unwrap();
        let second = registry.compile(&def).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 2);

        let direct = registry.compile(&nested).unwrap();
        match first.field("nested").unwrap().kind() {
            FieldKind::Model(via_parent) => assert!(Arc::ptr_eq(via_parent, &direct)),
            other => panic!("unexpected kind: {other:?}"),
        }

        let list = registry.compile_list(&nested).unwrap();
        assert!(Arc::ptr_eq(list.element(), &direct));
        assert!(Arc::ptr_eq(&list, &registry.compile_list(&nested).unwrap()));
    }

    #[test]
    fn id_must_be_true() {
        let registry = SchemaRegistry::new();
        let def = ModelDefinition::from_shape(json!({ "id": "x" })).unwrap();
        assert_eq!(
            registry.compile(&def).unwrap_err(),
            SchemaError::InvalidId("string".into())
        );
        let def = ModelDefinition::from_shape(json!({ "id": false })).unwrap();
        assert!(registry.compile(&def).is_err());
    }

    #[test]
    fn unsupported_defaults_fail() {
        let registry = SchemaRegistry::new();
        for shape in [
            json!({ "value": null }),
            json!({ "value": [] }),
            json!({ "value": [["nested"]] }),
            json!({ "value": [1, { "a": 1 }] }),
        ] {
            let def = ModelDefinition::from_shape(shape.clone()).unwrap();
            let err = registry.compile(&def).unwrap_err();
            assert!(
                matches!(err, SchemaError::UnsupportedDefault { ref key, .. } if key == "value"),
                "{shape} -> {err}"
            );
        }
    }

    #[test]
    fn array_defaults_are_coerced_to_the_first_kind() {
        let registry = SchemaRegistry::new();
        let def = ModelDefinition::from_shape(json!({ "values": [1, "2", true] })).unwrap();
        let config = registry.compile(&def).unwrap();
        match config.field("values").unwrap().kind() {
            FieldKind::Primitives { default, .. } => assert_eq!(
                default.as_ref(),
                [Primitive::Number(1.0), Primitive::Number(2.0), Primitive::Number(1.0)]
            ),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let registry = SchemaRegistry::new();
        let def = ModelDefinition::builder("Dup").field("a", 1).field("a", 2).build();
        assert_eq!(
            registry.compile(&def).unwrap_err(),
            SchemaError::DuplicateField("a".into())
        );
    }

    #[test]
    fn connected_definitions_keep_their_hooks() {
        let registry = SchemaRegistry::new();
        let def = ModelDefinition::builder("Remote")
            .id()
            .field("value", "")
            .connect(Connection::new().get(|_| Reply::ready(None)))
            .build();
        let config = registry.compile(&def).unwrap();
        let connection = config.connection().unwrap();
        assert!(connection.get_hook().is_some());
        assert!(connection.set_hook().is_none());
    }
}
