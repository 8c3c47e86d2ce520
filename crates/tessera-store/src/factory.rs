//! Instance and list construction.
//!
//! Creation walks the compiled fields of a config and fills each one from the
//! input data, falling back to the previous version, then to the declared
//! default. Nested id-addressed data is created, written back to the cache and
//! linked by reference.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_model::{
    Config, Data, FieldKind, FieldSchema, FieldValue, Instance, InstanceBuilder, ListConfig,
    ListItem, ModelDefinition, ModelList, Reference,
};
use tessera_types::{identifier, Kind, Primitive};

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

impl Store {
    /// Build a new instance of `config` from `data`.
    ///
    /// `previous` is the version being updated; it is unregistered in favour
    /// of the result. Returns `Ok(None)` for null data, and `previous` itself
    /// when `data` is that very instance.
    pub(crate) fn create_with(
        &self,
        config: &Arc<Config>,
        data: &Data,
        previous: Option<&Instance>,
    ) -> StoreResult<Option<Instance>> {
        self.build(config, data, previous, true)
    }

    /// Like [`Store::create_with`], but `previous` stays registered until
    /// [`Store::retire_superseded`] is called for it.
    pub(crate) fn create_candidate(
        &self,
        config: &Arc<Config>,
        data: &Data,
        previous: Option<&Instance>,
    ) -> StoreResult<Option<Instance>> {
        self.build(config, data, previous, false)
    }

    fn build(
        &self,
        config: &Arc<Config>,
        data: &Data,
        previous: Option<&Instance>,
        supersede: bool,
    ) -> StoreResult<Option<Instance>> {
        let map: Cow<'_, BTreeMap<String, Data>> = match data {
            Data::Null => return Ok(None),
            Data::Map(map) => Cow::Borrowed(map),
            Data::Model(given) => {
                if let Some(previous) = previous.filter(|p| Instance::ptr_eq(p, given)) {
                    return Ok(Some(previous.clone()));
                }
                Cow::Owned(given.to_map())
            }
            other => return Err(StoreError::NotAnObject(other.kind_name().into())),
        };

        let mut builder = InstanceBuilder::new();
        for field in config.fields() {
            self.fill_field(&mut builder, field, &map, previous, supersede)?;
        }
        let instance = builder.build();
        self.registry().register(
            &instance,
            config.definition(),
            previous.filter(|_| supersede),
        );
        Ok(Some(instance))
    }

    /// Unregister `previous` and every embedded version that `current` no
    /// longer shares with it.
    pub(crate) fn retire_superseded(&self, previous: &Instance, current: Option<&Instance>) {
        if current.is_some_and(|c| Instance::ptr_eq(c, previous)) {
            return;
        }
        self.registry().retire(previous);
        for (key, value) in previous.fields() {
            if let FieldValue::Model(old) = value {
                self.retire_superseded(old, current.and_then(|c| c.nested(key)));
            }
        }
    }

    fn fill_field(
        &self,
        builder: &mut InstanceBuilder,
        field: &FieldSchema,
        data: &BTreeMap<String, Data>,
        previous: Option<&Instance>,
        supersede: bool,
    ) -> StoreResult<()> {
        let key = field.key();
        let given = data.get(key);
        let kept = || previous.and_then(|p| p.get(key)).cloned();

        let value = match field.kind() {
            FieldKind::Id => {
                let id = match previous.and_then(Instance::id) {
                    Some(id) => id.to_string(),
                    None => match given.filter(|d| !d.is_null()) {
                        Some(d) => match d.coerce(Kind::String)? {
                            Primitive::String(s) if !s.is_empty() => s,
                            _ => identifier::generate(),
                        },
                        None => identifier::generate(),
                    },
                };
                builder.id(id);
                return Ok(());
            }
            FieldKind::Computed(compute) => {
                builder.computed(key, Arc::clone(compute));
                return Ok(());
            }
            FieldKind::Primitive { kind, default } => match given {
                Some(d) => FieldValue::Primitive(d.coerce(*kind)?),
                None => kept().unwrap_or_else(|| FieldValue::Primitive(default.clone())),
            },
            FieldKind::Primitives { kind, default } => match given {
                Some(Data::List(items)) => FieldValue::Primitives(
                    items
                        .iter()
                        .map(|item| item.coerce(*kind))
                        .collect::<Result<Vec<_>, _>>()?
                        .into(),
                ),
                Some(other) => return Err(StoreError::NotAList(other.kind_name().into())),
                None => kept().unwrap_or_else(|| FieldValue::Primitives(Arc::clone(default))),
            },
            FieldKind::Models { list, defaults } => match given {
                Some(Data::List(items)) => FieldValue::Models(self.create_list_with(list, items)?),
                Some(other) => return Err(StoreError::NotAList(other.kind_name().into())),
                None => match kept() {
                    Some(existing) => existing,
                    None if list.is_external() => FieldValue::Models(ModelList::empty()),
                    None => FieldValue::Models(self.create_list_with(list, defaults)?),
                },
            },
            FieldKind::Model(nested) if nested.is_external() => {
                let reference = match given {
                    Some(d) => self.link(nested, d)?,
                    None => match kept() {
                        Some(FieldValue::Ref(reference)) => Some(reference),
                        _ => None,
                    },
                };
                reference.map_or(FieldValue::Null, FieldValue::Ref)
            }
            FieldKind::Model(nested) => match given {
                Some(d) => self
                    .build(nested, d, previous.and_then(|p| p.nested(key)), supersede)?
                    .map_or(FieldValue::Null, FieldValue::Model),
                None => match kept() {
                    Some(existing) => existing,
                    None => self
                        .create_with(nested, &Data::empty(), None)?
                        .map_or(FieldValue::Null, FieldValue::Model),
                },
            },
        };

        builder.field(key, value);
        Ok(())
    }

    /// Turn nested data for an id-addressed model into a reference.
    fn link(&self, nested: &Arc<Config>, data: &Data) -> StoreResult<Option<Reference>> {
        match data {
            Data::Null => Ok(None),
            Data::List(_) => Err(StoreError::NotAnObject("array".into())),
            Data::Map(_) => self.create_linked(nested, data),
            Data::Model(given) => match self.registry().definition_of(given) {
                Some(definition) => {
                    ensure_same(nested.definition(), &definition)?;
                    Ok(given.id().map(|id| Reference::new(definition, id)))
                }
                None => self.create_linked(nested, data),
            },
            scalar => {
                let id = scalar.coerce(Kind::String)?.to_string();
                Ok(Some(Reference::new(nested.definition().clone(), id)))
            }
        }
    }

    /// Create an id-addressed instance, write it back and reference it.
    fn create_linked(&self, config: &Arc<Config>, data: &Data) -> StoreResult<Option<Reference>> {
        let Some(instance) = self.create_with(config, data, None)? else {
            return Ok(None);
        };
        let id = instance.id().map(str::to_owned);
        self.write_back(config, id.clone(), Some(instance));
        Ok(id.map(|id| Reference::new(config.definition().clone(), id)))
    }

    /// Build a list of `list`'s element model from raw items.
    pub(crate) fn create_list_with(&self, list: &ListConfig, items: &[Data]) -> StoreResult<ModelList> {
        let element = list.element();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let slot = match item {
                Data::Model(given) => match self.registry().definition_of(given) {
                    Some(definition) => {
                        ensure_same(element.definition(), &definition)?;
                        if element.is_external() {
                            match given.id() {
                                Some(id) => ListItem::Ref(Reference::new(definition, id)),
                                None => continue,
                            }
                        } else {
                            ListItem::Model(given.clone())
                        }
                    }
                    None => self.create_item(element, item)?,
                },
                Data::Map(_) => self.create_item(element, item)?,
                Data::Null | Data::List(_) => {
                    return Err(StoreError::NotAnObject(item.kind_name().into()));
                }
                scalar if element.is_external() => ListItem::Ref(Reference::new(
                    element.definition().clone(),
                    scalar.coerce(Kind::String)?.to_string(),
                )),
                scalar => return Err(StoreError::NotAnObject(scalar.kind_name().into())),
            };
            out.push(slot);
        }
        Ok(ModelList::new(out))
    }

    fn create_item(&self, element: &Arc<Config>, data: &Data) -> StoreResult<ListItem> {
        if element.is_external() {
            return self
                .create_linked(element, data)?
                .map(ListItem::Ref)
                .ok_or_else(|| StoreError::NotAnObject("null".into()));
        }
        self.create_with(element, data, None)?
            .map(ListItem::Model)
            .ok_or_else(|| StoreError::NotAnObject("null".into()))
    }
}

fn ensure_same(expected: &ModelDefinition, found: &ModelDefinition) -> StoreResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(StoreError::ModelMismatch {
            expected: expected.name().to_string(),
            found: found.name().to_string(),
        })
    }
}
