//! Immutable model instances.
//!
//! An [`Instance`] is a cheap handle. Cloning shares the same value, and
//! [`Instance::ptr_eq`] tells whether two handles are the very same version.
//! Nested values live behind the same kind of handle, so an update that
//! leaves a branch untouched hands the old branch to the new version.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tessera_types::Primitive;

use crate::data::Data;
use crate::definition::{ComputedFn, ModelDefinition};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Link to an id-addressed entity, resolved through the store on access.
#[derive(Clone)]
pub struct Reference {
    definition: ModelDefinition,
    id: String,
}

impl Reference {
    pub fn new(definition: ModelDefinition, id: impl Into<String>) -> Self {
        Self {
            definition,
            id: id.into(),
        }
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition && self.id == other.id
    }
}

impl Eq for Reference {}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({}#{})", self.definition.name(), self.id)
    }
}

/// One slot of a [`ModelList`].
#[derive(Clone, Debug)]
pub enum ListItem {
    /// An embedded instance of a model without `id`.
    Model(Instance),
    /// An id-addressed entity.
    Ref(Reference),
}

impl ListItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Model(instance) => instance.id(),
            Self::Ref(reference) => Some(reference.id()),
        }
    }
}

/// Immutable sequence of models.
#[derive(Clone, Debug)]
pub struct ModelList {
    items: Arc<[ListItem]>,
}

impl ModelList {
    pub fn new(items: Vec<ListItem>) -> Self {
        Self {
            items: items.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ListItem> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ListItem> {
        self.items.iter()
    }

    /// Whether both handles share the same underlying sequence.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.items, &b.items)
    }
}

impl<'a> IntoIterator for &'a ModelList {
    type Item = &'a ListItem;
    type IntoIter = std::slice::Iter<'a, ListItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// The value stored in one field of an instance.
#[derive(Clone, Debug)]
pub enum FieldValue {
    Null,
    Primitive(Primitive),
    Primitives(Arc<[Primitive]>),
    Model(Instance),
    Ref(Reference),
    Models(ModelList),
}

impl FieldValue {
    /// Whether both values share storage. Scalars compare by value.
    pub fn same(a: &Self, b: &Self) -> bool {
        match (a, b) {
            (Self::Null, Self::Null) => true,
            (Self::Primitive(x), Self::Primitive(y)) => x == y,
            (Self::Primitives(x), Self::Primitives(y)) => Arc::ptr_eq(x, y),
            (Self::Model(x), Self::Model(y)) => Instance::ptr_eq(x, y),
            (Self::Ref(x), Self::Ref(y)) => x == y,
            (Self::Models(x), Self::Models(y)) => ModelList::ptr_eq(x, y),
            _ => false,
        }
    }

    fn to_data(&self) -> Data {
        match self {
            Self::Null => Data::Null,
            Self::Primitive(p) => Data::from(p.clone()),
            Self::Primitives(items) => {
                Data::List(items.iter().cloned().map(Data::from).collect())
            }
            Self::Model(instance) => Data::Model(instance.clone()),
            Self::Ref(reference) => Data::String(reference.id().to_string()),
            Self::Models(list) => Data::List(
                list.iter()
                    .map(|item| match item {
                        ListItem::Model(instance) => Data::Model(instance.clone()),
                        ListItem::Ref(reference) => Data::String(reference.id().to_string()),
                    })
                    .collect(),
            ),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Primitive(p) => p.serialize(serializer),
            Self::Primitives(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Model(instance) => instance.serialize(serializer),
            Self::Ref(reference) => serializer.serialize_str(reference.id()),
            Self::Models(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list {
                    match item {
                        ListItem::Model(instance) => seq.serialize_element(instance)?,
                        ListItem::Ref(reference) => seq.serialize_element(reference.id())?,
                    }
                }
                seq.end()
            }
        }
    }
}

struct ComputedSlot {
    key: String,
    compute: ComputedFn,
    value: OnceLock<Value>,
}

struct InstanceInner {
    serial: u64,
    id: Option<String>,
    fields: Vec<(String, FieldValue)>,
    computed: Vec<ComputedSlot>,
}

/// An immutable model value.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    /// Process-unique number of this version.
    pub fn serial(&self) -> u64 {
        self.inner.serial
    }

    pub fn id(&self) -> Option<&str> {
        self.inner.id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.inner
            .fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        (key == "id" && self.inner.id.is_some())
            || self.get(key).is_some()
            || self.inner.computed.iter().any(|slot| slot.key == key)
    }

    /// Stored fields in declaration order. Computed fields are not included.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.inner.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn primitive(&self, key: &str) -> Option<&Primitive> {
        match self.get(key)? {
            FieldValue::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.primitive(key)?.as_str()
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.primitive(key)?.as_f64()
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.primitive(key)?.as_bool()
    }

    pub fn primitives(&self, key: &str) -> Option<&[Primitive]> {
        match self.get(key)? {
            FieldValue::Primitives(items) => Some(items),
            _ => None,
        }
    }

    pub fn nested(&self, key: &str) -> Option<&Instance> {
        match self.get(key)? {
            FieldValue::Model(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn reference(&self, key: &str) -> Option<&Reference> {
        match self.get(key)? {
            FieldValue::Ref(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> Option<&ModelList> {
        match self.get(key)? {
            FieldValue::Models(list) => Some(list),
            _ => None,
        }
    }

    pub fn is_null(&self, key: &str) -> bool {
        matches!(self.get(key), Some(FieldValue::Null))
    }

    /// Read a computed field. The function runs on first read only.
    pub fn computed(&self, key: &str) -> Option<Value> {
        let slot = self.inner.computed.iter().find(|slot| slot.key == key)?;
        Some(slot.value.get_or_init(|| (slot.compute)(self)).clone())
    }

    /// Whether both handles point at the same version.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Stored fields as input data, ready to feed another create.
    pub fn to_map(&self) -> BTreeMap<String, Data> {
        let mut map: BTreeMap<String, Data> = self
            .inner
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_data()))
            .collect();
        if let Some(id) = &self.inner.id {
            map.insert("id".to_string(), Data::String(id.clone()));
        }
        map
    }

    pub fn to_data(&self) -> Data {
        Data::Map(self.to_map())
    }

    /// JSON form. References are written as their ids.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.inner.fields.len() + usize::from(self.inner.id.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(id) = &self.inner.id {
            map.serialize_entry("id", id)?;
        }
        for (key, value) in &self.inner.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Instance");
        s.field("serial", &self.inner.serial);
        if let Some(id) = &self.inner.id {
            s.field("id", id);
        }
        for (key, value) in &self.inner.fields {
            s.field(key, value);
        }
        s.finish_non_exhaustive()
    }
}

/// Non-owning handle on an instance.
#[derive(Clone, Debug)]
pub struct WeakInstance {
    inner: Weak<InstanceInner>,
}

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.inner.upgrade().map(|inner| Instance { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

/// Assembles a new instance field by field.
#[derive(Default)]
pub struct InstanceBuilder {
    id: Option<String>,
    fields: Vec<(String, FieldValue)>,
    computed: Vec<ComputedSlot>,
}

impl InstanceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    pub fn field(&mut self, key: impl Into<String>, value: FieldValue) -> &mut Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn computed(&mut self, key: impl Into<String>, compute: ComputedFn) -> &mut Self {
        self.computed.push(ComputedSlot {
            key: key.into(),
            compute,
            value: OnceLock::new(),
        });
        self
    }

    pub fn build(self) -> Instance {
        Instance {
            inner: Arc::new(InstanceInner {
                serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
                id: self.id,
                fields: self.fields,
                computed: self.computed,
            }),
        }
    }
}
