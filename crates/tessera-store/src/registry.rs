//! Identity registry.
//!
//! Maps each live instance version back to the definition that produced it,
//! and each definition to its compiled config. Only instances created by the
//! store are registered; when a version is superseded its entry is removed,
//! so passing an outdated instance to `set` is detected.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tessera_model::{
    Config, Instance, ListConfig, ModelDefinition, SchemaRegistry, WeakInstance,
};
use tracing::trace;

use crate::error::StoreResult;

struct Registration {
    instance: WeakInstance,
    definition: ModelDefinition,
}

/// Reverse lookup from instances to definitions, plus compiled configs.
pub struct IdentityRegistry {
    schemas: SchemaRegistry,
    instances: RwLock<HashMap<u64, Registration>>,
    since_sweep: AtomicUsize,
    sweep_interval: usize,
}

impl IdentityRegistry {
    pub fn new(sweep_interval: usize) -> Self {
        Self {
            schemas: SchemaRegistry::new(),
            instances: RwLock::new(HashMap::new()),
            since_sweep: AtomicUsize::new(0),
            sweep_interval: sweep_interval.max(1),
        }
    }

    /// Compiled config of a definition, compiling it on first use.
    pub fn config(&self, definition: &ModelDefinition) -> StoreResult<Arc<Config>> {
        Ok(self.schemas.compile(definition)?)
    }

    pub fn list_config(&self, element: &ModelDefinition) -> StoreResult<Arc<ListConfig>> {
        Ok(self.schemas.compile_list(element)?)
    }

    /// Record a freshly created instance, dropping the version it replaces.
    pub fn register(
        &self,
        instance: &Instance,
        definition: &ModelDefinition,
        previous: Option<&Instance>,
    ) {
        let mut instances = self.instances.write().expect("lock poisoned");
        if let Some(previous) = previous {
            instances.remove(&previous.serial());
        }
        instances.insert(
            instance.serial(),
            Registration {
                instance: instance.downgrade(),
                definition: definition.clone(),
            },
        );

        if self.since_sweep.fetch_add(1, Ordering::Relaxed) + 1 >= self.sweep_interval {
            self.since_sweep.store(0, Ordering::Relaxed);
            let before = instances.len();
            instances.retain(|_, registration| registration.instance.is_alive());
            trace!(
                removed = before - instances.len(),
                live = instances.len(),
                "swept identity registry"
            );
        }
    }

    /// Drop the registration of a superseded version.
    pub fn retire(&self, instance: &Instance) {
        self.instances
            .write()
            .expect("lock poisoned")
            .remove(&instance.serial());
    }

    /// Definition of a registered instance. `None` for superseded or foreign
    /// instances.
    pub fn definition_of(&self, instance: &Instance) -> Option<ModelDefinition> {
        let instances = self.instances.read().expect("lock poisoned");
        let registration = instances.get(&instance.serial())?;
        registration
            .instance
            .upgrade()
            .filter(|live| Instance::ptr_eq(live, instance))
            .map(|_| registration.definition.clone())
    }

    pub fn is_registered(&self, instance: &Instance) -> bool {
        self.definition_of(instance).is_some()
    }

    /// Number of registry entries, including dead ones not yet swept.
    pub fn len(&self) -> usize {
        self.instances.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("schemas", &self.schemas)
            .field("instances", &self.len())
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_model::{FieldValue, InstanceBuilder};

    fn instance(value: &str) -> Instance {
        let mut builder = InstanceBuilder::new();
        builder.field("value", FieldValue::Primitive(value.into()));
        builder.build()
    }

    fn definition() -> ModelDefinition {
        ModelDefinition::builder("Item").field("value", "").build()
    }

    #[test]
    fn registered_instances_map_to_their_definition() {
        let registry = IdentityRegistry::new(16);
        let def = definition();
        let a = instance("a");
        registry.register(&a, &def, None);

        assert_eq!(registry.definition_of(&a), Some(def));
        assert!(!registry.is_registered(&instance("foreign")));
    }

    #[test]
    fn superseded_versions_are_unregistered() {
        let registry = IdentityRegistry::new(16);
        let def = definition();
        let first = instance("a");
        registry.register(&first, &def, None);
        let second = instance("b");
        registry.register(&second, &def, Some(&first));

        assert!(!registry.is_registered(&first));
        assert!(registry.is_registered(&second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn retired_versions_are_unregistered() {
        let registry = IdentityRegistry::new(16);
        let def = definition();
        let a = instance("a");
        let b = instance("b");
        registry.register(&a, &def, None);
        registry.register(&b, &def, None);

        registry.retire(&a);
        assert!(!registry.is_registered(&a));
        assert!(registry.is_registered(&b));
    }

    #[test]
    fn dead_entries_are_swept() {
        let registry = IdentityRegistry::new(4);
        let def = definition();
        for i in 0..3 {
            registry.register(&instance(&i.to_string()), &def, None);
        }
        assert_eq!(registry.len(), 3);

        let kept = instance("kept");
        registry.register(&kept, &def, None);
        assert_eq!(registry.len(), 1);
        assert!(registry.is_registered(&kept));
    }

    #[test]
    fn configs_are_memoized() {
        let registry = IdentityRegistry::new(16);
        let def = definition();
        let a = registry.config(&def).unwrap();
        let b = registry.config(&def).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(registry.list_config(&def).unwrap().element(), &a));
    }
}
