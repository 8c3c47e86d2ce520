use std::fmt;
use std::sync::Arc;

use tessera_cache::{MemoCache, Resolver};
use tessera_model::{
    AdapterResult, Config, Data, Hook, Hooks, Instance, ListConfig, ListItem, ModelDefinition, ModelList,
    Reference, Reply,
};
use tessera_types::Parameters;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::entry::{CacheKey, Entry, Outcome, Target, WriteHandle};
use crate::error::{StoreError, StoreResult};
use crate::registry::IdentityRegistry;

type ModelResolver = Resolver<CacheKey, Outcome<Option<Instance>>>;
type ListResolver = Resolver<CacheKey, Outcome<ModelList>>;

struct StoreInner {
    settings: StoreConfig,
    registry: IdentityRegistry,
    models: MemoCache<CacheKey, Outcome<Option<Instance>>>,
    lists: MemoCache<CacheKey, Outcome<ModelList>>,
}

/// The model store.
///
/// Cloning yields another handle on the same caches and registry. Deferred
/// hook replies are driven on the ambient tokio runtime.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(settings: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                registry: IdentityRegistry::new(settings.registry_sweep_interval),
                settings,
                models: MemoCache::new(),
                lists: MemoCache::new(),
            }),
        }
    }

    pub fn settings(&self) -> &StoreConfig {
        &self.inner.settings
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.inner.registry
    }

    /// Compiled config of a definition. The same `Arc` is returned every time.
    pub fn config(&self, definition: &ModelDefinition) -> StoreResult<Arc<Config>> {
        self.inner.registry.config(definition)
    }

    /// The definition that produced a live instance version.
    pub fn definition_of(&self, instance: &Instance) -> Option<ModelDefinition> {
        self.inner.registry.definition_of(instance)
    }

    /// Create an instance without touching the cache.
    ///
    /// Nested id-addressed data is still written back under its own id.
    pub fn create(
        &self,
        definition: &ModelDefinition,
        data: impl Into<Data>,
        previous: Option<&Instance>,
    ) -> StoreResult<Option<Instance>> {
        let config = self.config(definition)?;
        self.create_with(&config, &data.into(), previous)
    }

    /// Create a list of `element` models without touching the cache.
    pub fn create_list(&self, element: &ModelDefinition, items: Vec<Data>) -> StoreResult<ModelList> {
        let list = self.inner.registry.list_config(element)?;
        self.create_list_with(&list, &items)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Look up one instance.
    ///
    /// Models with an `id` field are addressed by `parameters`. Models
    /// without one are singletons and reject parameters.
    pub fn get(
        &self,
        definition: &ModelDefinition,
        parameters: impl Into<Parameters>,
    ) -> StoreResult<Entry<Option<Instance>>> {
        let parameters = parameters.into();
        let config = self.config(definition)?;
        let key = cache_key(&config, &parameters)?;
        let slot = self
            .inner
            .models
            .get_or_compute(key, |resolver| self.fetch(&config, &parameters, resolver))?;
        Ok(Entry::from_slot(slot))
    }

    /// Look up a list of instances.
    pub fn get_list(
        &self,
        element: &ModelDefinition,
        parameters: impl Into<Parameters>,
    ) -> StoreResult<Entry<ModelList>> {
        let parameters = parameters.into();
        let list = self.inner.registry.list_config(element)?;
        let key = cache_key(list.element(), &parameters)?;
        let slot = self
            .inner
            .lists
            .get_or_compute(key, |resolver| self.fetch_list(&list, &parameters, resolver))?;
        Ok(Entry::from_slot(slot))
    }

    /// Force `list` into the list cache under `parameters`.
    pub fn sync_list(
        &self,
        element: &ModelDefinition,
        parameters: impl Into<Parameters>,
        list: ModelList,
    ) -> StoreResult<ModelList> {
        let config = self.inner.registry.list_config(element)?;
        let key = cache_key(config.element(), &parameters.into())?;
        debug!(key = %key, items = list.len(), "sync list");
        self.inner.lists.set(key, Ok(list.clone()), true);
        Ok(list)
    }

    /// Drop a settled cached list so the next `get_list` lists again.
    ///
    /// A list still being fetched is left alone. Returns `true` if a cached
    /// list was dropped.
    pub fn invalidate_list(
        &self,
        element: &ModelDefinition,
        parameters: impl Into<Parameters>,
    ) -> StoreResult<bool> {
        let config = self.inner.registry.list_config(element)?;
        let key = cache_key(config.element(), &parameters.into())?;
        Ok(self.inner.lists.invalidate(&key))
    }

    /// Look up one instance and wait for it to settle.
    pub async fn load(
        &self,
        definition: &ModelDefinition,
        parameters: impl Into<Parameters>,
    ) -> StoreResult<Option<Instance>> {
        self.get(definition, parameters)?.settle().await
    }

    /// Look up a list and wait for it to settle.
    pub async fn load_list(
        &self,
        element: &ModelDefinition,
        parameters: impl Into<Parameters>,
    ) -> StoreResult<ModelList> {
        self.get_list(element, parameters)?.settle().await
    }

    /// Follow a reference to the current version of the entity.
    pub fn resolve(&self, reference: &Reference) -> StoreResult<Entry<Option<Instance>>> {
        self.get(reference.definition(), reference.id())
    }

    /// Resolve one slot of a model list.
    pub fn resolve_item(&self, item: &ListItem) -> StoreResult<Entry<Option<Instance>>> {
        match item {
            ListItem::Model(instance) => Ok(Entry::Ready(Some(instance.clone()))),
            ListItem::Ref(reference) => self.resolve(reference),
        }
    }

    fn fetch(
        &self,
        config: &Arc<Config>,
        parameters: &Parameters,
        resolver: ModelResolver,
    ) -> StoreResult<()> {
        debug!(key = %resolver.key(), model = config.definition().name(), "cache miss");
        let connection = match config.hooks() {
            Hooks::Local => {
                let instance = if config.is_external() {
                    None
                } else {
                    self.create_with(config, &Data::empty(), None)?
                };
                resolver.resolve(Ok(instance));
                return Ok(());
            }
            Hooks::Connected(connection) => connection,
        };
        let hook = connection
            .get_hook()
            .ok_or_else(|| StoreError::ReadUnsupported(config.definition().name().into()))?;

        match hook(parameters) {
            Reply::Ready(result) => {
                let instance = self.finish_get(config, result)?;
                resolver.resolve(Ok(instance));
            }
            Reply::Deferred(future) => {
                let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
                let store = self.clone();
                let config = Arc::clone(config);
                runtime.spawn(async move {
                    let outcome = store.finish_get(&config, future.await);
                    resolver.resolve(outcome);
                });
            }
        }
        Ok(())
    }

    fn finish_get(
        &self,
        config: &Arc<Config>,
        result: AdapterResult<Option<Data>>,
    ) -> Outcome<Option<Instance>> {
        match result {
            Ok(Some(data)) => self.create_with(config, &data, None),
            Ok(None) => Ok(None),
            Err(error) => {
                warn!(model = config.definition().name(), %error, "get hook failed");
                Err(StoreError::adapter(Hook::Get, error))
            }
        }
    }

    fn fetch_list(
        &self,
        list: &Arc<ListConfig>,
        parameters: &Parameters,
        resolver: ListResolver,
    ) -> StoreResult<()> {
        let element = list.element();
        debug!(key = %resolver.key(), model = element.definition().name(), "list cache miss");
        let connection = match element.hooks() {
            Hooks::Local => {
                let items = self.cached_items(element, parameters)?;
                let list = self.create_list_with(list, &items)?;
                resolver.resolve(Ok(list));
                return Ok(());
            }
            Hooks::Connected(connection) => connection,
        };
        let hook = connection
            .list_hook()
            .ok_or_else(|| StoreError::ListUnsupported(element.definition().name().into()))?;

        match hook(parameters) {
            Reply::Ready(result) => {
                let items = self.finish_list(list, result)?;
                resolver.resolve(Ok(items));
            }
            Reply::Deferred(future) => {
                let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
                let store = self.clone();
                let list = Arc::clone(list);
                runtime.spawn(async move {
                    let outcome = store.finish_list(&list, future.await);
                    resolver.resolve(outcome);
                });
            }
        }
        Ok(())
    }

    fn finish_list(
        &self,
        list: &ListConfig,
        result: AdapterResult<Vec<Data>>,
    ) -> Outcome<ModelList> {
        match result {
            Ok(items) => self.create_list_with(list, &items),
            Err(error) => {
                warn!(model = list.definition().name(), %error, "list hook failed");
                Err(StoreError::adapter(Hook::List, error))
            }
        }
    }

    /// Items for listing a model that has no list hook: every live cached
    /// entity of the definition, ordered by id.
    fn cached_items(&self, element: &Config, parameters: &Parameters) -> StoreResult<Vec<Data>> {
        let name = element.definition().name();
        if !self.inner.settings.list_fallback {
            return Err(StoreError::ListUnsupported(name.into()));
        }
        if !parameters.is_none() {
            return Err(StoreError::ParametersNotSupported(name.into()));
        }
        let definition = element.definition().id();
        let mut entries = self
            .inner
            .models
            .entries(|key| key.definition == definition);
        entries.sort_by(|(a, _), (b, _)| a.id.cmp(&b.id));
        Ok(entries
            .into_iter()
            .filter_map(|(_, outcome)| outcome.ok().flatten())
            .map(|instance| match instance.id() {
                Some(id) if element.is_external() => Data::from(id),
                _ => Data::Model(instance),
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Create, update or delete an entity.
    ///
    /// With a definition target a new instance is created (for singletons,
    /// the singleton is replaced). With an instance target that version is
    /// updated; `Data::Null` deletes it. Argument errors and synchronous hook
    /// failures are returned here. The handle settles with the stored
    /// instance, or `None` after a deletion.
    pub fn set(
        &self,
        target: impl Into<Target>,
        values: impl Into<Data>,
    ) -> StoreResult<WriteHandle<Option<Instance>>> {
        let values = values.into();
        let (definition, previous) = match target.into() {
            Target::Definition(definition) => (definition, None),
            Target::Instance(instance) => {
                let definition = self
                    .definition_of(&instance)
                    .ok_or(StoreError::UnregisteredInstance)?;
                (definition, Some(instance))
            }
        };
        let config = self.config(&definition)?;
        let hook = match config.hooks() {
            Hooks::Local => None,
            Hooks::Connected(connection) => Some(
                connection
                    .set_hook()
                    .ok_or_else(|| StoreError::WriteUnsupported(definition.name().into()))?,
            ),
        };

        // The previous version stays registered until the write is stored, so
        // a failed write can be retried on it.
        let candidate = self.create_candidate(&config, &values, previous.as_ref())?;
        let write_id = candidate
            .as_ref()
            .or(previous.as_ref())
            .and_then(Instance::id)
            .map(str::to_owned);
        debug!(
            model = definition.name(),
            id = write_id.as_deref().unwrap_or("-"),
            delete = candidate.is_none(),
            "write"
        );

        let Some(hook) = hook else {
            return Ok(WriteHandle::done(
                self.finish_set(&config, write_id, previous, candidate, Ok(None)),
            ));
        };
        let hook_id = previous.as_ref().and(write_id.as_deref());
        match hook(hook_id, candidate.as_ref()) {
            Reply::Ready(Err(error)) => {
                warn!(model = definition.name(), %error, "set hook failed");
                Err(StoreError::adapter(Hook::Set, error))
            }
            Reply::Ready(result) => Ok(WriteHandle::done(
                self.finish_set(&config, write_id, previous, candidate, result),
            )),
            Reply::Deferred(future) => {
                let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
                let (tx, rx) = oneshot::channel();
                let store = self.clone();
                runtime.spawn(async move {
                    let result = future.await;
                    if let Err(error) = &result {
                        warn!(model = config.definition().name(), %error, "set hook failed");
                    }
                    let _ = tx.send(store.finish_set(&config, write_id, previous, candidate, result));
                });
                Ok(WriteHandle::waiting(rx))
            }
        }
    }

    fn finish_set(
        &self,
        config: &Arc<Config>,
        write_id: Option<String>,
        previous: Option<Instance>,
        candidate: Option<Instance>,
        result: AdapterResult<Option<Data>>,
    ) -> StoreResult<Option<Instance>> {
        let stored = match result.map_err(|error| StoreError::adapter(Hook::Set, error))? {
            // Reply data is applied on top of the local write. Updates keep
            // their id; only creations take an id from the reply.
            Some(data) => {
                let base = previous.as_ref().map(|p| candidate.as_ref().unwrap_or(p));
                self.create_with(config, &data, base)?
            }
            None => candidate,
        };
        if let Some(previous) = &previous {
            self.retire_superseded(previous, stored.as_ref());
        }
        let id = stored
            .as_ref()
            .and_then(Instance::id)
            .map(str::to_owned)
            .or(write_id);
        self.write_back(config, id, stored.clone());
        Ok(stored)
    }

    /// Force `instance` into the cache under `(definition, id)`.
    ///
    /// `None` records a tombstone: later reads see "not found" without
    /// calling the get hook.
    pub fn sync(
        &self,
        definition: &ModelDefinition,
        id: Option<&str>,
        instance: Option<Instance>,
    ) -> StoreResult<Option<Instance>> {
        let config = self.config(definition)?;
        Ok(self.write_back(&config, id.map(str::to_owned), instance))
    }

    pub(crate) fn write_back(
        &self,
        config: &Config,
        id: Option<String>,
        instance: Option<Instance>,
    ) -> Option<Instance> {
        let key = CacheKey::new(config.definition().id(), id);
        debug!(key = %key, tombstone = instance.is_none(), "sync");
        self.inner.models.set(key, Ok(instance.clone()), true);
        instance
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("settings", &self.inner.settings)
            .field("registry", &self.inner.registry)
            .field("models", &self.inner.models)
            .field("lists", &self.inner.lists)
            .finish()
    }
}

fn cache_key(config: &Config, parameters: &Parameters) -> StoreResult<CacheKey> {
    let definition = config.definition();
    if !config.is_external() && !parameters.is_none() {
        return Err(StoreError::ParametersNotSupported(definition.name().into()));
    }
    Ok(CacheKey::new(definition.id(), parameters.canonical_id()?))
}
