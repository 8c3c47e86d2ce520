//! Storage hooks backing a model.
//!
//! A [`Connection`] bundles up to three hooks: `get` one entity, `set` (write
//! or delete) one entity, and `list` many. A hook answers either right away
//! ([`Reply::Ready`]) or with a future ([`Reply::Deferred`]). Adapters that are
//! naturally async implement [`StorageAdapter`] and are wrapped with
//! [`Connection::from_adapter`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_types::{BoxFuture, Parameters};

use crate::data::Data;
use crate::error::{AdapterError, AdapterResult};
use crate::instance::Instance;

/// Which hook a call went through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    Get,
    Set,
    List,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::List => "list",
        })
    }
}

/// The answer of a hook.
pub enum Reply<T> {
    Ready(AdapterResult<T>),
    Deferred(BoxFuture<AdapterResult<T>>),
}

impl<T> Reply<T> {
    pub fn ready(value: T) -> Self {
        Self::Ready(Ok(value))
    }

    pub fn fail(error: impl Into<AdapterError>) -> Self {
        Self::Ready(Err(error.into()))
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = AdapterResult<T>> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl<T> From<AdapterResult<T>> for Reply<T> {
    fn from(result: AdapterResult<T>) -> Self {
        Self::Ready(result)
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(Ok(_)) => f.write_str("Reply::Ready(Ok(..))"),
            Self::Ready(Err(e)) => write!(f, "Reply::Ready(Err({e}))"),
            Self::Deferred(_) => f.write_str("Reply::Deferred(..)"),
        }
    }
}

/// Fetch one entity. `None` means not found.
pub type GetHook = Arc<dyn Fn(&Parameters) -> Reply<Option<Data>> + Send + Sync>;

/// Write one entity. The id is present when an existing entity is updated;
/// the instance is `None` for a deletion. A `None` reply keeps the local
/// candidate as the stored value.
pub type SetHook =
    Arc<dyn Fn(Option<&str>, Option<&Instance>) -> Reply<Option<Data>> + Send + Sync>;

/// Fetch many entities.
pub type ListHook = Arc<dyn Fn(&Parameters) -> Reply<Vec<Data>> + Send + Sync>;

/// Async storage backend.
///
/// Every call is deferred when wrapped into a [`Connection`]. Backends that
/// cannot write or list should report an [`AdapterError`].
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn get(&self, parameters: Parameters) -> AdapterResult<Option<Data>>;

    async fn set(&self, id: Option<String>, instance: Option<Instance>)
        -> AdapterResult<Option<Data>>;

    async fn list(&self, parameters: Parameters) -> AdapterResult<Vec<Data>>;
}

/// The hooks attached to a model definition.
#[derive(Clone, Default)]
pub struct Connection {
    get: Option<GetHook>,
    set: Option<SetHook>,
    list: Option<ListHook>,
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Parameters) -> Reply<Option<Data>> + Send + Sync + 'static,
    {
        self.get = Some(Arc::new(hook));
        self
    }

    pub fn set<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&str>, Option<&Instance>) -> Reply<Option<Data>> + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(hook));
        self
    }

    pub fn list<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Parameters) -> Reply<Vec<Data>> + Send + Sync + 'static,
    {
        self.list = Some(Arc::new(hook));
        self
    }

    /// Route all three hooks through an async adapter.
    pub fn from_adapter<A>(adapter: Arc<A>) -> Self
    where
        A: StorageAdapter + 'static,
    {
        let getter = Arc::clone(&adapter);
        let setter = Arc::clone(&adapter);
        Self::new()
            .get(move |parameters| {
                let adapter = Arc::clone(&getter);
                let parameters = parameters.clone();
                Reply::deferred(async move { adapter.get(parameters).await })
            })
            .set(move |id, instance| {
                let adapter = Arc::clone(&setter);
                let id = id.map(str::to_owned);
                let instance = instance.cloned();
                Reply::deferred(async move { adapter.set(id, instance).await })
            })
            .list(move |parameters| {
                let adapter = Arc::clone(&adapter);
                let parameters = parameters.clone();
                Reply::deferred(async move { adapter.list(parameters).await })
            })
    }

    pub fn get_hook(&self) -> Option<&GetHook> {
        self.get.as_ref()
    }

    pub fn set_hook(&self) -> Option<&SetHook> {
        self.set.as_ref()
    }

    pub fn list_hook(&self) -> Option<&ListHook> {
        self.list.as_ref()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .field("list", &self.list.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageAdapter for Recording {
        async fn get(&self, parameters: Parameters) -> AdapterResult<Option<Data>> {
            let id = parameters.canonical_id().ok().flatten().unwrap_or_default();
            self.calls.lock().unwrap().push(format!("get {id}"));
            Ok(Some(Data::object([("id", Data::from(id))])))
        }

        async fn set(
            &self,
            id: Option<String>,
            instance: Option<Instance>,
        ) -> AdapterResult<Option<Data>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("set {:?} {}", id, instance.is_some()));
            Ok(None)
        }

        async fn list(&self, _parameters: Parameters) -> AdapterResult<Vec<Data>> {
            Err(AdapterError::new("listing is not available"))
        }
    }

    #[test]
    fn builder_only_installs_given_hooks() {
        let connection = Connection::new().get(|_| Reply::ready(None));
        assert!(connection.get_hook().is_some());
        assert!(connection.set_hook().is_none());
        assert!(connection.list_hook().is_none());
    }

    #[test]
    fn ready_replies() {
        let connection = Connection::new().list(|_| Reply::fail("offline"));
        let hook = connection.list_hook().unwrap();
        match hook(&Parameters::None) {
            Reply::Ready(Err(e)) => assert_eq!(e.message(), "offline"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn adapter_calls_are_deferred() {
        let adapter = Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
        });
        let connection = Connection::from_adapter(Arc::clone(&adapter));

        let reply = connection.get_hook().unwrap()(&Parameters::from("7"));
        let Reply::Deferred(future) = reply else {
            panic!("expected a deferred reply");
        };
        let data = future.await.unwrap().unwrap();
        assert_eq!(data.get("id").and_then(Data::as_str), Some("7"));

        let Reply::Deferred(future) = connection.set_hook().unwrap()(Some("7"), None) else {
            panic!("expected a deferred reply");
        };
        assert!(future.await.unwrap().is_none());

        let Reply::Deferred(future) = connection.list_hook().unwrap()(&Parameters::None) else {
            panic!("expected a deferred reply");
        };
        assert!(future.await.is_err());

        assert_eq!(
            *adapter.calls.lock().unwrap(),
            vec!["get 7".to_string(), "set Some(\"7\") false".to_string()]
        );
    }
}
