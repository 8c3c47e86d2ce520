use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tessera_cache::{CacheError, Pending, Slot};
use tessera_model::{DefinitionId, Instance, ModelDefinition};
use tokio::sync::oneshot;

use crate::error::{StoreError, StoreResult};

/// Cache address of one entity (or one list) of a definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub definition: DefinitionId,
    pub id: Option<String>,
}

impl CacheKey {
    pub fn new(definition: DefinitionId, id: Option<String>) -> Self {
        Self { definition, id }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{}", self.definition, id),
            None => write!(f, "{}", self.definition),
        }
    }
}

pub(crate) type Outcome<T> = Result<T, StoreError>;

/// What a read returns.
#[derive(Clone, Debug)]
pub enum Entry<T> {
    /// The value is settled. `None` inside a model entry means not found
    /// or deleted.
    Ready(T),
    /// A deferred hook call is still running.
    Pending(PendingEntry<T>),
    /// The deferred hook call failed. The failure stays cached.
    Failed(StoreError),
}

impl<T: Clone> Entry<T> {
    pub(crate) fn from_slot(slot: Slot<Outcome<T>>) -> Self {
        match slot {
            Slot::Ready(Ok(value)) => Self::Ready(value),
            Slot::Ready(Err(error)) => Self::Failed(error),
            Slot::Pending(pending) => Self::Pending(PendingEntry { pending }),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&StoreError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Wait for the entry to settle.
    pub async fn settle(self) -> StoreResult<T> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Failed(error) => Err(error),
            Self::Pending(pending) => pending.wait().await,
        }
    }
}

impl Entry<Option<Instance>> {
    /// The settled instance, if there is one.
    pub fn instance(&self) -> Option<&Instance> {
        self.value().and_then(Option::as_ref)
    }
}

/// A read waiting on a deferred hook call.
#[derive(Clone, Debug)]
pub struct PendingEntry<T> {
    pending: Pending<Outcome<T>>,
}

impl<T: Clone> PendingEntry<T> {
    /// The outcome, if the call has settled since this entry was handed out.
    pub fn peek(&self) -> Option<StoreResult<T>> {
        self.pending.peek()
    }

    pub async fn wait(self) -> StoreResult<T> {
        self.pending.wait().await?
    }
}

/// What a write applies to.
#[derive(Clone, Debug)]
pub enum Target {
    /// Create a new entity, or replace a singleton.
    Definition(ModelDefinition),
    /// Update or delete the entity this instance is a version of.
    Instance(Instance),
}

impl From<ModelDefinition> for Target {
    fn from(definition: ModelDefinition) -> Self {
        Self::Definition(definition)
    }
}

impl From<&ModelDefinition> for Target {
    fn from(definition: &ModelDefinition) -> Self {
        Self::Definition(definition.clone())
    }
}

impl From<Instance> for Target {
    fn from(instance: Instance) -> Self {
        Self::Instance(instance)
    }
}

impl From<&Instance> for Target {
    fn from(instance: &Instance) -> Self {
        Self::Instance(instance.clone())
    }
}

enum WriteState<T> {
    Done(Option<StoreResult<T>>),
    Waiting(oneshot::Receiver<StoreResult<T>>),
}

/// Settles once a write has been stored.
///
/// Writes answered synchronously are already settled when `set` returns, and
/// their effects are visible in the cache right away.
pub struct WriteHandle<T> {
    state: WriteState<T>,
}

impl<T> WriteHandle<T> {
    pub(crate) fn done(result: StoreResult<T>) -> Self {
        Self {
            state: WriteState::Done(Some(result)),
        }
    }

    pub(crate) fn waiting(rx: oneshot::Receiver<StoreResult<T>>) -> Self {
        Self {
            state: WriteState::Waiting(rx),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.state, WriteState::Done(_))
    }
}

impl<T> Unpin for WriteHandle<T> {}

impl<T> Future for WriteHandle<T> {
    type Output = StoreResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            WriteState::Done(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or(Err(StoreError::Cache(CacheError::Abandoned))),
            ),
            WriteState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(StoreError::Cache(CacheError::Abandoned)))),
        }
    }
}

impl<T> fmt::Debug for WriteHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteHandle")
            .field("settled", &self.is_settled())
            .finish()
    }
}
