use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// The state of one cache key.
#[derive(Clone, Debug)]
pub enum Slot<V> {
    /// A settled value.
    Ready(V),
    /// A computation that has started but not settled.
    Pending(Pending<V>),
}

impl<V> Slot<V> {
    /// Returns `true` if the slot holds a settled value.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The settled value, if any.
    pub fn ready(&self) -> Option<&V> {
        match self {
            Self::Ready(v) => Some(v),
            Self::Pending(_) => None,
        }
    }
}

/// A handle on an unsettled computation.
///
/// Cloning is cheap; every clone observes the same settlement.
#[derive(Clone)]
pub struct Pending<V> {
    token: u64,
    rx: watch::Receiver<Option<V>>,
}

impl<V: Clone> Pending<V> {
    /// The settled value, if the computation has finished in the meantime.
    pub fn peek(&self) -> Option<V> {
        self.rx.borrow().clone()
    }

    /// Wait until the computation settles.
    pub async fn wait(mut self) -> CacheResult<V> {
        let settled = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CacheError::Abandoned)?;
        settled.clone().ok_or(CacheError::Abandoned)
    }
}

impl<V> fmt::Debug for Pending<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("token", &self.token).finish()
    }
}

struct Shared<K, V> {
    slots: RwLock<HashMap<K, Slot<V>>>,
    next_token: AtomicU64,
}

impl<K: Eq + Hash, V> Shared<K, V> {
    fn store(&self, key: K, slot: Slot<V>) {
        self.slots.write().expect("cache lock poisoned").insert(key, slot);
    }
}

/// Settles the computation started by a cache miss.
///
/// Handed to the compute function of [`MemoCache::get_or_compute`]. It may be
/// settled right away or moved into a task and settled later.
pub struct Resolver<K: Eq + Hash, V> {
    shared: Arc<Shared<K, V>>,
    key: K,
    token: u64,
    tx: Option<watch::Sender<Option<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Resolver<K, V> {
    /// The key this resolver settles.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Store the value and wake every waiter.
    pub fn resolve(mut self, value: V) {
        self.shared.store(self.key.clone(), Slot::Ready(value.clone()));
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(value));
        }
    }
}

impl<K: Eq + Hash, V> Drop for Resolver<K, V> {
    fn drop(&mut self) {
        if self.tx.is_none() {
            return;
        }
        let mut slots = self.shared.slots.write().expect("cache lock poisoned");
        let ours = matches!(
            slots.get(&self.key),
            Some(Slot::Pending(p)) if p.token == self.token
        );
        if ours {
            slots.remove(&self.key);
            debug!(token = self.token, "released abandoned cache slot");
        }
    }
}

/// In-memory, single-flight memoization cache.
///
/// Cloning yields another handle on the same slots.
pub struct MemoCache<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: RwLock::new(HashMap::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Return the slot for `key`, computing it on a miss.
    ///
    /// On a miss a pending slot is installed before `compute` runs, so any
    /// lookup made while computing (including re-entrant ones) sees it. The
    /// returned slot is `Ready` when `compute` settled synchronously. If
    /// `compute` fails its error is returned and the slot is released.
    pub fn get_or_compute<E, F>(&self, key: K, compute: F) -> Result<Slot<V>, E>
    where
        F: FnOnce(Resolver<K, V>) -> Result<(), E>,
    {
        if let Some(slot) = self.peek(&key) {
            return Ok(slot);
        }

        let (resolver, pending) = {
            let mut slots = self.shared.slots.write().expect("cache lock poisoned");
            if let Some(slot) = slots.get(&key) {
                return Ok(slot.clone());
            }
            let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = watch::channel(None);
            let pending = Pending { token, rx };
            slots.insert(key.clone(), Slot::Pending(pending.clone()));
            let resolver = Resolver {
                shared: Arc::clone(&self.shared),
                key: key.clone(),
                token,
                tx: Some(tx),
            };
            (resolver, pending)
        };

        compute(resolver)?;

        Ok(self.peek(&key).unwrap_or(Slot::Pending(pending)))
    }

    /// Return the slot for `key` without computing anything.
    pub fn peek(&self, key: &K) -> Option<Slot<V>> {
        self.shared
            .slots
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Store `value` under `key`.
    ///
    /// An existing slot is only replaced when `force` is set. Returns `true`
    /// if the value was written.
    pub fn set(&self, key: K, value: V, force: bool) -> bool {
        let mut slots = self.shared.slots.write().expect("cache lock poisoned");
        if !force && slots.contains_key(&key) {
            return false;
        }
        slots.insert(key, Slot::Ready(value));
        true
    }

    /// Drop the settled value under `key` so the next lookup computes again.
    ///
    /// A pending slot is left in place. Returns `true` if a value was dropped.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut slots = self.shared.slots.write().expect("cache lock poisoned");
        if !matches!(slots.get(key), Some(Slot::Ready(_))) {
            return false;
        }
        slots.remove(key);
        true
    }

    /// All settled entries whose key passes `filter`.
    pub fn entries<F>(&self, filter: F) -> Vec<(K, V)>
    where
        F: Fn(&K) -> bool,
    {
        self.shared
            .slots
            .read()
            .expect("cache lock poisoned")
            .iter()
            .filter(|(key, _)| filter(*key))
            .filter_map(|(key, slot)| slot.ready().map(|v| (key.clone(), v.clone())))
            .collect()
    }

    /// Number of slots, settled or pending.
    pub fn len(&self) -> usize {
        self.shared.slots.read().expect("cache lock poisoned").len()
    }

    /// Returns `true` if the cache holds no slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Clone for MemoCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Default for MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for MemoCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.shared.slots.read().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("MemoCache")
            .field("slot_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Cache = MemoCache<String, u32>;

    fn key(s: &str) -> String {
        s.to_string()
    }

    // -----------------------------------------------------------------------
    // Synchronous computation
    // -----------------------------------------------------------------------

    #[test]
    fn miss_computes_and_stores() {
        let cache = Cache::new();
        let slot = cache
            .get_or_compute(key("a"), |r| {
                r.resolve(7);
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(slot.ready(), Some(&7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hit_does_not_recompute() {
        let cache = Cache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let slot = cache
                .get_or_compute(key("a"), |r| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    r.resolve(1);
                    Ok::<_, ()>(())
                })
                .unwrap();
            assert!(slot.is_ready());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_compute_releases_slot() {
        let cache = Cache::new();
        let err = cache
            .get_or_compute(key("a"), |_r| Err("boom"))
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(cache.is_empty());

        let slot = cache
            .get_or_compute(key("a"), |r| {
                r.resolve(2);
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(slot.ready(), Some(&2));
    }

    #[test]
    fn invalidated_values_are_recomputed() {
        let cache = Cache::new();
        cache.set(key("a"), 1, false);
        assert!(cache.invalidate(&key("a")));
        assert!(!cache.invalidate(&key("a")));

        let slot = cache
            .get_or_compute(key("a"), |r| {
                r.resolve(2);
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(slot.ready(), Some(&2));
    }

    #[test]
    fn pending_slots_survive_invalidation() {
        let cache = Cache::new();
        let mut parked = None;
        cache
            .get_or_compute(key("a"), |r| {
                parked = Some(r);
                Ok::<_, ()>(())
            })
            .unwrap();
        assert!(!cache.invalidate(&key("a")));
        parked.take().unwrap().resolve(4);
        assert_eq!(cache.peek(&key("a")).unwrap().ready(), Some(&4));
    }

    // -----------------------------------------------------------------------
    // Deferred computation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pending_slot_is_shared_until_settled() {
        let cache = Cache::new();
        let mut parked = None;
        let first = cache
            .get_or_compute(key("a"), |r| {
                parked = Some(r);
                Ok::<_, ()>(())
            })
            .unwrap();
        assert!(!first.is_ready());

        let second = cache
            .get_or_compute(key("a"), |_r| -> Result<(), ()> {
                panic!("must not recompute while pending")
            })
            .unwrap();
        let Slot::Pending(waiting) = second else {
            panic!("expected pending slot");
        };

        let waiter = tokio::spawn(waiting.wait());
        parked.take().unwrap().resolve(9);

        assert_eq!(waiter.await.unwrap().unwrap(), 9);
        assert_eq!(cache.peek(&key("a")).unwrap().ready(), Some(&9));
    }

    #[tokio::test]
    async fn resolving_from_a_task() {
        let cache = Cache::new();
        let slot = cache
            .get_or_compute(key("a"), |r| {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    r.resolve(5);
                });
                Ok::<_, ()>(())
            })
            .unwrap();
        let Slot::Pending(pending) = slot else {
            panic!("expected pending slot");
        };
        assert_eq!(pending.wait().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn dropped_resolver_abandons_waiters() {
        let cache = Cache::new();
        let slot = cache
            .get_or_compute(key("a"), |r| {
                drop(r);
                Ok::<_, ()>(())
            })
            .unwrap();
        let Slot::Pending(pending) = slot else {
            panic!("expected pending slot");
        };
        assert_eq!(pending.wait().await, Err(CacheError::Abandoned));
        assert!(cache.peek(&key("a")).is_none());
    }

    #[test]
    fn peek_on_pending_sees_settlement() {
        let cache = Cache::new();
        let mut parked = None;
        let slot = cache
            .get_or_compute(key("a"), |r| {
                parked = Some(r);
                Ok::<_, ()>(())
            })
            .unwrap();
        let Slot::Pending(pending) = slot else {
            panic!("expected pending slot");
        };
        assert_eq!(pending.peek(), None);
        parked.take().unwrap().resolve(3);
        assert_eq!(pending.peek(), Some(3));
    }

    // -----------------------------------------------------------------------
    // Explicit writes
    // -----------------------------------------------------------------------

    #[test]
    fn set_respects_force() {
        let cache = Cache::new();
        assert!(cache.set(key("a"), 1, false));
        assert!(!cache.set(key("a"), 2, false));
        assert_eq!(cache.peek(&key("a")).unwrap().ready(), Some(&1));
        assert!(cache.set(key("a"), 3, true));
        assert_eq!(cache.peek(&key("a")).unwrap().ready(), Some(&3));
    }

    #[test]
    fn late_settlement_overwrites_forced_write() {
        let cache = Cache::new();
        let mut parked = None;
        cache
            .get_or_compute(key("a"), |r| {
                parked = Some(r);
                Ok::<_, ()>(())
            })
            .unwrap();
        cache.set(key("a"), 10, true);
        parked.take().unwrap().resolve(20);
        assert_eq!(cache.peek(&key("a")).unwrap().ready(), Some(&20));
    }

    #[test]
    fn dropped_resolver_keeps_newer_write() {
        let cache = Cache::new();
        let mut parked = None;
        cache
            .get_or_compute(key("a"), |r| {
                parked = Some(r);
                Ok::<_, ()>(())
            })
            .unwrap();
        cache.set(key("a"), 10, true);
        drop(parked.take());
        assert_eq!(cache.peek(&key("a")).unwrap().ready(), Some(&10));
    }

    // -----------------------------------------------------------------------
    // Enumeration
    // -----------------------------------------------------------------------

    #[test]
    fn entries_filters_and_skips_pending() {
        let cache = Cache::new();
        cache.set(key("user:1"), 1, true);
        cache.set(key("user:2"), 2, true);
        cache.set(key("post:1"), 3, true);
        let mut parked = None;
        cache
            .get_or_compute(key("user:3"), |r| {
                parked = Some(r);
                Ok::<_, ()>(())
            })
            .unwrap();

        let mut users = cache.entries(|k| k.starts_with("user:"));
        users.sort();
        assert_eq!(users, vec![(key("user:1"), 1), (key("user:2"), 2)]);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn concurrent_misses_compute_once() {
        use std::thread;

        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache
                        .get_or_compute(key("shared"), |r| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            r.resolve(42);
                            Ok::<_, ()>(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek(&key("shared")).unwrap().ready(), Some(&42));
    }

    #[test]
    fn debug_format() {
        let cache = Cache::new();
        cache.set(key("x"), 1, true);
        let debug = format!("{cache:?}");
        assert!(debug.contains("MemoCache"));
        assert!(debug.contains("slot_count"));
    }
}
