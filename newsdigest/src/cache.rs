use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

type Outcome<V, E> = Option<Result<V, E>>;

struct Inner<K: Hash + Eq, V, E> {
    /// Completed values, least recently used first out
    ready: LruCache<K, V>,
    /// Running computations; waiters subscribe to their outcome
    pending: HashMap<K, watch::Receiver<Outcome<V, E>>>,
}

/// Memoizing map with at most one in-flight computation per key.
///
/// Concurrent callers for a missing key share the first caller's result,
/// success or failure. Failures are not stored, so a later call retries.
/// With a capacity set, the least recently used entries are evicted first.
pub struct SingleFlight<K: Hash + Eq, V, E> {
    inner: Mutex<Inner<K, V, E>>,
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new(capacity: Option<usize>) -> Self {
        let ready = match capacity.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            inner: Mutex::new(Inner {
                ready,
                pending: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V, E>> {
        // the maps stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of completed entries.
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completed value for `key`; counts as a use for eviction order.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().ready.get(key).cloned()
    }

    /// Return the cached value for `key`, or run `compute` to produce it.
    /// `compute` runs at most once per key at a time.
    pub async fn get_or_try_insert<F, Fut>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let tx = loop {
            let mut rx = {
                let mut inner = self.lock();
                if let Some(value) = inner.ready.get(&key) {
                    return Ok(value.clone());
                }
                match inner.pending.get(&key) {
                    Some(rx) => rx.clone(),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inner.pending.insert(key.clone(), rx);
                        break tx;
                    }
                }
            };

            let shared = match rx.wait_for(Option::is_some).await {
                Ok(outcome) => (*outcome).clone(),
                // leader dropped before finishing; look again and possibly take over
                Err(_) => None,
            };
            if let Some(result) = shared {
                return result;
            }
        };

        self.lead(key, tx, compute).await
    }

    async fn lead<F, Fut>(
        &self,
        key: K,
        tx: watch::Sender<Outcome<V, E>>,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut guard = PendingGuard {
            cache: self,
            key: Some(key),
        };
        let result = compute().await;

        if let Some(key) = guard.key.take() {
            let mut inner = self.lock();
            inner.pending.remove(&key);
            if let Ok(value) = &result {
                inner.ready.put(key, value.clone());
            }
        }

        tx.send_replace(Some(result.clone()));
        result
    }
}

/// Clears a pending slot if the leading computation is dropped mid-flight,
/// so waiters and later callers do not block on a result that never comes.
struct PendingGuard<'a, K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    cache: &'a SingleFlight<K, V, E>,
    key: Option<K>,
}

impl<K, V, E> Drop for PendingGuard<'_, K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.cache.lock().pending.remove(&key);
        }
    }
}
