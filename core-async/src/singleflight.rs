//! Keyed coalescing of concurrent identical operations.
//!
//! A [`SingleFlight`] keeps a registry of in-flight futures keyed by an
//! arbitrary key. The first caller for a key becomes the leader and its future
//! is registered as a shared future; every caller arriving while it is pending
//! awaits the same shared future and observes the same output.
//!
//! The registry entry is released when the flight completes (success or
//! failure) or when the last waiter is dropped. Cancelling one waiter while
//! others still await leaves the flight registered.
//!
//! The registry lock is a `std::sync::Mutex` and is never held across an
//! `.await`.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Flight<V> = Shared<BoxFuture<'static, V>>;
type Registry<K, V> = Arc<Mutex<HashMap<K, Entry<V>>>>;

struct Entry<V> {
    id: u64,
    flight: Flight<V>,
    waiters: usize,
}

/// Registry of pending operations, one per key.
pub struct SingleFlight<K, V> {
    inflight: Registry<K, V>,
    next_id: AtomicU64,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Runs `operation` for `key` unless a flight for the same key is already
    /// pending, in which case the pending flight's output is returned.
    ///
    /// `operation` is only invoked by the leader.
    pub async fn run<F, Fut>(&self, key: K, operation: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (id, flight) = {
            let mut registry = lock(&self.inflight);
            let entry = registry.entry(key.clone()).or_insert_with(|| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let registry = Arc::clone(&self.inflight);
                let flight_key = key.clone();
                let pending = operation();
                let flight = async move {
                    let output = pending.await;
                    release(&registry, &flight_key, id);
                    output
                }
                .boxed()
                .shared();
                Entry {
                    id,
                    flight,
                    waiters: 0,
                }
            });
            entry.waiters += 1;
            (entry.id, entry.flight.clone())
        };

        let _guard = WaiterGuard {
            registry: Arc::clone(&self.inflight),
            key,
            id,
        };

        flight.await
    }

    /// Returns `true` while a flight for `key` is pending.
    pub fn is_in_flight(&self, key: &K) -> bool {
        lock(&self.inflight).contains_key(key)
    }

    /// Number of keys with a pending flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.inflight).len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = lock(&self.inflight).len();
        f.debug_struct("SingleFlight")
            .field("pending", &pending)
            .finish()
    }
}

/// Drops one waiter from a flight; the last waiter out removes the entry.
///
/// Entries are matched by flight id, so a newer flight registered under the
/// same key is left alone.
struct WaiterGuard<K: Eq + Hash, V> {
    registry: Registry<K, V>,
    key: K,
    id: u64,
}

impl<K: Eq + Hash, V> Drop for WaiterGuard<K, V> {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        let last = match registry.get_mut(&self.key) {
            Some(entry) if entry.id == self.id => {
                entry.waiters = entry.waiters.saturating_sub(1);
                entry.waiters == 0
            }
            _ => false,
        };
        if last {
            registry.remove(&self.key);
        }
    }
}

fn release<K: Eq + Hash, V>(registry: &Mutex<HashMap<K, Entry<V>>>, key: &K, id: u64) {
    let mut registry = lock(registry);
    if registry.get(key).is_some_and(|entry| entry.id == id) {
        registry.remove(key);
    }
}

fn lock<K, V>(registry: &Mutex<HashMap<K, V>>) -> MutexGuard<'_, HashMap<K, V>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[crate::test]
    async fn concurrent_callers_share_one_execution() {
        let flights: Arc<SingleFlight<String, usize>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut waiters = Vec::new();
        for _ in 0..10 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            waiters.push(async move {
                flights
                    .run("key".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        7
                    })
                    .await
            });
        }

        let results = futures::future::join_all(waiters).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|value| *value == 7));
        assert_eq!(flights.in_flight_count(), 0);
    }

    #[crate::test]
    async fn distinct_keys_run_independently() {
        let flights: SingleFlight<&'static str, u32> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = {
            let calls = Arc::clone(&calls);
            flights.run("a", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                1
            })
        };
        let b = {
            let calls = Arc::clone(&calls);
            flights.run("b", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                2
            })
        };

        let (a, b) = futures::join!(a, b);
        assert_eq!((a, b), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[crate::test]
    async fn entry_released_after_failure() {
        let flights: SingleFlight<u8, Result<u8, String>> = SingleFlight::new();

        let first = flights
            .run(1, || async { Err::<u8, String>("boom".into()) })
            .await;
        assert!(first.is_err());
        assert!(!flights.is_in_flight(&1));

        let second = flights.run(1, || async { Ok::<u8, String>(9) }).await;
        assert_eq!(second, Ok(9));
    }

    #[crate::test]
    async fn cancelled_waiter_keeps_flight_for_others() {
        let flights: Arc<SingleFlight<u8, u8>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let start = |flights: Arc<SingleFlight<u8, u8>>, calls: Arc<AtomicUsize>| async move {
            flights
                .run(5, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    4
                })
                .await
        };

        let survivor = tokio::spawn(start(Arc::clone(&flights), Arc::clone(&calls)));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let cancelled = tokio::time::timeout(
            Duration::from_millis(5),
            start(Arc::clone(&flights), Arc::clone(&calls)),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(flights.is_in_flight(&5));

        let late = start(Arc::clone(&flights), Arc::clone(&calls)).await;

        assert_eq!(late, 4);
        assert_eq!(survivor.await.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flights.is_in_flight(&5));
    }

    #[crate::test]
    async fn entry_released_when_waiter_cancelled() {
        let flights: SingleFlight<u8, u8> = SingleFlight::new();

        let pending = flights.run(3, || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            0
        });
        let outcome = tokio::time::timeout(Duration::from_millis(10), pending).await;

        assert!(outcome.is_err());
        assert!(!flights.is_in_flight(&3));
    }
}
