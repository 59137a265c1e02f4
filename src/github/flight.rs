// In-flight request registry.
// Collapses concurrent fetches for the same cache key into one operation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tracing::debug;

type SharedFlight<T> = Shared<BoxFuture<'static, T>>;

/// Registry mapping a cache key to its pending fetch. An entry exists
/// exactly while the fetch is outstanding; its presence is the only
/// deduplication signal. Flights are tagged with an id so a late finisher
/// never removes a newer flight registered under the same key.
pub struct FlightMap<T> {
    pending: Mutex<HashMap<String, (u64, SharedFlight<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for FlightMap<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> FlightMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fetch` under the given key, or join the flight already running
    /// there. At most one instance of `fetch` is in the air per key; every
    /// concurrent caller observes that single flight's result.
    pub async fn run<F>(&self, key: &str, fetch: F) -> T
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (id, flight) = {
            let mut pending = self.pending.lock().await;
            match pending.get(key) {
                Some((id, flight)) => {
                    debug!(key, "joining in-flight request");
                    (*id, flight.clone())
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let flight = fetch.boxed().shared();
                    pending.insert(key.to_string(), (id, flight.clone()));
                    (id, flight)
                }
            }
        };

        let result = flight.await;

        // Whoever finishes first deregisters the flight, success or
        // failure alike.
        let mut pending = self.pending.lock().await;
        if pending.get(key).is_some_and(|(current, _)| *current == id) {
            pending.remove(key);
        }

        result
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}
