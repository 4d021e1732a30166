//! Deduplication of concurrent identical work
//!
//! Callers asking for the same key while a flight is running await that
//! flight's result instead of starting another. The entry is dropped once
//! the flight settles, successful or not.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::debug;

type Flight<V> = Shared<BoxFuture<'static, V>>;

/// Memoized in-flight futures keyed by `K`.
pub struct SingleFlight<K, V>
where
    V: Clone,
{
    flights: Mutex<HashMap<K, Flight<V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Run `make()` for `key`, or join the flight already running for it.
    ///
    /// `make` is only called when no flight exists for `key`.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let flight = {
            let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
            match flights.get(&key) {
                Some(existing) => {
                    debug!(key = ?key, "Joining in-flight call");
                    existing.clone()
                }
                None => {
                    let flight = make().boxed().shared();
                    flights.insert(key.clone(), flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().await;

        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if flights.get(&key).is_some_and(|current| current.ptr_eq(&flight)) {
            flights.remove(&key);
        }

        result
    }

    /// Whether a flight is currently registered for `key`.
    pub fn in_flight(&self, key: &K) -> bool {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
