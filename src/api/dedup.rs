//! In-flight request deduplication
//!
//! Concurrent callers asking for the same key share one underlying request.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

type SharedRequest<T> = Shared<BoxFuture<'static, T>>;

pub struct RequestDeduplicator<T: Clone> {
    in_flight: Arc<Mutex<HashMap<String, SharedRequest<T>>>>,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Requests currently in flight
    pub fn pending(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Run `make()` unless a request with `key` is already running, in which
    /// case wait for that one instead. The entry is dropped once it resolves.
    pub async fn run<F, Fut>(&self, key: String, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) => {
                    tracing::debug!("Joining in-flight request {}", key);
                    existing.clone()
                }
                None => {
                    let fut = make().boxed().shared();
                    in_flight.insert(key.clone(), fut.clone());
                    fut
                }
            }
        };

        let output = shared.clone().await;

        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&key)
            .is_some_and(|current| current.ptr_eq(&shared))
        {
            in_flight.remove(&key);
        }
        output
    }
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
