use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};

use crate::utils::futures::CallOnDrop;

type Computation<T> = Shared<BoxFuture<'static, T>>;

/// The computations currently running, by key.
///
/// Entries only hold weak references, so a computation is dropped together with its last waiter.
type InFlight<T> = Mutex<HashMap<String, (u64, WeakShared<BoxFuture<'static, T>>)>>;

/// Collapses concurrent computations for the same key into one.
///
/// The first caller for a key starts the work, every caller arriving while it runs awaits the
/// same computation and receives a clone of its result. The key is released once the work
/// completes or all of its waiters are gone, so the next call starts over.
pub struct SingleFlightGate<T> {
    name: &'static str,
    inflight: Arc<InFlight<T>>,
    generation: AtomicU64,
}

impl<T> SingleFlightGate<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a gate. The `name` is used to tag metrics.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inflight: Default::default(),
            generation: AtomicU64::new(0),
        }
    }

    /// Runs `work` unless a computation for `key` is already in flight, and returns its result.
    ///
    /// The registry lock is only held to look up or register the computation, never while
    /// awaiting it.
    pub async fn run<F>(&self, key: &str, work: F) -> T
    where
        F: Future<Output = T> + Send + 'static,
    {
        let computation = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);

            let running = inflight.get(key).and_then(|(_, weak)| weak.upgrade());
            match running {
                Some(computation) => {
                    metric!(counter("single_flight.join") += 1, "gate" => self.name);
                    computation
                }
                None => {
                    metric!(counter("single_flight.start") += 1, "gate" => self.name);
                    self.register(&mut inflight, key, work)
                }
            }
        };

        computation.await
    }

    fn register<F>(
        &self,
        inflight: &mut HashMap<String, (u64, WeakShared<BoxFuture<'static, T>>)>,
        key: &str,
        work: F,
    ) -> Computation<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let release = {
            let inflight = Arc::clone(&self.inflight);
            let key = key.to_owned();
            CallOnDrop::new(move || {
                let mut inflight = inflight.lock().unwrap_or_else(PoisonError::into_inner);
                // a newer computation may have taken over the key in the meantime
                if inflight.get(&key).is_some_and(|(g, _)| *g == generation) {
                    inflight.remove(&key);
                }
            })
        };

        let computation = async move {
            let _release = release;
            work.await
        }
        .boxed()
        .shared();

        if let Some(weak) = computation.downgrade() {
            inflight.insert(key.to_owned(), (generation, weak));
        }
        computation
    }

    /// The number of keys with a computation in flight.
    pub fn in_flight(&self) -> usize {
        // upgraded handles must outlive the guard, dropping the last one releases the key
        let running: Vec<_> = {
            let inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            inflight
                .values()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };
        running.len()
    }
}

impl<T> fmt::Debug for SingleFlightGate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlightGate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
