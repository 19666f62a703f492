use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ServiceError;

/// Bounds every batch key satisfies.
pub trait BatchKey: Eq + Hash + Ord + Clone + Display + Send + Sync + 'static {}

impl<T> BatchKey for T where T: Eq + Hash + Ord + Clone + Display + Send + Sync + 'static {}

/// A backend operation that answers many keys in one call.
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync {
    /// Entity kind, used for `NotFound` errors and logs.
    fn kind(&self) -> &'static str;

    /// Keys absent from the returned map resolve to `NotFound`.
    async fn load(&self, keys: &[K]) -> Result<HashMap<K, V>, ServiceError>;
}

type Waiter<V> = oneshot::Sender<Result<V, ServiceError>>;

struct State<K, V> {
    resolved: HashMap<K, Result<V, ServiceError>>,
    queued: Vec<K>,
    in_flight: HashSet<K>,
    waiters: HashMap<K, Vec<Waiter<V>>>,
}

enum Registration<V> {
    Ready(Result<V, ServiceError>),
    Waiting(oneshot::Receiver<Result<V, ServiceError>>),
}

/// Accumulator for one entity kind within one resolution pass.
///
/// `load` registers the key, yields once so sibling resolutions can register
/// theirs, then flushes: the first caller to resume with its key still queued
/// drains the queue and issues one deduplicated call for everything queued. Results, including
/// failures, are memoized for the lifetime of the loader, so a key is fetched at
/// most once per pass.
pub struct BatchLoader<K: BatchKey, V: Clone + Send + Sync + 'static> {
    source: Arc<dyn BatchFn<K, V>>,
    state: Mutex<State<K, V>>,
    dispatches: AtomicUsize,
}

impl<K: BatchKey, V: Clone + Send + Sync + 'static> BatchLoader<K, V> {
    pub fn new(source: Arc<dyn BatchFn<K, V>>) -> Self {
        Self {
            source,
            state: Mutex::new(State {
                resolved: HashMap::new(),
                queued: Vec::new(),
                in_flight: HashSet::new(),
                waiters: HashMap::new(),
            }),
            dispatches: AtomicUsize::new(0),
        }
    }

    pub async fn load(&self, key: K) -> Result<V, ServiceError> {
        let receiver = match self.register(key.clone()) {
            Registration::Ready(result) => return result,
            Registration::Waiting(receiver) => receiver,
        };
        tokio::task::yield_now().await;
        if self.is_queued(&key) {
            self.flush().await;
        }
        self.receive(receiver).await
    }

    /// Loads several keys as part of the same batch. Results keep input order.
    pub async fn load_many(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Vec<(K, Result<V, ServiceError>)> {
        let registrations: Vec<_> = keys
            .into_iter()
            .map(|key| (key.clone(), self.register(key)))
            .collect();
        tokio::task::yield_now().await;
        if registrations.iter().any(|(key, _)| self.is_queued(key)) {
            self.flush().await;
        }

        let mut results = Vec::with_capacity(registrations.len());
        for (key, registration) in registrations {
            let result = match registration {
                Registration::Ready(result) => result,
                Registration::Waiting(receiver) => self.receive(receiver).await,
            };
            results.push((key, result));
        }
        results
    }

    /// Seeds the memo with a value the pass already holds, e.g. a freshly
    /// created record.
    pub fn prime(&self, key: K, value: V) {
        let mut state = self.lock();
        if !state.in_flight.contains(&key) && !state.waiters.contains_key(&key) {
            state.resolved.insert(key, Ok(value));
        }
    }

    /// Resolved value for `key` if this pass already fetched it.
    pub fn cached(&self, key: &K) -> Option<Result<V, ServiceError>> {
        self.lock().resolved.get(key).cloned()
    }

    /// Issues one backend call for every queued key. No-op when nothing is queued.
    pub async fn flush(&self) {
        let keys = {
            let mut state = self.lock();
            if state.queued.is_empty() {
                return;
            }
            let mut keys = std::mem::take(&mut state.queued);
            keys.sort();
            state.in_flight.extend(keys.iter().cloned());
            keys
        };

        let dispatch = self.dispatches.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(kind = self.source.kind(), dispatch, keys = keys.len(), "Flushing batch");

        let mut in_flight = InFlight {
            loader: self,
            keys: Some(keys),
        };
        let outcome = self
            .source
            .load(in_flight.keys.as_deref().unwrap_or_default())
            .await;
        if let Some(keys) = in_flight.keys.take() {
            self.complete(keys, outcome);
        }
    }

    /// Backend calls issued so far by this loader.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    fn register(&self, key: K) -> Registration<V> {
        let mut state = self.lock();
        if let Some(result) = state.resolved.get(&key) {
            return Registration::Ready(result.clone());
        }
        let (sender, receiver) = oneshot::channel();
        if !state.in_flight.contains(&key) && !state.waiters.contains_key(&key) {
            state.queued.push(key.clone());
        }
        state.waiters.entry(key).or_default().push(sender);
        Registration::Waiting(receiver)
    }

    /// Registered but not yet dispatched. A caller whose key was already
    /// dispatched by a sibling must not flush: the queue now holds the next
    /// level's keys, which still have siblings to wait for.
    fn is_queued(&self, key: &K) -> bool {
        let state = self.lock();
        !state.in_flight.contains(key) && !state.resolved.contains_key(key)
    }

    async fn receive(
        &self,
        receiver: oneshot::Receiver<Result<V, ServiceError>>,
    ) -> Result<V, ServiceError> {
        receiver.await.unwrap_or_else(|_| Err(self.canceled()))
    }

    fn complete(&self, keys: Vec<K>, outcome: Result<HashMap<K, V>, ServiceError>) {
        let kind = self.source.kind();
        let mut found = match outcome {
            Ok(found) => Ok(found),
            Err(err) => {
                warn!(kind, error = %err, keys = keys.len(), "Batch failed");
                Err(err)
            }
        };

        let mut state = self.lock();
        for key in keys {
            let result = match &mut found {
                Ok(found) => found.remove(&key).ok_or_else(|| ServiceError::NotFound {
                    kind,
                    id: key.to_string(),
                }),
                Err(err) => Err(err.clone()),
            };
            state.in_flight.remove(&key);
            for waiter in state.waiters.remove(&key).unwrap_or_default() {
                let _ = waiter.send(result.clone());
            }
            state.resolved.insert(key, result);
        }
    }

    fn abandon(&self, keys: Vec<K>) {
        let err = self.canceled();
        let mut state = self.lock();
        for key in keys {
            state.in_flight.remove(&key);
            for waiter in state.waiters.remove(&key).unwrap_or_default() {
                let _ = waiter.send(Err(err.clone()));
            }
        }
    }

    fn canceled(&self) -> ServiceError {
        ServiceError::unavailable(self.source.kind(), "batch canceled")
    }

    fn lock(&self) -> MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keys of a dispatched batch. If the flushing future is dropped before the
/// call returns, every waiter on these keys is released with a cancellation.
struct InFlight<'a, K: BatchKey, V: Clone + Send + Sync + 'static> {
    loader: &'a BatchLoader<K, V>,
    keys: Option<Vec<K>>,
}

impl<K: BatchKey, V: Clone + Send + Sync + 'static> Drop for InFlight<'_, K, V> {
    fn drop(&mut self) {
        if let Some(keys) = self.keys.take() {
            debug!(kind = self.loader.source.kind(), "Batch abandoned");
            self.loader.abandon(keys);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::time::Duration;

    /// Source over a fixed map that records every call it receives.
    #[derive(Default)]
    struct RecordingSource {
        known: HashMap<String, u32>,
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
        hang: bool,
    }

    impl RecordingSource {
        fn with(entries: &[(&str, u32)]) -> Self {
            Self {
                known: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchFn<String, u32> for RecordingSource {
        fn kind(&self) -> &'static str {
            "widget"
        }

        async fn load(&self, keys: &[String]) -> Result<HashMap<String, u32>, ServiceError> {
            self.calls.lock().unwrap().push(keys.to_vec());
            if self.hang {
                futures::future::pending::<()>().await;
            }
            if self.fail {
                return Err(ServiceError::unavailable("widget", "down"));
            }
            Ok(keys
                .iter()
                .filter_map(|key| self.known.get(key).map(|value| (key.clone(), *value)))
                .collect())
        }
    }

    fn loader(source: &Arc<RecordingSource>) -> BatchLoader<String, u32> {
        BatchLoader::new(source.clone())
    }

    #[tokio::test]
    async fn concurrent_loads_become_one_deduplicated_call() {
        let source = Arc::new(RecordingSource::with(&[("a", 1), ("b", 2), ("c", 3)]));
        let loader = loader(&source);

        let keys = ["c", "a", "b", "a", "c", "c"];
        let results = join_all(keys.iter().map(|key| loader.load(key.to_string()))).await;

        let values: Vec<u32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![3, 1, 2, 1, 3, 3]);
        assert_eq!(source.calls(), vec![vec!["a", "b", "c"]]);
        assert_eq!(loader.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn missing_keys_resolve_individually_to_not_found() {
        let source = Arc::new(RecordingSource::with(&[("a", 1)]));
        let loader = loader(&source);

        let (a, z) = tokio::join!(loader.load("a".into()), loader.load("z".into()));

        assert_eq!(a, Ok(1));
        assert_eq!(
            z,
            Err(ServiceError::NotFound {
                kind: "widget",
                id: "z".into()
            })
        );
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn results_are_memoized_for_the_pass() {
        let source = Arc::new(RecordingSource::with(&[("a", 1), ("b", 2)]));
        let loader = loader(&source);

        assert_eq!(loader.load("a".into()).await, Ok(1));
        assert_eq!(loader.load("a".into()).await, Ok(1));
        assert_eq!(loader.load("b".into()).await, Ok(2));

        assert_eq!(source.calls(), vec![vec!["a"], vec!["b"]]);
        assert_eq!(loader.cached(&"a".to_string()), Some(Ok(1)));
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter_and_is_not_refetched() {
        let source = Arc::new(RecordingSource {
            fail: true,
            ..RecordingSource::with(&[("a", 1)])
        });
        let loader = loader(&source);

        let results = join_all(["a", "b"].map(|key| loader.load(key.to_string()))).await;
        for result in &results {
            assert!(result.as_ref().unwrap_err().is_unavailable());
        }

        assert!(loader.load("a".into()).await.is_err());
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn nested_lookups_issue_one_call_per_level() {
        let source = Arc::new(RecordingSource::with(&[
            ("p1", 10),
            ("p2", 20),
            ("c10", 100),
            ("c20", 200),
        ]));
        let loader = loader(&source);

        let resolve = |parent: &'static str| {
            let loader = &loader;
            async move {
                let value = loader.load(parent.to_string()).await?;
                loader.load(format!("c{value}")).await
            }
        };
        let results = join_all(["p1", "p2", "p1"].map(resolve)).await;

        assert_eq!(results, vec![Ok(100), Ok(200), Ok(100)]);
        assert_eq!(
            source.calls(),
            vec![vec!["p1", "p2"], vec!["c10", "c20"]]
        );
    }

    #[tokio::test]
    async fn separate_passes_do_not_share_batches() {
        let source = Arc::new(RecordingSource::with(&[("a", 1)]));

        let first = loader(&source);
        let second = loader(&source);
        let (one, two) = tokio::join!(first.load("a".into()), second.load("a".into()));

        assert_eq!((one, two), (Ok(1), Ok(1)));
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn load_many_keeps_input_order() {
        let source = Arc::new(RecordingSource::with(&[("a", 1), ("b", 2)]));
        let loader = loader(&source);

        let results = loader
            .load_many(["b".to_string(), "x".to_string(), "a".to_string()])
            .await;

        let keys: Vec<_> = results.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["b", "x", "a"]);
        assert_eq!(results[0].1, Ok(2));
        assert!(results[1].1.is_err());
        assert_eq!(source.calls(), vec![vec!["a", "b", "x"]]);
    }

    #[tokio::test]
    async fn primed_values_skip_the_backend() {
        let source = Arc::new(RecordingSource::default());
        let loader = loader(&source);

        loader.prime("fresh".into(), 7);

        assert_eq!(loader.load("fresh".into()).await, Ok(7));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn dropping_the_flushing_caller_releases_other_waiters() {
        let source = Arc::new(RecordingSource {
            hang: true,
            ..Default::default()
        });
        let loader = loader(&source);

        // `join` polls left first, so the timed-out load is the one that flushes.
        let leader = tokio::time::timeout(Duration::from_millis(30), loader.load("a".into()));
        let follower = loader.load("b".into());
        let (leader, follower) = futures::future::join(leader, follower).await;

        assert!(leader.is_err());
        assert_eq!(
            follower,
            Err(ServiceError::unavailable("widget", "batch canceled"))
        );
        assert_eq!(source.calls(), vec![vec!["a", "b"]]);
    }
}
