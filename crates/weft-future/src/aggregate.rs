//! Aggregate futures: settle once a whole collection of sub-futures has.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{DynError, FuturesError, StateError, TaskError};
use crate::executor::Executor;
use crate::future::{make_promise, Future, Promise};

struct Element<T, K, E> {
    key: K,
    future: Future<T, E>,
    outcome: Option<Result<T, E>>,
}

struct Registry<T, K, E> {
    elements: Vec<Element<T, K, E>>,
    settled: usize,
}

/// A future over N keyed sub-futures.
///
/// Once every element has settled, the aggregate fulfills with the values in
/// registration order — or, if any element failed, fails with the first
/// error **in registration order** (not first-to-fail wall-clock order).
///
/// An aggregate with no elements never settles.
pub struct Futures<T, K, E = DynError> {
    aggregate: Promise<Vec<T>, E>,
    registry: Arc<Mutex<Registry<T, K, E>>>,
}

impl<T, K, E> Clone for Futures<T, K, E> {
    fn clone(&self) -> Self {
        Self {
            aggregate: self.aggregate.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T, K, E> Default for Futures<T, K, E>
where
    T: Clone + Send + 'static,
    K: PartialEq + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K, E> Futures<T, K, E>
where
    T: Clone + Send + 'static,
    K: PartialEq + Send + 'static,
    E: Clone + Send + 'static,
{
    /// An empty aggregate; populate it with [`add_future`](Self::add_future).
    pub fn new() -> Self {
        Self {
            aggregate: make_promise::<Vec<T>, E>(),
            registry: Arc::new(Mutex::new(Registry {
                elements: Vec::new(),
                settled: 0,
            })),
        }
    }

    /// Build an aggregate over `(key, future)` pairs.
    ///
    /// All elements are reserved before any continuation is wired up, so
    /// already-settled futures in the input cannot complete the aggregate
    /// prematurely.
    pub fn from_futures<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Future<T, E>)>,
    {
        let this = Self::new();
        let futures: Vec<Future<T, E>> = {
            let mut registry = this.registry.lock();
            pairs
                .into_iter()
                .map(|(key, future)| {
                    registry.elements.push(Element {
                        key,
                        future: future.clone(),
                        outcome: None,
                    });
                    future
                })
                .collect()
        };
        for (index, future) in futures.iter().enumerate() {
            this.register(index, future);
        }
        this
    }

    /// Build an aggregate over `(key, promise)` pairs.
    pub fn from_promises<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Promise<T, E>)>,
    {
        Self::from_futures(pairs.into_iter().map(|(key, promise)| (key, promise.future())))
    }

    /// Add one more sub-future.
    ///
    /// Fails with [`FuturesError::AlreadySettled`] once every existing
    /// element has settled (the aggregate result is already out).
    pub fn add_future(&self, key: K, future: Future<T, E>) -> Result<(), FuturesError> {
        let index = {
            let mut registry = self.registry.lock();
            if !registry.elements.is_empty() && registry.settled == registry.elements.len() {
                return Err(FuturesError::AlreadySettled);
            }
            registry.elements.push(Element {
                key,
                future: future.clone(),
                outcome: None,
            });
            registry.elements.len() - 1
        };
        self.register(index, &future);
        Ok(())
    }

    /// Add a sub-future taken from `promise`.
    pub fn add_promise(&self, key: K, promise: &Promise<T, E>) -> Result<(), FuturesError> {
        self.add_future(key, promise.future())
    }

    // Wire settle continuations onto a sub-future. Runs without the registry
    // lock: settle paths take the sub-future lock first, then the registry.
    fn register(&self, index: usize, future: &Future<T, E>) {
        let registry = Arc::clone(&self.registry);
        let aggregate = self.aggregate.clone();
        future.state.push_success(Box::new(move |value: &T| {
            settle(&registry, &aggregate, index, Ok(value.clone()));
        }));
        let registry = Arc::clone(&self.registry);
        let aggregate = self.aggregate.clone();
        future.state.push_error(Box::new(move |error: &E| {
            settle(&registry, &aggregate, index, Err(error.clone()));
            true
        }));
    }

    /// Number of registered sub-futures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.lock().elements.is_empty()
    }

    /// The sub-future registered under `key` (first match wins).
    pub fn future_for(&self, key: &K) -> Result<Future<T, E>, FuturesError> {
        self.registry
            .lock()
            .elements
            .iter()
            .find(|element| &element.key == key)
            .map(|element| element.future.clone())
            .ok_or(FuturesError::NoSuchKey)
    }

    /// The sub-future at registration position `index`.
    pub fn future_at(&self, index: usize) -> Result<Future<T, E>, FuturesError> {
        self.registry
            .lock()
            .elements
            .get(index)
            .map(|element| element.future.clone())
            .ok_or(FuturesError::NoSuchIndex(index))
    }

    /// The future over the collective outcome.
    pub fn aggregate(&self) -> Future<Vec<T>, E> {
        self.aggregate.future()
    }

    /// Block for the collective outcome (values in registration order).
    pub fn wait(&self) -> Result<Vec<T>, E> {
        self.aggregate().wait()
    }

    /// Block for the collective outcome, moving it out.
    pub fn take(&self) -> Result<Vec<T>, E> {
        self.aggregate().take()
    }

    /// Chain on the collective outcome.
    pub fn then<U, F>(&self, f: F) -> Future<U, E>
    where
        F: FnMut(&Vec<T>) -> U + Send + 'static,
        U: Send + 'static,
    {
        self.aggregate().then(f)
    }

    /// Observe the aggregate error (first failed element, registration
    /// order).
    pub fn on_error<F>(&self, f: F) -> &Self
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.aggregate().on_error(f);
        self
    }

    /// Chain on the collective outcome, running on the executor the
    /// producing pool attached.
    pub fn async_then<U, F>(&self, f: F) -> Result<Future<U, E>, StateError>
    where
        F: FnMut(Vec<T>) -> U + Send + 'static,
        U: Send + 'static,
        E: From<TaskError>,
    {
        self.aggregate().async_then(f)
    }

    /// Attach the executor used by [`async_then`](Self::async_then).
    pub fn bind_executor(&self, executor: Weak<dyn Executor>) {
        self.aggregate.bind_executor(executor);
    }
}

impl<T, E> FromIterator<Future<T, E>> for Futures<T, usize, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn from_iter<I: IntoIterator<Item = Future<T, E>>>(iter: I) -> Self {
        Self::from_futures(iter.into_iter().enumerate())
    }
}

fn settle<T, K, E>(
    registry: &Mutex<Registry<T, K, E>>,
    aggregate: &Promise<Vec<T>, E>,
    index: usize,
    outcome: Result<T, E>,
) where
    T: Clone,
    E: Clone,
{
    let mut registry = registry.lock();
    let Some(element) = registry.elements.get_mut(index) else {
        return;
    };
    if element.outcome.is_some() {
        return;
    }
    element.outcome = Some(outcome);
    registry.settled += 1;
    if registry.settled != registry.elements.len() {
        return;
    }
    let first_error = registry.elements.iter().find_map(|element| match &element.outcome {
        Some(Err(error)) => Some(error.clone()),
        _ => None,
    });
    match first_error {
        Some(error) => {
            let _ = aggregate.set_error(error);
        }
        None => {
            let values: Vec<T> = registry
                .elements
                .iter()
                .filter_map(|element| match &element.outcome {
                    Some(Ok(value)) => Some(value.clone()),
                    _ => None,
                })
                .collect();
            let _ = aggregate.set_result(values);
        }
    }
}
