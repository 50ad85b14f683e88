use crate::cancel::{CancelHandle, SerialHandle};
use crate::outcome::Outcome;
use crate::Error;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// The callback a recipe must invoke exactly once with its outcome.
pub type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

type Recipe<T> = dyn Fn(Continuation<T>) -> CancelHandle + Send + Sync + 'static;

/// A cold, re-invokable recipe for an asynchronous result.
///
/// Nothing runs until [`request`](Deferred::request) is called, and every
/// call is an independent invocation with its own outcome and its own
/// [`CancelHandle`].
///
/// # Examples
///
/// ```
/// use requester::{CancelHandle, Deferred, Outcome};
/// use std::sync::mpsc::channel;
/// use std::thread;
///
/// let answer = Deferred::new(|completion| {
///     thread::spawn(move || completion(Outcome::Success(42)));
///     CancelHandle::noop()
/// });
///
/// let (tx, rx) = channel();
/// let _handle = answer.request(move |outcome| tx.send(outcome.success()).unwrap());
/// assert_eq!(rx.recv().unwrap(), Some(42));
/// ```
pub struct Deferred<T> {
    recipe: Arc<Recipe<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Deferred {
            recipe: self.recipe.clone(),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Deferred<T> {
    /// Wraps a starter function. The starter receives the continuation,
    /// kicks off the work and returns a handle that can cancel it.
    pub fn new<F>(start: F) -> Self
    where
        F: Fn(Continuation<T>) -> CancelHandle + Send + Sync + 'static,
    {
        Deferred {
            recipe: Arc::new(start),
        }
    }

    /// Synchronously delivers `outcome` on every invocation.
    pub fn from_outcome(outcome: Outcome<T>) -> Self
    where
        T: Clone + Sync,
    {
        Deferred::new(move |completion| {
            completion(outcome.clone());
            CancelHandle::noop()
        })
    }

    pub fn success(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Deferred::from_outcome(Outcome::Success(value))
    }

    pub fn failure(err: Error) -> Self {
        Deferred::new(move |completion| {
            completion(Outcome::Failure(err.clone()));
            CancelHandle::noop()
        })
    }

    pub fn cancelled() -> Self {
        Deferred::new(|completion| {
            completion(Outcome::Cancelled);
            CancelHandle::noop()
        })
    }

    /// Starts one invocation. `completion` fires exactly once, possibly
    /// before this call returns.
    pub fn request<F>(&self, completion: F) -> CancelHandle
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        (self.recipe)(Box::new(completion))
    }

    /// Starts one invocation and ignores its outcome.
    pub fn start(&self) -> CancelHandle {
        self.request(|_| {})
    }

    pub fn map<U, F>(self, transform: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        Deferred::new(move |completion| {
            let transform = transform.clone();
            self.request(move |outcome| completion(outcome.map(|value| transform(value))))
        })
    }

    /// Like [`map`](Deferred::map), but the transform may fail or cancel.
    pub fn flat_map<U, F>(self, transform: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Outcome<U> + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        Deferred::new(move |completion| {
            let transform = transform.clone();
            self.request(move |outcome| completion(outcome.and_then(|value| transform(value))))
        })
    }

    /// Chains a dependent deferred, started only when this one succeeds.
    ///
    /// The returned handle follows the chain: before this deferred settles
    /// it cancels this one, afterwards it cancels the dependent.
    pub fn then<U, F>(self, next: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Deferred<U> + Send + Sync + 'static,
    {
        let next = Arc::new(next);
        Deferred::new(move |completion| {
            let serial = SerialHandle::new();
            let slot = serial.clone();
            let next = next.clone();
            let first = self.request(move |outcome| match outcome {
                Outcome::Success(_) if slot.is_cancelled() => {
                    debug!("chain cancelled between stages, dependent not started");
                    completion(Outcome::Cancelled)
                }
                Outcome::Success(value) => slot.set(next(value).request(completion)),
                Outcome::Failure(err) => {
                    trace!(%err, "chain short-circuited on failure");
                    completion(Outcome::Failure(err))
                }
                Outcome::Cancelled => completion(Outcome::Cancelled),
            });
            serial.set_initial(first);
            serial.handle()
        })
    }

    /// Runs `hook` with the success value before passing the outcome on.
    ///
    /// Hooks must not panic; a panicking hook unwinds through whatever
    /// context delivered the outcome.
    pub fn on_success<F>(self, hook: F) -> Deferred<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.tap(move |outcome| {
            if let Outcome::Success(value) = outcome {
                hook(value)
            }
        })
    }

    pub fn on_failure<F>(self, hook: F) -> Deferred<T>
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.tap(move |outcome| {
            if let Outcome::Failure(err) = outcome {
                hook(err)
            }
        })
    }

    pub fn on_cancelled<F>(self, hook: F) -> Deferred<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.tap(move |outcome| {
            if outcome.is_cancelled() {
                hook()
            }
        })
    }

    fn tap<F>(self, hook: F) -> Deferred<T>
    where
        F: Fn(&Outcome<T>) + Send + Sync + 'static,
    {
        let hook = Arc::new(hook);
        Deferred::new(move |completion| {
            let hook = hook.clone();
            self.request(move |outcome| {
                hook(&outcome);
                completion(outcome)
            })
        })
    }

    /// Runs `deferreds` strictly one after another, collecting their values
    /// in input order. The first failure or cancellation stops the run and
    /// later deferreds are never started.
    pub fn sequence<I>(deferreds: I) -> Deferred<Vec<T>>
    where
        I: IntoIterator<Item = Deferred<T>>,
        T: Clone + Sync,
    {
        deferreds
            .into_iter()
            .fold(Deferred::success(Vec::new()), |collected, next| {
                collected.then(move |values: Vec<T>| {
                    next.clone().map(move |value| {
                        let mut values = values.clone();
                        values.push(value);
                        values
                    })
                })
            })
    }
}
