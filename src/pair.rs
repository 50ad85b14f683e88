use crate::{CancelHandle, Deferred, Error, Outcome};
use parking_lot::Mutex;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Awaits the outcome of one invocation of a [`Deferred`].
///
/// The invocation is already running when the `Consumer` is handed out;
/// dropping the consumer does not cancel it, use
/// [`cancel_handle`](Consumer::cancel_handle) for that.
///
/// # Examples
///
/// ```
/// use requester::{Deferred, Outcome};
/// use futures::executor::block_on;
///
/// let outcome = block_on(Deferred::success("Hi").future());
/// assert!(matches!(outcome, Outcome::Success("Hi")));
/// ```
#[derive(Debug)]
pub struct Consumer<T> {
    promise: Arc<Mutex<Inner<T>>>,
    handle: CancelHandle,
}

/// The continuation side of the pair. Dropping it unresolved wakes the
/// consumer with [`Error::ProducerDropped`].
#[derive(Debug)]
struct Producer<T> {
    promise: Arc<Mutex<Inner<T>>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

#[derive(Debug)]
struct Inner<T> {
    value: Option<Outcome<T>>,
    waker: Result<Waker, WakerState>,
}

impl<T> Producer<T> {
    fn new() -> (Self, Arc<Mutex<Inner<T>>>) {
        let inner = Arc::new(Mutex::new(Inner {
            value: None,
            waker: Err(WakerState::Fresh),
        }));
        (Producer { promise: inner.clone() }, inner)
    }

    fn resolve(self, outcome: Outcome<T>) {
        let mut promise = self.promise.lock();
        promise.value = Some(outcome);
        if let Ok(waker) = std::mem::replace(&mut promise.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        let mut promise = self.promise.lock();
        if let Ok(waker) = std::mem::replace(&mut promise.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T> Consumer<T> {
    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.handle
    }

    pub fn cancel(&self) {
        self.handle.cancel()
    }
}

impl<T> Future for Consumer<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut promise = self.promise.lock();
        match promise.value.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => match std::mem::replace(&mut promise.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => {
                    Poll::Ready(Outcome::Failure(Error::ProducerDropped))
                }
                _ => Poll::Pending,
            },
        }
    }
}

impl<T: Send + 'static> Deferred<T> {
    /// Starts one invocation and returns a future of its outcome.
    pub fn future(&self) -> Consumer<T> {
        let (producer, promise) = Producer::new();
        let handle = self.request(move |outcome| producer.resolve(outcome));
        Consumer { promise, handle }
    }
}

impl<T: Send + 'static> IntoFuture for Deferred<T> {
    type Output = Outcome<T>;
    type IntoFuture = Consumer<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.future()
    }
}
