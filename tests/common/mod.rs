#![allow(dead_code)]

use requester::{Deferred, Error, Outcome, Scheduler, ThreadScheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT_LOGGING: Once = Once::new();

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

#[derive(Debug, thiserror::Error)]
#[error("requester error {code}")]
pub struct Coded {
    pub code: i32,
}

/// A leaf that settles with `outcome` after `delay`, or with `Cancelled`
/// if its handle is cancelled first.
pub fn delayed<T>(scheduler: &ThreadScheduler, delay: Duration, outcome: Outcome<T>) -> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    let scheduler = scheduler.clone();
    Deferred::new(move |completion| {
        let outcome = outcome.clone();
        scheduler.after(delay, move |cancelled| {
            if cancelled {
                completion(Outcome::Cancelled)
            } else {
                completion(outcome)
            }
        })
    })
}

pub fn request_hello(scheduler: &ThreadScheduler) -> Deferred<String> {
    delayed(scheduler, Duration::from_millis(200), Outcome::Success("Hello".into()))
}

pub fn request_error(scheduler: &ThreadScheduler) -> Deferred<String> {
    delayed(
        scheduler,
        Duration::from_millis(200),
        Outcome::Failure(Error::new(Coded { code: -1 })),
    )
}

pub fn request_world(scheduler: &ThreadScheduler, head: String) -> Deferred<String> {
    delayed(scheduler, Duration::from_millis(200), Outcome::Success(head + "World"))
}

pub fn request_punctuation(scheduler: &ThreadScheduler, head: String) -> Deferred<String> {
    delayed(scheduler, Duration::from_secs(1), Outcome::Success(head + "!!!"))
}

/// Wraps `deferred` so every start bumps the returned counter.
pub fn counted<T: Send + 'static>(deferred: Deferred<T>) -> (Deferred<T>, Arc<AtomicUsize>) {
    let starts = Arc::new(AtomicUsize::new(0));
    let counter = starts.clone();
    let counted = Deferred::new(move |completion| {
        counter.fetch_add(1, Ordering::SeqCst);
        deferred.request(completion)
    });
    (counted, starts)
}
