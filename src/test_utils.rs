//! Shared helpers for unit tests: logging setup and hand-driven leaf recipes.

use crate::{CancelHandle, Continuation, Deferred, Outcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output. Only the first call
/// installs the subscriber.
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// A continuation that appends every outcome it receives to `seen`.
pub(crate) fn recorder<T: Send + 'static>() -> (
    impl FnOnce(Outcome<T>) + Clone + Send + 'static,
    Arc<Mutex<Vec<Outcome<T>>>>,
) {
    let seen: Arc<Mutex<Vec<Outcome<T>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (move |outcome: Outcome<T>| sink.lock().push(outcome), seen)
}

type Slot<T> = Arc<Mutex<Option<Continuation<T>>>>;

struct Invocation<T> {
    continuation: Slot<T>,
    cancel: CancelHandle,
}

/// Controls for a leaf recipe whose invocations are settled by the test.
pub(crate) struct Manual<T> {
    invocations: Arc<Mutex<Vec<Invocation<T>>>>,
    starts: Arc<AtomicUsize>,
}

impl<T: Send + 'static> Manual<T> {
    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Delivers `outcome` to invocation `index`. Returns false if that
    /// invocation already settled.
    pub(crate) fn settle(&self, index: usize, outcome: Outcome<T>) -> bool {
        let slot = self.invocations.lock()[index].continuation.clone();
        let continuation = slot.lock().take();
        match continuation {
            Some(continuation) => {
                continuation(outcome);
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancelled(&self, index: usize) -> bool {
        self.invocations.lock()[index].cancel.is_cancelled()
    }
}

/// A leaf that honors cancellation by delivering `Cancelled` at once.
pub(crate) fn manual<T: Send + 'static>() -> (Deferred<T>, Manual<T>) {
    leaf(true)
}

/// A leaf that records cancellation but keeps running.
pub(crate) fn stubborn<T: Send + 'static>() -> (Deferred<T>, Manual<T>) {
    leaf(false)
}

fn leaf<T: Send + 'static>(honor_cancel: bool) -> (Deferred<T>, Manual<T>) {
    let invocations: Arc<Mutex<Vec<Invocation<T>>>> = Default::default();
    let starts = Arc::new(AtomicUsize::new(0));
    let (registry, counter) = (invocations.clone(), starts.clone());

    let deferred = Deferred::new(move |completion| {
        counter.fetch_add(1, Ordering::SeqCst);
        let continuation: Slot<T> = Arc::new(Mutex::new(Some(completion)));
        let pending = continuation.clone();
        let cancel = CancelHandle::from_fn(move || {
            if !honor_cancel {
                return;
            }
            let continuation = pending.lock().take();
            if let Some(continuation) = continuation {
                continuation(Outcome::Cancelled);
            }
        });
        registry.lock().push(Invocation {
            continuation,
            cancel: cancel.clone(),
        });
        cancel
    });
    (deferred, Manual { invocations, starts })
}
