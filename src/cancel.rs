//! Cancel handles returned by every invocation of a [`Deferred`](crate::Deferred).
//!
//! The set of handles is closed: a no-op handle, a delegating handle that
//! runs a closure once, and a serial handle that forwards to whichever
//! handle is currently bound to it. All of them are idempotent.
//!
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

type Cancellation = Box<dyn FnOnce() + Send + 'static>;

/// Capability to request early termination of one invocation.
///
/// Cloning a handle yields another reference to the same capability.
/// Cancellation is cooperative: the handle only signals intent, the
/// underlying recipe decides when to deliver `Cancelled`.
///
/// # Examples
///
/// ```
/// use requester::CancelHandle;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = calls.clone();
/// let handle = CancelHandle::from_fn(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
/// handle.cancel();
/// handle.cancel();
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct CancelHandle {
    repr: Repr,
}

#[derive(Clone)]
enum Repr {
    Noop,
    Delegate(Arc<Mutex<Delegate>>),
    Serial(SerialHandle),
}

struct Delegate {
    cancellation: Option<Cancellation>,
    cancelled: bool,
}

impl CancelHandle {
    /// A handle whose `cancel` does nothing. Used by recipes that settle
    /// synchronously.
    pub fn noop() -> Self {
        CancelHandle { repr: Repr::Noop }
    }

    /// A handle that runs `cancellation` on the first `cancel` call only.
    pub fn from_fn<F>(cancellation: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        CancelHandle {
            repr: Repr::Delegate(Arc::new(Mutex::new(Delegate {
                cancellation: Some(Box::new(cancellation)),
                cancelled: false,
            }))),
        }
    }

    pub fn cancel(&self) {
        match &self.repr {
            Repr::Noop => {}
            Repr::Delegate(delegate) => {
                // Take the closure out before running it so a re-entrant
                // cancel sees the handle as spent.
                let cancellation = {
                    let mut delegate = delegate.lock();
                    delegate.cancelled = true;
                    delegate.cancellation.take()
                };
                if let Some(cancellation) = cancellation {
                    cancellation();
                }
            }
            Repr::Serial(serial) => serial.cancel(),
        }
    }

    /// Whether `cancel` has been called on this handle. A no-op handle
    /// never reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        match &self.repr {
            Repr::Noop => false,
            Repr::Delegate(delegate) => delegate.lock().cancelled,
            Repr::Serial(serial) => serial.is_cancelled(),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        CancelHandle::noop()
    }
}

impl From<SerialHandle> for CancelHandle {
    fn from(serial: SerialHandle) -> Self {
        CancelHandle {
            repr: Repr::Serial(serial),
        }
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.repr {
            Repr::Noop => "Noop",
            Repr::Delegate(_) => "Delegate",
            Repr::Serial(_) => "Serial",
        };
        f.debug_struct("CancelHandle")
            .field("kind", &kind)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A rebindable slot holding the handle of whichever stage is running.
///
/// A chained invocation does not know its second stage's handle until the
/// first stage has settled, so the outer handle forwards to whatever is
/// bound at the moment `cancel` is called. A handle bound after the slot
/// was cancelled is cancelled immediately.
#[derive(Clone, Default)]
pub struct SerialHandle {
    state: Arc<Mutex<SerialState>>,
}

#[derive(Default)]
struct SerialState {
    current: Option<CancelHandle>,
    rebound: bool,
    cancelled: bool,
}

impl SerialHandle {
    pub fn new() -> Self {
        SerialHandle::default()
    }

    /// Binds `handle`, replacing whatever was bound before.
    pub fn set(&self, handle: CancelHandle) {
        let mut state = self.state.lock();
        state.rebound = true;
        if state.cancelled {
            drop(state);
            trace!("serial handle already cancelled, cancelling rebound handle");
            handle.cancel();
        } else {
            state.current = Some(handle);
        }
    }

    /// Binds `handle` unless [`set`](SerialHandle::set) already ran.
    ///
    /// A stage that settled synchronously may have bound its successor
    /// before its own `request` returned; the successor must stay bound.
    pub fn set_initial(&self, handle: CancelHandle) {
        let mut state = self.state.lock();
        if state.rebound {
            return;
        }
        if state.cancelled {
            drop(state);
            handle.cancel();
        } else {
            state.current = Some(handle);
        }
    }

    pub fn cancel(&self) {
        let current = {
            let mut state = self.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.current.take()
        };
        if let Some(handle) = current {
            trace!("serial handle forwarding cancel");
            handle.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn handle(&self) -> CancelHandle {
        CancelHandle::from(self.clone())
    }
}
