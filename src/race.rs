//! Binary race: the first branch to succeed or fail wins, the other branch
//! is cancelled.
//!
//! A branch that reports `Cancelled` never wins. The race only resolves to
//! `Cancelled` once both branches have exited that way.
//!
//! Branches may settle on different threads. The coordination state of one
//! invocation is guarded by a mutex that is released before any cancel or
//! continuation runs, so a branch that settles synchronously from inside
//! its sibling's `cancel` does not deadlock.

use crate::cancel::{CancelHandle, SerialHandle};
use crate::deferred::{Continuation, Deferred};
use crate::outcome::{Either, Outcome};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

struct RaceState<T> {
    settled: bool,
    exited: u8,
    completion: Option<Continuation<T>>,
}

impl<T: Send + 'static> Deferred<T> {
    /// Runs `self` and `right` concurrently and resolves with whichever
    /// settles first, tagged with the side it came from.
    ///
    /// If `self` settles synchronously, `right` is never started.
    /// Cancelling the returned handle cancels both branches.
    pub fn race<U>(self, right: Deferred<U>) -> Deferred<Either<T, U>>
    where
        U: Send + 'static,
    {
        let left = self.map(Either::<T, U>::Left);
        let right = right.map(Either::<T, U>::Right);

        Deferred::new(move |completion| {
            let state = Arc::new(Mutex::new(RaceState {
                settled: false,
                exited: 0,
                completion: Some(completion),
            }));
            let left_handle = SerialHandle::new();
            let right_handle = SerialHandle::new();

            let handle = left.request(branch(state.clone(), right_handle.clone(), "left"));
            left_handle.set_initial(handle);

            let settled = state.lock().settled;
            if settled {
                trace!("left branch settled synchronously, right branch not started");
            } else {
                let handle = right.request(branch(state, left_handle.clone(), "right"));
                right_handle.set_initial(handle);
            }

            CancelHandle::from_fn(move || {
                left_handle.cancel();
                right_handle.cancel();
            })
        })
    }

    /// Race between two deferreds of the same type, without side tagging.
    pub fn race_same(self, other: Deferred<T>) -> Deferred<T> {
        self.race(other).map(Either::into_inner)
    }
}

fn branch<T: Send + 'static>(
    state: Arc<Mutex<RaceState<T>>>,
    sibling: SerialHandle,
    side: &'static str,
) -> impl FnOnce(Outcome<T>) + Send + 'static {
    move |outcome| {
        let completion = {
            let mut state = state.lock();
            state.exited += 1;
            if state.settled {
                trace!(side, "race already settled, ignoring branch");
                return;
            }
            if outcome.is_cancelled() && state.exited < 2 {
                trace!(side, "race branch cancelled, waiting for sibling");
                return;
            }
            state.settled = true;
            state.completion.take()
        };

        if outcome.is_cancelled() {
            debug!("both race branches cancelled");
        } else {
            debug!(side, "race won");
            sibling.cancel();
        }
        if let Some(completion) = completion {
            completion(outcome);
        }
    }
}
