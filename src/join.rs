//! Binary join and the list-level join built by folding it.
//!
//! A join waits for both branches to succeed. The first failure cancels the
//! other branch and is delivered immediately. Cancellation surfaces only
//! once both branches have exited without the join settling.

use crate::cancel::{CancelHandle, SerialHandle};
use crate::deferred::{Continuation, Deferred};
use crate::outcome::Outcome;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

struct JoinState<T, U> {
    settled: bool,
    exited: u8,
    left: Option<T>,
    right: Option<U>,
    completion: Option<Continuation<(T, U)>>,
}

impl<T, U> JoinState<T, U> {
    fn both(&mut self) -> Option<(T, U)> {
        if self.left.is_some() && self.right.is_some() {
            self.left.take().zip(self.right.take())
        } else {
            None
        }
    }
}

impl<T: Send + 'static> Deferred<T> {
    /// Runs `self` and `right` concurrently and resolves with both values.
    ///
    /// If `self` fails synchronously, `right` is never started.
    #[doc(alias = "concurrently")]
    pub fn join<U>(self, right: Deferred<U>) -> Deferred<(T, U)>
    where
        U: Send + 'static,
    {
        let left = self;
        Deferred::new(move |completion| {
            let state = Arc::new(Mutex::new(JoinState {
                settled: false,
                exited: 0,
                left: None,
                right: None,
                completion: Some(completion),
            }));
            let left_handle = SerialHandle::new();
            let right_handle = SerialHandle::new();

            let handle = left.request(branch(
                state.clone(),
                right_handle.clone(),
                "left",
                |state, value| state.left = Some(value),
            ));
            left_handle.set_initial(handle);

            let settled = state.lock().settled;
            if settled {
                trace!("left branch settled synchronously, right branch not started");
            } else {
                let handle = right.request(branch(
                    state,
                    left_handle.clone(),
                    "right",
                    |state, value| state.right = Some(value),
                ));
                right_handle.set_initial(handle);
            }

            CancelHandle::from_fn(move || {
                left_handle.cancel();
                right_handle.cancel();
            })
        })
    }

    /// Joins every deferred in `deferreds`, collecting values in input order.
    ///
    /// This is a left-leaning fold of binary [`join`](Deferred::join), not a
    /// single N-way fan-out: a failure is propagated pairwise, so elements
    /// folded in later may already be running by the time the cancel
    /// reaches them.
    pub fn join_all<I>(deferreds: I) -> Deferred<Vec<T>>
    where
        I: IntoIterator<Item = Deferred<T>>,
    {
        let empty = Deferred::new(|completion: Continuation<Vec<T>>| {
            completion(Outcome::Success(Vec::new()));
            CancelHandle::noop()
        });
        deferreds.into_iter().fold(empty, |collected, next| {
            collected.join(next).map(|(mut values, value)| {
                values.push(value);
                values
            })
        })
    }
}

fn branch<T, U, V>(
    state: Arc<Mutex<JoinState<T, U>>>,
    sibling: SerialHandle,
    side: &'static str,
    store: fn(&mut JoinState<T, U>, V),
) -> impl FnOnce(Outcome<V>) + Send + 'static
where
    T: Send + 'static,
    U: Send + 'static,
    V: Send + 'static,
{
    move |outcome| {
        let (completion, result) = {
            let mut state = state.lock();
            state.exited += 1;
            if state.settled {
                trace!(side, "join already settled, ignoring branch");
                return;
            }
            let result = match outcome {
                Outcome::Success(value) => {
                    store(&mut *state, value);
                    state.both().map(Outcome::Success)
                }
                Outcome::Failure(err) => Some(Outcome::Failure(err)),
                Outcome::Cancelled => None,
            };
            let result = match result {
                Some(result) => result,
                None if state.exited == 2 => Outcome::Cancelled,
                None => return,
            };
            state.settled = true;
            (state.completion.take(), result)
        };

        match &result {
            Outcome::Failure(err) => {
                debug!(side, %err, "join branch failed, cancelling sibling");
                sibling.cancel();
            }
            Outcome::Cancelled => debug!("join branches exited without both succeeding"),
            Outcome::Success(_) => trace!("both join branches succeeded"),
        }
        if let Some(completion) = completion {
            completion(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{init_test_logging, manual, recorder};
    use crate::{Deferred, Error, Outcome};

    #[test]
    fn test_join_waits_for_both() {
        init_test_logging();
        let (left, left_leaf) = manual::<&'static str>();
        let (right, right_leaf) = manual::<i32>();
        let (record, seen) = recorder();

        left.join(right).request(record);
        right_leaf.settle(0, Outcome::Success(5));
        assert!(seen.lock().is_empty());
        left_leaf.settle(0, Outcome::Success("Hello"));
        assert_eq!(seen.lock()[0].clone().success(), Some(("Hello", 5)));
    }

    #[test]
    fn test_first_failure_cancels_sibling() {
        let (left, left_leaf) = manual::<i32>();
        let (right, right_leaf) = manual::<i32>();
        let (record, seen) = recorder();

        left.join(right).request(record);
        right_leaf.settle(0, Outcome::Failure(Error::msg("boom")));
        assert!(left_leaf.cancelled(0));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_failure());
    }

    #[test]
    fn test_synchronous_failure_skips_right() {
        let (right, right_leaf) = manual::<i32>();
        let (record, seen) = recorder();

        Deferred::<i32>::failure(Error::msg("boom"))
            .join(right)
            .request(record);
        assert_eq!(right_leaf.starts(), 0);
        assert!(seen.lock()[0].is_failure());
    }

    #[test]
    fn test_cancel_resolves_after_both_exit() {
        let (left, left_leaf) = manual::<i32>();
        let (right, right_leaf) = manual::<i32>();
        let (record, seen) = recorder();

        let handle = left.join(right).request(record);
        handle.cancel();
        assert!(left_leaf.cancelled(0));
        assert!(right_leaf.cancelled(0));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_cancelled());
    }

    #[test]
    fn test_cancel_then_success_resolves_cancelled() {
        let (left, left_leaf) = manual::<i32>();
        let (right, right_leaf) = manual::<i32>();
        let (record, seen) = recorder();

        left.join(right).request(record);
        left_leaf.settle(0, Outcome::Cancelled);
        assert!(seen.lock().is_empty());
        right_leaf.settle(0, Outcome::Success(1));
        assert!(seen.lock()[0].is_cancelled());
    }

    #[test]
    fn test_join_all_collects_in_input_order() {
        let (a, a_leaf) = manual::<i32>();
        let (b, b_leaf) = manual::<i32>();
        let (c, c_leaf) = manual::<i32>();
        let (record, seen) = recorder();

        Deferred::join_all(vec![a, b, c]).request(record);
        assert_eq!((a_leaf.starts(), b_leaf.starts(), c_leaf.starts()), (1, 1, 1));

        c_leaf.settle(0, Outcome::Success(3));
        a_leaf.settle(0, Outcome::Success(1));
        b_leaf.settle(0, Outcome::Success(2));
        assert_eq!(seen.lock()[0].clone().success(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_join_all_failure() {
        let (a, a_leaf) = manual::<i32>();
        let (b, b_leaf) = manual::<i32>();
        let (record, seen) = recorder();

        Deferred::join_all(vec![a, b]).request(record);
        a_leaf.settle(0, Outcome::Failure(Error::msg("first")));
        assert!(b_leaf.cancelled(0));
        assert!(seen.lock()[0].is_failure());
    }

    #[test]
    fn test_join_all_empty() {
        let (record, seen) = recorder();
        Deferred::<i32>::join_all(Vec::new()).request(record);
        assert_eq!(seen.lock()[0].clone().success(), Some(vec![]));
    }
}
