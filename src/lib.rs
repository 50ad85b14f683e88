//! Cold, composable, cancellable deferred results.
//!
//! A [`Deferred`] is a recipe: nothing happens until [`Deferred::request`]
//! is called. Each request starts the work, immediately returns a
//! [`CancelHandle`] and later delivers exactly one [`Outcome`] to the
//! continuation.
//!
//! ```
//! use requester::{Deferred, Outcome};
//!
//! let greeting = Deferred::success("Hello".to_string())
//!     .then(|head| Deferred::success(head + "World"))
//!     .map(|text| text + "!!!");
//!
//! greeting.request(|outcome| match outcome {
//!     Outcome::Success(text) => assert_eq!(text, "HelloWorld!!!"),
//!     other => panic!("unexpected {:?}", other),
//! });
//! ```
//!
//! Continuations may be invoked from any thread. Combinators keep their
//! coordination state behind a lock and never hold it while calling out.
pub mod cancel;
pub mod deferred;
pub mod join;
pub mod outcome;
pub mod pair;
pub mod race;
pub mod scheduler;

#[cfg(test)]
mod test_utils;

pub use cancel::{CancelHandle, SerialHandle};
pub use deferred::{Continuation, Deferred};
pub use outcome::{Either, Outcome};
pub use pair::Consumer;
pub use scheduler::{
    CancelFlag, ExecutionContext, Inline, Scheduler, SchedulerConfig, ThreadScheduler,
};

use std::sync::Arc;
use thiserror::Error;

type BoxedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The failure carried by [`Outcome::Failure`].
///
/// Leaf errors are opaque to the combinators; they are only ever handed
/// back to the caller.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("{0}")]
    Failed(BoxedError),
    #[error("the deferred dropped its continuation without delivering an outcome")]
    ProducerDropped,
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl Error {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Failed(Arc::new(err))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Error::new(Message(message.into()))
    }

    /// Recovers the concrete leaf error, if it has type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Error::Failed(err) => err.downcast_ref::<E>(),
            Error::ProducerDropped => None,
        }
    }
}
