//! The scheduling capability leaf recipes are built on.
//!
//! The combinators never schedule anything themselves. A leaf recipe uses
//! a [`Scheduler`] to delay or offload work and returns the scheduler's
//! [`CancelHandle`] as its own.
//!
//! [`ThreadScheduler`] backs every job with a fresh std thread; it is meant
//! for tests and small tools, not as a pool.

use crate::CancelHandle;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, trace};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere a callback can be delivered.
pub trait ExecutionContext: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs jobs on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl ExecutionContext for Inline {
    fn execute(&self, job: Job) {
        job()
    }
}

/// Best-effort cancellation flag handed to work started with
/// [`Scheduler::run`].
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release)
    }
}

pub trait Scheduler {
    /// Invokes `callback` exactly once: with `false` after `delay` has
    /// elapsed, or with `true` as soon as the returned handle is cancelled
    /// before that.
    fn after<F>(&self, delay: Duration, callback: F) -> CancelHandle
    where
        F: FnOnce(bool) + Send + 'static;

    /// Runs `work` in the background and delivers its result on
    /// `deliver_on`. Cancelling the returned handle raises the flag `work`
    /// can consult; it does not stop `work` or the delivery.
    fn run<T, W, C, E>(&self, work: W, deliver_on: E, completion: C) -> CancelHandle
    where
        T: Send + 'static,
        W: FnOnce(&CancelFlag) -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
        E: ExecutionContext + 'static;
}

/// Settings for [`ThreadScheduler`] worker threads.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    thread_name: String,
    stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            thread_name: String::from("requester-worker"),
            stack_size: None,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        SchedulerConfig::default()
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

/// A [`Scheduler`] that spawns one thread per job.
#[derive(Debug, Clone, Default)]
pub struct ThreadScheduler {
    config: Arc<SchedulerConfig>,
}

struct Timer {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        ThreadScheduler::default()
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        ThreadScheduler {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn spawn(&self, job: Job) {
        let mut builder = thread::Builder::new().name(self.config.thread_name.clone());
        if let Some(bytes) = self.config.stack_size {
            builder = builder.stack_size(bytes);
        }
        // A job that cannot be spawned is dropped, and with it whatever
        // continuation it owned.
        if let Err(err) = builder.spawn(job) {
            error!(%err, "failed to spawn scheduler thread");
        }
    }
}

impl ExecutionContext for ThreadScheduler {
    fn execute(&self, job: Job) {
        self.spawn(job)
    }
}

impl Scheduler for ThreadScheduler {
    fn after<F>(&self, delay: Duration, callback: F) -> CancelHandle
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let timer = Arc::new(Timer {
            cancelled: Mutex::new(false),
            wakeup: Condvar::new(),
        });
        let waiting = timer.clone();
        let deadline = Instant::now() + delay;
        self.spawn(Box::new(move || {
            let mut cancelled = waiting.cancelled.lock();
            while !*cancelled {
                if waiting.wakeup.wait_until(&mut cancelled, deadline).timed_out() {
                    break;
                }
            }
            let was_cancelled = *cancelled;
            drop(cancelled);
            trace!(was_cancelled, "timer fired");
            callback(was_cancelled);
        }));
        CancelHandle::from_fn(move || {
            *timer.cancelled.lock() = true;
            timer.wakeup.notify_one();
        })
    }

    fn run<T, W, C, E>(&self, work: W, deliver_on: E, completion: C) -> CancelHandle
    where
        T: Send + 'static,
        W: FnOnce(&CancelFlag) -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
        E: ExecutionContext + 'static,
    {
        let flag = CancelFlag::default();
        let observed = flag.clone();
        self.spawn(Box::new(move || {
            let result = work(&observed);
            deliver_on.execute(Box::new(move || completion(result)));
        }));
        CancelHandle::from_fn(move || flag.cancel())
    }
}
