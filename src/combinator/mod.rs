//! Declarative helpers built from the effect primitives.
//!
//! Every helper returns an ordinary [`Effect`] and runs as an ordinary saga,
//! so it is cancelled, joined and failed exactly like hand-written code:
//!
//! - [`take_every`]: fork a worker for each matching event
//! - [`take_latest`]: like `take_every`, cancelling the previous worker first
//! - [`take_leading`]: run one worker at a time, ignoring events meanwhile
//! - [`throttle`]: at most one worker per window, keeping the newest event
//! - [`debounce`]: start a worker once events stop arriving for a window
//! - [`timeout`]: fail an effect that does not settle in time
//! - [`retry`]: call a function again after failures, with a delay
//!
//! The pattern helpers fork an attached watcher task and resume the caller
//! with its [`Task`](crate::runtime::Task) handle.

pub mod retry;
pub mod throttle;
pub mod timeout;
pub mod watch;

pub use retry::{RetryPolicy, retry, retry_with};
pub use throttle::{debounce, throttle};
pub use timeout::{TIMEOUT_KEY, VALUE_KEY, timeout};
pub use watch::{take_every, take_latest, take_leading};

use crate::effect::{self, CallOutcome, Callable, Effect};
use crate::error::SagaError;
use crate::saga::{self, Co};
use crate::types::Value;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// A worker function started by the pattern helpers.
///
/// It receives the triggering event (or channel value).
#[derive(Clone)]
pub struct Worker {
    name: Rc<str>,
    func: Rc<dyn Fn(Value) -> CallOutcome>,
}

impl Worker {
    /// Wraps a function.
    pub fn new(name: &str, func: impl Fn(Value) -> CallOutcome + 'static) -> Self {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    pub(crate) fn from_fn<F>(func: F) -> Self
    where
        F: Fn(Value) -> CallOutcome + 'static,
    {
        Self::new(std::any::type_name::<F>(), func)
    }

    /// Returns the diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn callable(&self) -> Callable {
        let func = Rc::clone(&self.func);
        Callable::new(&self.name, move |args| {
            func(args.into_iter().next().unwrap_or_default())
        })
    }

    /// `FORK` of this worker with `input`.
    pub(crate) fn fork(&self, input: Value) -> Effect {
        effect::fork_fn(self.callable(), vec![input], false)
    }

    /// `CALL` of this worker with `input`.
    pub(crate) fn call(&self, input: Value) -> Effect {
        effect::call_fn(self.callable(), vec![input])
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Worker").field(&self.name).finish()
    }
}

/// Wraps an async body so every invocation starts a fresh saga.
fn saga_callable<F, Fut>(name: &str, body: F) -> Callable
where
    F: Fn(Co) -> Fut + 'static,
    Fut: Future<Output = Result<Value, SagaError>> + 'static,
{
    let body = Rc::new(body);
    Callable::new(name, move |_| {
        let body = Rc::clone(&body);
        CallOutcome::saga(saga::from_async(move |co| body(co)))
    })
}

/// `FORK` of a helper saga.
fn fork_helper<F, Fut>(name: &str, body: F) -> Effect
where
    F: Fn(Co) -> Fut + 'static,
    Fut: Future<Output = Result<Value, SagaError>> + 'static,
{
    effect::fork_fn(saga_callable(name, body), Vec::new(), false)
}

/// `CALL` of a helper saga.
fn call_helper<F, Fut>(name: &str, body: F) -> Effect
where
    F: Fn(Co) -> Fut + 'static,
    Fut: Future<Output = Result<Value, SagaError>> + 'static,
{
    effect::call_fn(saga_callable(name, body), Vec::new())
}
