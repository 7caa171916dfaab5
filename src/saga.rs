//! The saga driving protocol.
//!
//! A saga is a resumable state machine. The runtime starts it, resumes it with
//! the result of each effect it yields (or throws an error into it), and
//! observes when it completes:
//!
//! ```text
//! resume(Start | Value | Error | Cancel | Terminate) -> Yield(effect) | Done(value) | Threw(error)
//! ```
//!
//! `Cancel` asks the saga to run its cleanup path; effects yielded from there
//! still execute, and `CANCELLED` reports true. `Terminate` is delivered when
//! a plain `TAKE` hits a closed source and the saga should unwind normally.
//!
//! Two ways to write one:
//!
//! - [`FnSaga`]: a closure over explicit state, for small hand-written machines.
//! - [`AsyncSaga`]: an `async` block that awaits effects through a [`Co`]
//!   handle. Resuming with `Cancel` or `Terminate` makes the pending await
//!   return [`SagaError::Cancelled`] or [`SagaError::Terminated`], so `?`
//!   unwinds the saga and a `match` can run cleanup first.

use crate::effect::{self, CallOutcome, Callable, Effect};
use crate::error::{EffectError, SagaError};
use crate::types::Value;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Input a saga is resumed with.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// First resumption.
    Start,
    /// The yielded effect produced a value.
    Value(Value),
    /// The yielded effect failed; the error is thrown at the yield point.
    Error(SagaError),
    /// The task is cancelled; run cleanup.
    Cancel,
    /// The take source closed; unwind normally.
    Terminate,
}

/// What a saga produced when resumed.
#[derive(Debug)]
pub enum Step {
    /// Suspend on an effect.
    Yield(Effect),
    /// Completed with a value.
    Done(Value),
    /// Completed with an uncaught error.
    Threw(SagaError),
}

/// A resumable coroutine that yields effects.
pub trait Saga {
    /// Advances the saga to its next suspension point or completion.
    fn resume(&mut self, input: Resume) -> Step;
}

impl<S: Saga + ?Sized> Saga for Box<S> {
    fn resume(&mut self, input: Resume) -> Step {
        (**self).resume(input)
    }
}

/// A saga backed by a closure.
pub struct FnSaga<F> {
    step: F,
}

impl<F> FnSaga<F>
where
    F: FnMut(Resume) -> Step,
{
    /// Wraps a step function.
    pub const fn new(step: F) -> Self {
        Self { step }
    }
}

impl<F> Saga for FnSaga<F>
where
    F: FnMut(Resume) -> Step,
{
    fn resume(&mut self, input: Resume) -> Step {
        (self.step)(input)
    }
}

impl<F> fmt::Debug for FnSaga<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSaga(..)")
    }
}

/// Creates a saga from a step function.
pub const fn from_fn<F>(step: F) -> FnSaga<F>
where
    F: FnMut(Resume) -> Step,
{
    FnSaga::new(step)
}

/// A saga that yields the given effects in order and completes with the
/// last result. Errors and interrupts end it immediately.
pub fn sequence(effects: impl IntoIterator<Item = Effect>) -> impl Saga {
    let mut effects = effects.into_iter();
    let mut last = Value::Unit;
    from_fn(move |input| {
        match input {
            Resume::Start => {}
            Resume::Value(value) => last = value,
            Resume::Error(err) => return Step::Threw(err),
            Resume::Cancel => return Step::Threw(SagaError::Cancelled),
            Resume::Terminate => return Step::Done(Value::Unit),
        }
        match effects.next() {
            Some(effect) => Step::Yield(effect),
            None => Step::Done(std::mem::take(&mut last)),
        }
    })
}

#[derive(Default)]
struct Exchange {
    outbox: Option<Effect>,
    inbox: Option<Resume>,
}

/// The handle an async saga uses to yield effects.
#[derive(Clone)]
pub struct Co {
    exchange: Rc<RefCell<Exchange>>,
}

impl Co {
    /// Yields an effect and waits for its result.
    pub fn effect(&self, effect: Effect) -> EffectFuture {
        EffectFuture {
            co: self.clone(),
            effect: Some(effect),
        }
    }

    /// Returns true while the task runs its cancellation cleanup.
    pub async fn cancelled(&self) -> Result<bool, SagaError> {
        let value = self.effect(effect::cancelled()).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

impl fmt::Debug for Co {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Co(..)")
    }
}

/// Future returned by [`Co::effect`].
#[must_use = "effects do nothing unless awaited"]
pub struct EffectFuture {
    co: Co,
    effect: Option<Effect>,
}

impl Future for EffectFuture {
    type Output = Result<Value, SagaError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut exchange = this.co.exchange.borrow_mut();
        if let Some(effect) = this.effect.take() {
            exchange.outbox = Some(effect);
            return Poll::Pending;
        }
        match exchange.inbox.take() {
            Some(Resume::Value(value)) => Poll::Ready(Ok(value)),
            Some(Resume::Error(err)) => Poll::Ready(Err(err)),
            Some(Resume::Cancel) => Poll::Ready(Err(SagaError::Cancelled)),
            Some(Resume::Terminate) => Poll::Ready(Err(SagaError::Terminated)),
            Some(Resume::Start) | None => Poll::Pending,
        }
    }
}

type SagaFuture = Pin<Box<dyn Future<Output = Result<Value, SagaError>>>>;

/// A saga written as an `async` block.
pub struct AsyncSaga {
    exchange: Rc<RefCell<Exchange>>,
    future: Option<SagaFuture>,
}

impl AsyncSaga {
    fn poll_body(&mut self) -> Step {
        let Some(future) = self.future.as_mut() else {
            return Step::Done(Value::Unit);
        };
        let mut cx = Context::from_waker(Waker::noop());
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                self.future = None;
                match result {
                    Ok(value) => Step::Done(value),
                    Err(err) => Step::Threw(err),
                }
            }
            Poll::Pending => {
                let yielded = self.exchange.borrow_mut().outbox.take();
                match yielded {
                    Some(effect) => Step::Yield(effect),
                    None => {
                        self.future = None;
                        Step::Threw(EffectError::ForeignAwait.into())
                    }
                }
            }
        }
    }
}

impl Saga for AsyncSaga {
    fn resume(&mut self, input: Resume) -> Step {
        match input {
            Resume::Start => {}
            other => self.exchange.borrow_mut().inbox = Some(other),
        }
        self.poll_body()
    }
}

impl fmt::Debug for AsyncSaga {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSaga")
            .field("finished", &self.future.is_none())
            .finish()
    }
}

/// Creates a saga from an async body.
///
/// ```ignore
/// let saga = saga::from_async(|co| async move {
///     let event = co.effect(effect::take("PING")).await?;
///     co.effect(effect::put(Event::new("PONG"))).await?;
///     Ok::<_, SagaError>(event)
/// });
/// ```
pub fn from_async<F, Fut>(body: F) -> AsyncSaga
where
    F: FnOnce(Co) -> Fut,
    Fut: Future<Output = Result<Value, SagaError>> + 'static,
{
    let exchange = Rc::new(RefCell::new(Exchange::default()));
    let co = Co {
        exchange: Rc::clone(&exchange),
    };
    AsyncSaga {
        exchange,
        future: Some(Box::pin(body(co))),
    }
}

/// A forked function that is invoked only when its task is first started.
///
/// The callable runs on `Resume::Start`; whatever it returns is then driven
/// as the task's body.
pub(crate) struct Deferred {
    call: Option<(Callable, Value, Vec<Value>)>,
    body: Option<Box<dyn Saga>>,
}

impl Saga for Deferred {
    fn resume(&mut self, input: Resume) -> Step {
        if let Some(body) = self.body.as_mut() {
            return body.resume(input);
        }
        match (input, self.call.take()) {
            (Resume::Start, Some((func, context, args))) => {
                let body = self.body.insert(from_outcome(func.invoke(&context, args)));
                body.resume(Resume::Start)
            }
            (Resume::Error(err), _) => Step::Threw(err),
            (Resume::Cancel, _) => Step::Threw(SagaError::Cancelled),
            _ => Step::Done(Value::Unit),
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("invoked", &self.call.is_none())
            .finish()
    }
}

/// Wraps `func(context, args)` so the call happens at the task's first step.
pub(crate) fn deferred(func: Callable, context: Value, args: Vec<Value>) -> Box<dyn Saga> {
    Box::new(Deferred {
        call: Some((func, context, args)),
        body: None,
    })
}

/// Adapts a non-saga [`CallOutcome`] so it can run as a forked task.
///
/// The saga yields a single `CALL` resolving to the outcome, then completes
/// with its result.
pub(crate) fn from_outcome(outcome: CallOutcome) -> Box<dyn Saga> {
    if let CallOutcome::Saga(saga) = outcome {
        return saga;
    }
    let slot = Rc::new(RefCell::new(Some(outcome)));
    let once = Callable::new("fork", move |_| {
        slot.borrow_mut()
            .take()
            .unwrap_or_else(|| CallOutcome::err(EffectError::OutcomeConsumed))
    });
    let mut yielded = false;
    Box::new(from_fn(move |input| match input {
        Resume::Start if !yielded => {
            yielded = true;
            Step::Yield(effect::call_fn(once.clone(), Vec::new()))
        }
        Resume::Value(value) => Step::Done(value),
        Resume::Error(err) => Step::Threw(err),
        Resume::Cancel => Step::Threw(SagaError::Cancelled),
        Resume::Start | Resume::Terminate => Step::Done(Value::Unit),
    }))
}
