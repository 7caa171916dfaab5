//! Effect descriptors.
//!
//! A saga never performs side effects itself. It yields an [`Effect`], plain
//! data naming the operation, and the runtime performs it and resumes the saga
//! with the result. Every descriptor kind is a variant of one closed enum, so
//! the interpreter's dispatch is a single exhaustive `match`.
//!
//! The free functions in this module are the constructors saga authors use:
//!
//! ```ignore
//! use sagasync::effect::{call, fork, put, take};
//!
//! let next = take("FETCH");
//! let worker = fork(|args| fetch_user(args), vec![Value::from(42)]);
//! let done = put(Event::new("FETCH_DONE"));
//! ```

use crate::channel::{BufferPolicy, Channel};
use crate::error::SagaError;
use crate::pattern::{ActionCreator, Pattern};
use crate::runtime::Task;
use crate::saga::Saga;
use crate::types::{Event, Value};
use serde_json::Value as Json;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

/// A boxed, non-`Send` future resolving to a saga result.
pub type LocalFuture = Pin<Box<dyn Future<Output = Result<Value, SagaError>>>>;

/// What an invoked function produced.
///
/// `CALL` and `FORK` accept functions returning a plain result, another saga
/// to drive, a future to await, or a sleep on the runtime clock.
pub enum CallOutcome {
    /// A result available now.
    Ready(Result<Value, SagaError>),
    /// A saga the runtime drives to completion.
    Saga(Box<dyn Saga>),
    /// A future the runtime polls until it resolves.
    Future(LocalFuture),
    /// Resolves with unit after the duration elapses on the runtime clock.
    Sleep(Duration),
}

impl CallOutcome {
    /// A successful result.
    pub fn ok(value: impl Into<Value>) -> Self {
        Self::Ready(Ok(value.into()))
    }

    /// A failed result.
    pub fn err(error: impl Into<SagaError>) -> Self {
        Self::Ready(Err(error.into()))
    }

    /// A saga to drive.
    pub fn saga(saga: impl Saga + 'static) -> Self {
        Self::Saga(Box::new(saga))
    }

    /// A future to await.
    pub fn future(future: impl Future<Output = Result<Value, SagaError>> + 'static) -> Self {
        Self::Future(Box::pin(future))
    }
}

impl From<Result<Value, SagaError>> for CallOutcome {
    fn from(result: Result<Value, SagaError>) -> Self {
        Self::Ready(result)
    }
}

impl From<Value> for CallOutcome {
    fn from(value: Value) -> Self {
        Self::Ready(Ok(value))
    }
}

impl fmt::Debug for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Saga(_) => f.write_str("Saga(..)"),
            Self::Future(_) => f.write_str("Future(..)"),
            Self::Sleep(duration) => f.debug_tuple("Sleep").field(duration).finish(),
        }
    }
}

type CallFn = dyn Fn(&Value, Vec<Value>) -> CallOutcome;

/// A function `CALL` and `FORK` can invoke, with a diagnostic name.
///
/// The first argument is the bound context (`Value::Unit` when unbound).
#[derive(Clone)]
pub struct Callable {
    name: Rc<str>,
    func: Rc<CallFn>,
}

impl Callable {
    /// Wraps a context-free function.
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> CallOutcome + 'static,
    {
        Self {
            name: Rc::from(name),
            func: Rc::new(move |_: &Value, args: Vec<Value>| func(args)),
        }
    }

    /// Wraps a function that receives the bound context.
    pub fn bound<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Value, Vec<Value>) -> CallOutcome + 'static,
    {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    /// Returns the diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the function.
    #[must_use]
    pub fn invoke(&self, context: &Value, args: Vec<Value>) -> CallOutcome {
        (self.func)(context, args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name)
    }
}

/// The completion callback handed to a `CPS` function.
///
/// Only the first invocation counts; later ones are ignored.
#[derive(Clone)]
pub struct CpsCallback(Rc<dyn Fn(Result<Value, SagaError>)>);

impl CpsCallback {
    pub(crate) fn new(f: impl Fn(Result<Value, SagaError>) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Completes the effect with a result.
    pub fn call(&self, result: Result<Value, SagaError>) {
        (self.0)(result);
    }

    /// Completes the effect successfully.
    pub fn ok(&self, value: impl Into<Value>) {
        self.call(Ok(value.into()));
    }

    /// Completes the effect with an error.
    pub fn err(&self, error: impl Into<SagaError>) {
        self.call(Err(error.into()));
    }
}

impl fmt::Debug for CpsCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CpsCallback(..)")
    }
}

type CpsFn = dyn Fn(&Value, Vec<Value>, CpsCallback);

/// A callback-style function for `CPS`.
#[derive(Clone)]
pub struct CpsFunction {
    name: Rc<str>,
    func: Rc<CpsFn>,
}

impl CpsFunction {
    /// Wraps a callback-style function that receives the bound context.
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Value, Vec<Value>, CpsCallback) + 'static,
    {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    /// Returns the diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, context: &Value, args: Vec<Value>, callback: CpsCallback) {
        (self.func)(context, args, callback);
    }
}

impl fmt::Debug for CpsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpsFunction({})", self.name)
    }
}

/// A state selector for `SELECT`.
#[derive(Clone)]
pub struct Selector(Rc<dyn Fn(&Json, &[Value]) -> Value>);

impl Selector {
    /// Wraps a selector function.
    pub fn new(f: impl Fn(&Json, &[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub(crate) fn select(&self, state: &Json, args: &[Value]) -> Value {
        (self.0)(state, args)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Selector(..)")
    }
}

/// Where a `TAKE` reads from.
#[derive(Debug, Clone)]
pub enum TakeSource {
    /// The event bus, filtered by a pattern.
    Pattern(Pattern),
    /// A channel.
    Channel(Channel),
}

impl From<Pattern> for TakeSource {
    fn from(pattern: Pattern) -> Self {
        Self::Pattern(pattern)
    }
}

impl From<&str> for TakeSource {
    fn from(tag: &str) -> Self {
        Self::Pattern(tag.into())
    }
}

impl From<String> for TakeSource {
    fn from(tag: String) -> Self {
        Self::Pattern(tag.into())
    }
}

impl From<ActionCreator> for TakeSource {
    fn from(creator: ActionCreator) -> Self {
        Self::Pattern(creator.into())
    }
}

impl From<&ActionCreator> for TakeSource {
    fn from(creator: &ActionCreator) -> Self {
        Self::Pattern(creator.into())
    }
}

impl From<Vec<Pattern>> for TakeSource {
    fn from(patterns: Vec<Pattern>) -> Self {
        Self::Pattern(patterns.into())
    }
}

impl<const N: usize> From<[&str; N]> for TakeSource {
    fn from(tags: [&str; N]) -> Self {
        Self::Pattern(tags.into())
    }
}

impl From<Channel> for TakeSource {
    fn from(channel: Channel) -> Self {
        Self::Channel(channel)
    }
}

impl From<&Channel> for TakeSource {
    fn from(channel: &Channel) -> Self {
        Self::Channel(channel.clone())
    }
}

/// `TAKE {pattern | channel, maybe}`.
#[derive(Debug, Clone)]
pub struct TakeEffect {
    /// Pattern or channel.
    pub source: TakeSource,
    /// Deliver the end marker instead of terminating the saga.
    pub maybe: bool,
}

/// `PUT {action, channel, resolve}`.
#[derive(Debug, Clone)]
pub struct PutEffect {
    /// The event (or value, for channels) to emit.
    pub action: Value,
    /// Target channel; `None` for the event bus.
    pub channel: Option<Channel>,
    /// Wait for the dispatch to settle before resuming.
    pub resolve: bool,
}

/// `CALL {context, fn, args}`.
#[derive(Debug, Clone)]
pub struct CallEffect {
    /// Bound context.
    pub context: Value,
    /// The function.
    pub func: Callable,
    /// Arguments.
    pub args: Vec<Value>,
}

/// `CPS {context, fn, args}`.
#[derive(Debug, Clone)]
pub struct CpsEffect {
    /// Bound context.
    pub context: Value,
    /// The callback-style function.
    pub func: CpsFunction,
    /// Arguments; the completion callback is passed separately.
    pub args: Vec<Value>,
}

/// `FORK {context, fn, args, detached}`.
#[derive(Debug, Clone)]
pub struct ForkEffect {
    /// Bound context.
    pub context: Value,
    /// The function started as a new task.
    pub func: Callable,
    /// Arguments.
    pub args: Vec<Value>,
    /// Isolate the task's failure and cancellation from its creator.
    pub detached: bool,
}

/// One task or several.
#[derive(Debug, Clone)]
pub enum Targets {
    /// A single task; results are delivered unwrapped.
    One(Task),
    /// Several tasks; results are delivered as a list.
    Many(Vec<Task>),
}

impl Targets {
    /// Returns the tasks as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Task] {
        match self {
            Self::One(task) => std::slice::from_ref(task),
            Self::Many(tasks) => tasks,
        }
    }
}

/// `CANCEL {task | task[] | self}`.
#[derive(Debug, Clone)]
pub enum CancelTarget {
    /// The yielding task itself.
    SelfTask,
    /// The given tasks.
    Tasks(Targets),
}

/// `RACE {name -> Effect}`, in declaration order.
#[derive(Debug, Clone)]
pub struct RaceEffect {
    /// Named branches.
    pub branches: Vec<(String, Effect)>,
}

/// `SELECT {selector, args}`.
#[derive(Debug, Clone)]
pub struct SelectEffect {
    /// The selector.
    pub selector: Selector,
    /// Extra selector arguments.
    pub args: Vec<Value>,
}

/// `ACTION_CHANNEL {pattern, buffer}`.
#[derive(Debug, Clone)]
pub struct ActionChannelEffect {
    /// Events to capture.
    pub pattern: Pattern,
    /// Buffer policy; the runtime default when `None`.
    pub buffer: Option<BufferPolicy>,
}

/// An effect descriptor.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Wait for an event or a channel value.
    Take(TakeEffect),
    /// Emit an event or put a channel value.
    Put(PutEffect),
    /// Invoke a function and wait for its result.
    Call(CallEffect),
    /// Invoke a callback-style function.
    Cps(CpsEffect),
    /// Start a task without waiting.
    Fork(ForkEffect),
    /// Wait for tasks to settle.
    Join(Targets),
    /// Cancel tasks.
    Cancel(CancelTarget),
    /// First branch to settle wins.
    Race(RaceEffect),
    /// Every effect, in parallel.
    All(Vec<Effect>),
    /// Read the store state.
    Select(SelectEffect),
    /// Open a channel fed by matching events.
    ActionChannel(ActionChannelEffect),
    /// Ask whether the task is being cancelled.
    Cancelled,
    /// Drain a channel's buffer.
    Flush(Channel),
}

impl Effect {
    /// Returns the descriptor tag.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Take(_) => "TAKE",
            Self::Put(_) => "PUT",
            Self::Call(_) => "CALL",
            Self::Cps(_) => "CPS",
            Self::Fork(_) => "FORK",
            Self::Join(_) => "JOIN",
            Self::Cancel(_) => "CANCEL",
            Self::Race(_) => "RACE",
            Self::All(_) => "ALL",
            Self::Select(_) => "SELECT",
            Self::ActionChannel(_) => "ACTION_CHANNEL",
            Self::Cancelled => "CANCELLED",
            Self::Flush(_) => "FLUSH",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Waits for the next matching event, or the next channel value.
///
/// If the source closes first, the saga terminates normally.
pub fn take(source: impl Into<TakeSource>) -> Effect {
    Effect::Take(TakeEffect {
        source: source.into(),
        maybe: false,
    })
}

/// Like [`take`], but a closed source resumes the saga with [`Value::End`].
pub fn take_maybe(source: impl Into<TakeSource>) -> Effect {
    Effect::Take(TakeEffect {
        source: source.into(),
        maybe: true,
    })
}

/// Dispatches an event (or [`Value::End`]) to the bus without waiting.
pub fn put(action: impl Into<Value>) -> Effect {
    Effect::Put(PutEffect {
        action: action.into(),
        channel: None,
        resolve: false,
    })
}

/// Dispatches an event and resumes with the store's dispatch result once
/// every taker has been served.
pub fn put_resolve(action: impl Into<Value>) -> Effect {
    Effect::Put(PutEffect {
        action: action.into(),
        channel: None,
        resolve: true,
    })
}

/// Puts a value onto a channel. Puts to a closed channel are dropped.
pub fn put_channel(channel: &Channel, value: impl Into<Value>) -> Effect {
    Effect::Put(PutEffect {
        action: value.into(),
        channel: Some(channel.clone()),
        resolve: false,
    })
}

/// Puts a value onto a channel; a closed channel throws into the saga.
pub fn put_channel_resolve(channel: &Channel, value: impl Into<Value>) -> Effect {
    Effect::Put(PutEffect {
        action: value.into(),
        channel: Some(channel.clone()),
        resolve: true,
    })
}

fn name_of<F>() -> &'static str {
    std::any::type_name::<F>()
}

/// Invokes `func(args)` and resumes with its result.
pub fn call<F>(func: F, args: Vec<Value>) -> Effect
where
    F: Fn(Vec<Value>) -> CallOutcome + 'static,
{
    call_fn(Callable::new(name_of::<F>(), func), args)
}

/// Invokes a prepared [`Callable`].
#[must_use]
pub fn call_fn(func: Callable, args: Vec<Value>) -> Effect {
    Effect::Call(CallEffect {
        context: Value::Unit,
        func,
        args,
    })
}

/// Invokes `func` with a bound context.
pub fn apply<F>(context: impl Into<Value>, func: F, args: Vec<Value>) -> Effect
where
    F: Fn(&Value, Vec<Value>) -> CallOutcome + 'static,
{
    Effect::Call(CallEffect {
        context: context.into(),
        func: Callable::bound(name_of::<F>(), func),
        args,
    })
}

/// Invokes a callback-style function.
pub fn cps<F>(func: F, args: Vec<Value>) -> Effect
where
    F: Fn(Vec<Value>, CpsCallback) + 'static,
{
    Effect::Cps(CpsEffect {
        context: Value::Unit,
        func: CpsFunction::new(name_of::<F>(), move |_, args, callback| func(args, callback)),
        args,
    })
}

/// Invokes a callback-style function with a bound context.
pub fn cps_with<F>(context: impl Into<Value>, func: F, args: Vec<Value>) -> Effect
where
    F: Fn(&Value, Vec<Value>, CpsCallback) + 'static,
{
    Effect::Cps(CpsEffect {
        context: context.into(),
        func: CpsFunction::new(name_of::<F>(), func),
        args,
    })
}

/// Starts an attached task running `func(args)`.
pub fn fork<F>(func: F, args: Vec<Value>) -> Effect
where
    F: Fn(Vec<Value>) -> CallOutcome + 'static,
{
    fork_fn(Callable::new(name_of::<F>(), func), args, false)
}

/// Starts a detached task running `func(args)`.
pub fn spawn<F>(func: F, args: Vec<Value>) -> Effect
where
    F: Fn(Vec<Value>) -> CallOutcome + 'static,
{
    fork_fn(Callable::new(name_of::<F>(), func), args, true)
}

/// Starts a task from a prepared [`Callable`].
#[must_use]
pub fn fork_fn(func: Callable, args: Vec<Value>, detached: bool) -> Effect {
    Effect::Fork(ForkEffect {
        context: Value::Unit,
        func,
        args,
        detached,
    })
}

/// Waits for a task; resumes with its result or rethrows its error.
#[must_use]
pub fn join(task: &Task) -> Effect {
    Effect::Join(Targets::One(task.clone()))
}

/// Waits for several tasks; resumes with their results in order.
#[must_use]
pub fn join_all(tasks: &[Task]) -> Effect {
    Effect::Join(Targets::Many(tasks.to_vec()))
}

/// Cancels a task. Settled tasks are left alone.
#[must_use]
pub fn cancel(task: &Task) -> Effect {
    Effect::Cancel(CancelTarget::Tasks(Targets::One(task.clone())))
}

/// Cancels several tasks.
#[must_use]
pub fn cancel_all(tasks: &[Task]) -> Effect {
    Effect::Cancel(CancelTarget::Tasks(Targets::Many(tasks.to_vec())))
}

/// Cancels the yielding task.
#[must_use]
pub const fn cancel_self() -> Effect {
    Effect::Cancel(CancelTarget::SelfTask)
}

/// Runs named branches; the first to settle wins.
pub fn race<K: Into<String>>(branches: impl IntoIterator<Item = (K, Effect)>) -> Effect {
    Effect::Race(RaceEffect {
        branches: branches
            .into_iter()
            .map(|(key, effect)| (key.into(), effect))
            .collect(),
    })
}

/// Runs every effect in parallel and resumes with the list of results.
pub fn all(effects: impl IntoIterator<Item = Effect>) -> Effect {
    Effect::All(effects.into_iter().collect())
}

/// Resumes with `selector(state, args)`.
pub fn select(selector: impl Fn(&Json, &[Value]) -> Value + 'static, args: Vec<Value>) -> Effect {
    Effect::Select(SelectEffect {
        selector: Selector::new(selector),
        args,
    })
}

/// Resumes with the whole store state.
#[must_use]
pub fn select_state() -> Effect {
    select(|state, _| Value::Data(state.clone()), Vec::new())
}

/// Opens a channel buffering every future event matching `pattern`.
pub fn action_channel(pattern: impl Into<Pattern>) -> Effect {
    Effect::ActionChannel(ActionChannelEffect {
        pattern: pattern.into(),
        buffer: None,
    })
}

/// Opens an action channel with an explicit buffer policy.
pub fn action_channel_with(pattern: impl Into<Pattern>, buffer: BufferPolicy) -> Effect {
    Effect::ActionChannel(ActionChannelEffect {
        pattern: pattern.into(),
        buffer: Some(buffer),
    })
}

/// Resumes with whether the task is running its cancellation cleanup.
#[must_use]
pub const fn cancelled() -> Effect {
    Effect::Cancelled
}

/// Drains a channel's buffer.
#[must_use]
pub fn flush(channel: &Channel) -> Effect {
    Effect::Flush(channel.clone())
}

/// Resumes with unit once `duration` has elapsed on the runtime clock.
#[must_use]
pub fn delay(duration: Duration) -> Effect {
    call_fn(
        Callable::new("delay", move |_| CallOutcome::Sleep(duration)),
        Vec::new(),
    )
}

/// Builds a bus event; shorthand for `put(Event::new(tag))`.
pub fn put_event(tag: impl Into<String>) -> Effect {
    put(Event::new(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_descriptor_fields() {
        let Effect::Take(t) = take_maybe("A") else {
            panic!("expected TAKE");
        };
        assert!(t.maybe);
        assert!(matches!(t.source, TakeSource::Pattern(Pattern::Tag(ref tag)) if tag == "A"));

        let Effect::Put(p) = put_resolve(Event::new("B")) else {
            panic!("expected PUT");
        };
        assert!(p.resolve);
        assert!(p.channel.is_none());
        assert_eq!(p.action, Value::Event(Event::new("B")));

        let Effect::Fork(f) = spawn(|_| CallOutcome::ok(1), vec![Value::from(2)]) else {
            panic!("expected FORK");
        };
        assert!(f.detached);
        assert_eq!(f.args, vec![Value::from(2)]);
    }

    #[test]
    fn race_keeps_declaration_order() {
        let Effect::Race(r) = race([("b", take("B")), ("a", take("A"))]) else {
            panic!("expected RACE");
        };
        let keys: Vec<&str> = r.branches.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn tags_name_every_kind() {
        let channel = Channel::default();
        let effects = [
            (take("A"), "TAKE"),
            (put_event("A"), "PUT"),
            (delay(Duration::from_millis(1)), "CALL"),
            (cps(|_, cb| cb.ok(()), vec![]), "CPS"),
            (fork(|_| CallOutcome::ok(()), vec![]), "FORK"),
            (cancel_self(), "CANCEL"),
            (race([("a", take("A"))]), "RACE"),
            (all([take("A")]), "ALL"),
            (select_state(), "SELECT"),
            (action_channel("*"), "ACTION_CHANNEL"),
            (cancelled(), "CANCELLED"),
            (flush(&channel), "FLUSH"),
        ];
        for (effect, tag) in effects {
            assert_eq!(effect.tag(), tag);
            assert_eq!(effect.to_string(), tag);
        }
    }

    #[test]
    fn apply_passes_context() {
        let Effect::Call(c) = apply("ctx", |ctx, args| CallOutcome::ok(vec![ctx.clone(), args[0].clone()]), vec![Value::from(1)]) else {
            panic!("expected CALL");
        };
        let CallOutcome::Ready(Ok(value)) = c.func.invoke(&c.context, c.args) else {
            panic!("expected ready result");
        };
        assert_eq!(value, Value::List(vec![Value::from("ctx"), Value::from(1)]));
    }
}
