//! The saga runtime: task tree, effect interpreter and host scheduler.
//!
//! A [`Runtime`] owns every live task and every pending effect. It is a
//! single-threaded, run-to-suspension interpreter: one saga is driven at a
//! time until it yields an effect that cannot complete synchronously, then
//! control returns to the run loop, which drains four sources in order:
//!
//! 1. wakeups delivered by channel and callback completions,
//! 2. futures whose wakers fired,
//! 3. queued jobs (task starts, bus dispatches, bus end),
//! 4. timers due on the virtual clock.
//!
//! Time only moves when the host calls [`Runtime::advance`] or
//! [`Runtime::run_until_stalled`], which makes every schedule reproducible.
//!
//! # Module Structure
//!
//! - [`task`]: task handles and runtime-side task records
//! - [`bus`]: pattern takers and action-channel subscribers
//! - [`store`]: the host state container contract
//! - [`timer`]: deadline heap for `delay`
//! - [`wake`]: waker plumbing for future-backed `CALL`s
//! - [`monitor`]: effect lifecycle hooks and counters

mod builder;
pub mod bus;
mod interpret;
pub mod monitor;
pub mod store;
pub mod task;
pub mod timer;
mod tree;
pub mod wake;

pub use builder::RuntimeBuilder;
pub use monitor::{RuntimeStats, SagaMonitor};
pub use store::{NullStore, Store};
pub use task::Task;

use crate::channel::Channel;
use crate::config::RuntimeConfig;
use crate::error::{ChannelError, SagaError};
use crate::saga::{self, Co, Resume, Saga};
use crate::tracing_compat::{debug, info, warn};
use crate::types::{CancelReason, EffectId, Event, TaskId, Time, Value};
use crate::util::Arena;
use bus::EventBus;
use interpret::EffectNode;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use task::{TaskLink, TaskRecord};
use timer::TimerHeap;
use wake::WakeQueue;

/// How an effect settled.
#[derive(Debug, Clone)]
pub(crate) enum Settle {
    Ok(Value),
    Err(SagaError),
    /// The take source closed under a plain `TAKE`.
    End,
}

impl Settle {
    pub(crate) fn into_resume(self) -> Resume {
        match self {
            Self::Ok(value) => Resume::Value(value),
            Self::Err(err) => Resume::Error(err),
            Self::End => Resume::Terminate,
        }
    }
}

impl From<Result<Value, SagaError>> for Settle {
    fn from(result: Result<Value, SagaError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(err) => Self::Err(err),
        }
    }
}

/// A completion delivered from outside the interpreter's call stack.
#[derive(Debug)]
pub(crate) struct Wakeup {
    pub(crate) effect: EffectId,
    pub(crate) settle: Settle,
}

pub(crate) type Inbox = Rc<RefCell<VecDeque<Wakeup>>>;

/// Deferred interpreter work.
#[derive(Debug)]
pub(crate) enum Job {
    /// Run a forked task up to its first suspension.
    Start(TaskId),
    /// Dispatch an event to the store and the bus; optionally settle a
    /// resolving `PUT` with the result.
    Dispatch {
        event: Event,
        reply: Option<EffectId>,
    },
    /// Close the bus.
    End,
}

type ErrorHook = Box<dyn FnMut(&Task, &SagaError)>;

/// A single-threaded saga interpreter bound to a store.
pub struct Runtime {
    store: Box<dyn Store>,
    config: RuntimeConfig,
    tasks: Arena<TaskRecord>,
    effects: Arena<EffectNode>,
    bus: EventBus,
    inbox: Inbox,
    woken: Arc<WakeQueue>,
    jobs: VecDeque<Job>,
    timers: TimerHeap,
    now: Time,
    on_error: Option<ErrorHook>,
    monitor: Option<Box<dyn SagaMonitor>>,
    stats: RuntimeStats,
}

impl Runtime {
    /// Creates a runtime over `store` with the default configuration.
    pub fn new(store: impl Store + 'static) -> Self {
        Self::from_parts(Box::new(store), RuntimeConfig::default(), None, None)
    }

    /// Returns a builder for a customised runtime.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn from_parts(
        store: Box<dyn Store>,
        config: RuntimeConfig,
        monitor: Option<Box<dyn SagaMonitor>>,
        on_error: Option<ErrorHook>,
    ) -> Self {
        Self {
            store,
            config,
            tasks: Arena::new(),
            effects: Arena::new(),
            bus: EventBus::new(),
            inbox: Rc::default(),
            woken: Arc::new(WakeQueue::new()),
            jobs: VecDeque::new(),
            timers: TimerHeap::new(),
            now: Time::ZERO,
            on_error,
            monitor,
            stats: RuntimeStats::default(),
        }
    }

    /// Starts a root saga and runs until the runtime is idle.
    ///
    /// The returned handle reports the saga's outcome once it settles. A root
    /// that fails is logged, passed to the `on_error` hook, and leaves the
    /// rest of the runtime untouched.
    pub fn run_saga(&mut self, name: &str, saga: impl Saga + 'static) -> Task {
        let task = self.create_task(name, None, TaskLink::Root, Box::new(saga));
        info!(task = %task, "root saga started");
        if let Some(monitor) = self.monitor.as_deref() {
            monitor.root_started(task.id(), name);
        }
        self.drive(task.id(), Resume::Start);
        self.run_until_idle();
        task
    }

    /// Starts a root saga written as an `async` block.
    pub fn run_async<F, Fut>(&mut self, name: &str, body: F) -> Task
    where
        F: FnOnce(Co) -> Fut,
        Fut: Future<Output = Result<Value, SagaError>> + 'static,
    {
        self.run_saga(name, saga::from_async(body))
    }

    /// Dispatches an event to the store, then to every matching taker and
    /// action channel, and runs until idle.
    ///
    /// Returns the store's dispatch result. An event the store rejects is
    /// not seen by sagas.
    pub fn dispatch(&mut self, event: Event) -> Result<Value, SagaError> {
        let result = self.dispatch_event(&event);
        self.run_until_idle();
        result
    }

    /// Puts a value onto a channel from outside any saga and runs until idle.
    pub fn put(&mut self, channel: &Channel, value: impl Into<Value>) -> Result<(), ChannelError> {
        let result = channel.put(value.into());
        self.run_until_idle();
        result
    }

    /// Ends the event bus: pattern takes resolve with the end marker and
    /// action channels close.
    pub fn end(&mut self) {
        self.close_bus();
        self.run_until_idle();
    }

    /// Cancels a task from the host. Settled tasks are left alone.
    pub fn cancel(&mut self, task: &Task) {
        self.cancel_task(task.id(), CancelReason::user("host request"));
        self.run_until_idle();
    }

    /// Cancels every live root task.
    pub fn shutdown(&mut self) {
        let roots: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, record)| record.link == TaskLink::Root)
            .map(|(index, _)| TaskId::from_arena(index))
            .collect();
        info!(roots = roots.len(), "runtime shutting down");
        for root in roots {
            self.cancel_task(root, CancelReason::shutdown());
        }
        self.run_until_idle();
    }

    /// Runs queued work until none is left or the step budget is spent.
    ///
    /// Returns the number of steps taken.
    pub fn run_until_idle(&mut self) -> u64 {
        let mut steps = 0u64;
        loop {
            if let Some(budget) = self.config.step_budget {
                if steps >= budget {
                    warn!(budget, "step budget exhausted with work still queued");
                    break;
                }
            }
            if !self.step() {
                break;
            }
            steps += 1;
        }
        self.stats.steps += steps;
        steps
    }

    /// Moves the virtual clock forward, firing timers in deadline order.
    pub fn advance(&mut self, by: Duration) {
        let target = self.now + by;
        self.run_until_idle();
        while let Some(deadline) = self.timers.peek_deadline() {
            if deadline > target {
                break;
            }
            if deadline > self.now {
                self.now = deadline;
            }
            self.run_until_idle();
        }
        self.now = target;
        self.run_until_idle();
    }

    /// Runs until idle, jumping the clock to each pending timer in turn.
    pub fn run_until_stalled(&mut self) {
        self.run_until_idle();
        while let Some(deadline) = self.timers.peek_deadline() {
            if deadline > self.now {
                self.now = deadline;
            }
            self.run_until_idle();
        }
    }

    /// Returns the virtual clock.
    #[must_use]
    pub const fn now(&self) -> Time {
        self.now
    }

    /// Returns the earliest pending timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Time> {
        self.timers.peek_deadline()
    }

    /// Returns true if nothing is queued to run at the current time.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inbox.borrow().is_empty()
            && self.woken.is_empty()
            && self.jobs.is_empty()
            && self.timers.peek_deadline().is_none_or(|deadline| deadline > self.now)
    }

    /// Returns the number of tasks that have not settled.
    #[must_use]
    pub fn live_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Returns the number of effects waiting to settle.
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.effects.len()
    }

    /// Returns a snapshot of the runtime counters.
    #[must_use]
    pub const fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns the store's current state.
    #[must_use]
    pub fn state(&self) -> Json {
        self.store.state()
    }

    fn step(&mut self) -> bool {
        let wakeup = self.inbox.borrow_mut().pop_front();
        if let Some(Wakeup { effect, settle }) = wakeup {
            self.settle_effect(effect, settle);
            return true;
        }
        if let Some(effect) = self.woken.pop() {
            self.poll_effect_future(effect);
            return true;
        }
        if let Some(job) = self.jobs.pop_front() {
            self.run_job(job);
            return true;
        }
        let due = self.timers.pop_expired(self.now);
        if due.is_empty() {
            return false;
        }
        for effect in due {
            self.stats.timers_fired += 1;
            self.settle_effect(effect, Settle::Ok(Value::Unit));
        }
        true
    }

    fn run_job(&mut self, job: Job) {
        match job {
            Job::Start(id) => {
                let ready = self
                    .tasks
                    .get(id.arena_index())
                    .is_some_and(|record| !record.started && !record.main.is_finished());
                if ready {
                    self.drive(id, Resume::Start);
                }
            }
            Job::Dispatch { event, reply } => {
                let result = self.dispatch_event(&event);
                if let Some(effect) = reply {
                    self.settle_effect(effect, Settle::from(result));
                }
            }
            Job::End => self.close_bus(),
        }
    }

    fn dispatch_event(&mut self, event: &Event) -> Result<Value, SagaError> {
        let reply = self.store.dispatch(event)?;
        self.stats.events += 1;
        debug!(event = %event, "event dispatched");
        if let Some(monitor) = self.monitor.as_deref() {
            monitor.event_dispatched(event);
        }
        self.bus.publish(event);
        for effect in self.bus.take_matching(event) {
            self.settle_effect(effect, Settle::Ok(Value::Event(event.clone())));
        }
        Ok(reply)
    }

    fn close_bus(&mut self) {
        if self.bus.is_closed() {
            return;
        }
        debug!(takers = self.bus.taker_count(), "event bus ended");
        for (effect, maybe) in self.bus.close() {
            self.settle_effect(effect, interpret::end_settle(maybe));
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(NullStore)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("now", &self.now)
            .field("tasks", &self.tasks.len())
            .field("effects", &self.effects.len())
            .field("jobs", &self.jobs.len())
            .field("timers", &self.timers.len())
            .field("bus_closed", &self.bus.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{self, CallOutcome};
    use crate::test_utils::{RecordingStore, init_test_logging, tags};
    use crate::types::TaskStatus;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn root_saga_runs_to_completion() {
        init_test("root_saga_runs_to_completion");
        let mut runtime = Runtime::default();
        let task = runtime.run_saga("root", saga::sequence([effect::select_state()]));
        crate::assert_with_log!(
            task.status() == TaskStatus::Done,
            "root finished",
            TaskStatus::Done,
            task.status()
        );
        crate::assert_with_log!(runtime.live_tasks() == 0, "record freed", 0, runtime.live_tasks());
        crate::test_complete!("root_saga_runs_to_completion");
    }

    #[test]
    fn put_is_dispatched_to_store() {
        init_test("put_is_dispatched_to_store");
        let store = RecordingStore::default();
        let log = store.log();
        let mut runtime = Runtime::new(store);
        runtime.run_saga(
            "putter",
            saga::sequence([effect::put_event("A"), effect::put_event("B")]),
        );
        let seen = tags(&log);
        crate::assert_with_log!(seen == ["A", "B"], "events in order", ["A", "B"], seen);
        crate::assert_with_log!(runtime.stats().events == 2, "event count", 2, runtime.stats().events);
        crate::test_complete!("put_is_dispatched_to_store");
    }

    #[test]
    fn take_waits_for_dispatch() {
        init_test("take_waits_for_dispatch");
        let mut runtime = Runtime::new(RecordingStore::default());
        let task = runtime.run_async("taker", |co| async move {
            co.effect(effect::take("PING")).await
        });
        assert!(task.is_running());
        runtime.dispatch(Event::new("OTHER")).unwrap();
        assert!(task.is_running());
        runtime.dispatch(Event::new("PING")).unwrap();
        let result = task.result();
        crate::assert_with_log!(
            result == Some(Value::Event(Event::new("PING"))),
            "take resolves with the event",
            "PING",
            result
        );
        crate::test_complete!("take_waits_for_dispatch");
    }

    #[test]
    fn delay_waits_for_virtual_time() {
        init_test("delay_waits_for_virtual_time");
        let mut runtime = Runtime::default();
        let task = runtime.run_saga("sleeper", saga::sequence([effect::delay(Duration::from_millis(50))]));
        assert!(task.is_running());
        assert_eq!(runtime.next_deadline(), Some(Time::from_millis(50)));
        runtime.advance(Duration::from_millis(49));
        assert!(task.is_running());
        runtime.advance(Duration::from_millis(1));
        crate::assert_with_log!(!task.is_running(), "timer fired", false, task.is_running());
        crate::assert_with_log!(
            runtime.now() == Time::from_millis(50),
            "clock advanced",
            Time::from_millis(50),
            runtime.now()
        );
        assert_eq!(runtime.stats().timers_fired, 1);
        crate::test_complete!("delay_waits_for_virtual_time");
    }

    #[test]
    fn step_budget_bounds_a_run() {
        init_test("step_budget_bounds_a_run");
        let config = RuntimeConfig {
            step_budget: Some(1),
            ..RuntimeConfig::default()
        };
        let mut runtime = Runtime::builder().config(config).build().unwrap();
        let task = runtime.run_saga(
            "forker",
            saga::sequence([
                effect::fork(|_| CallOutcome::ok(1), Vec::new()),
                effect::fork(|_| CallOutcome::ok(2), Vec::new()),
            ]),
        );
        assert!(!runtime.is_idle());
        assert!(task.is_running());
        while runtime.run_until_idle() > 0 {}
        crate::assert_with_log!(runtime.is_idle(), "drained in slices", true, runtime.is_idle());
        assert_eq!(task.status(), TaskStatus::Done);
        crate::test_complete!("step_budget_bounds_a_run");
    }

    #[test]
    fn shutdown_cancels_roots() {
        init_test("shutdown_cancels_roots");
        let mut runtime = Runtime::default();
        let a = runtime.run_saga("a", saga::sequence([effect::take("never")]));
        let b = runtime.run_saga("b", saga::sequence([effect::delay(Duration::from_secs(1))]));
        runtime.shutdown();
        crate::assert_with_log!(a.is_cancelled() && b.is_cancelled(), "both cancelled", true, (a.status(), b.status()));
        crate::assert_with_log!(runtime.pending_effects() == 0, "effects released", 0, runtime.pending_effects());
        crate::test_complete!("shutdown_cancels_roots");
    }
}
