//! Watchers that start a worker per matching event.

use super::{Worker, fork_helper};
use crate::effect::{self, CallOutcome, Effect, TakeSource};
use crate::error::SagaError;
use crate::saga::Co;
use crate::tracing_compat::trace;
use crate::types::Value;

/// Forks `worker` for every event matching `source`.
///
/// Workers run concurrently and independently. The watcher ends when the
/// source closes.
pub fn take_every<W>(source: impl Into<TakeSource>, worker: W) -> Effect
where
    W: Fn(Value) -> CallOutcome + 'static,
{
    let source = source.into();
    let worker = Worker::from_fn(worker);
    fork_helper("take_every", move |co| {
        every(co, source.clone(), worker.clone())
    })
}

async fn every(co: Co, source: TakeSource, worker: Worker) -> Result<Value, SagaError> {
    loop {
        let input = co.effect(effect::take(source.clone())).await?;
        co.effect(worker.fork(input)).await?;
    }
}

/// Forks `worker` for every matching event, cancelling the previous worker
/// first if it is still running.
pub fn take_latest<W>(source: impl Into<TakeSource>, worker: W) -> Effect
where
    W: Fn(Value) -> CallOutcome + 'static,
{
    let source = source.into();
    let worker = Worker::from_fn(worker);
    fork_helper("take_latest", move |co| {
        latest(co, source.clone(), worker.clone())
    })
}

async fn latest(co: Co, source: TakeSource, worker: Worker) -> Result<Value, SagaError> {
    let mut last = None;
    loop {
        let input = co.effect(effect::take(source.clone())).await?;
        if let Some(previous) = last.take() {
            trace!(worker = worker.name(), "cancelling previous worker");
            co.effect(effect::cancel(&previous)).await?;
        }
        last = co.effect(worker.fork(input)).await?.into_task();
    }
}

/// Calls `worker` for a matching event and ignores further events until it
/// returns.
pub fn take_leading<W>(source: impl Into<TakeSource>, worker: W) -> Effect
where
    W: Fn(Value) -> CallOutcome + 'static,
{
    let source = source.into();
    let worker = Worker::from_fn(worker);
    fork_helper("take_leading", move |co| {
        leading(co, source.clone(), worker.clone())
    })
}

async fn leading(co: Co, source: TakeSource, worker: Worker) -> Result<Value, SagaError> {
    loop {
        let input = co.effect(effect::take(source.clone())).await?;
        co.effect(worker.call(input)).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::saga;
    use crate::test_utils::{RecordingStore, init_test_logging};
    use crate::types::{Event, TaskStatus};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn counting_worker(count: &Rc<RefCell<u32>>) -> impl Fn(Value) -> CallOutcome + 'static {
        let count = Rc::clone(count);
        move |_| {
            *count.borrow_mut() += 1;
            CallOutcome::saga(saga::sequence([effect::delay(Duration::from_millis(10))]))
        }
    }

    #[test]
    fn take_every_starts_a_worker_per_event() {
        init_test("take_every_starts_a_worker_per_event");
        let started = Rc::new(RefCell::new(0));
        let mut runtime = Runtime::new(RecordingStore::default());
        let root = runtime.run_saga(
            "root",
            saga::sequence([take_every("A", counting_worker(&started))]),
        );
        for _ in 0..3 {
            runtime.dispatch(Event::new("A")).unwrap();
        }
        crate::assert_with_log!(*started.borrow() == 3, "three workers", 3, *started.borrow());
        // root, watcher and the sleeping workers
        crate::assert_with_log!(runtime.live_tasks() == 5, "all alive", 5, runtime.live_tasks());
        runtime.end();
        runtime.advance(Duration::from_millis(10));
        crate::assert_with_log!(root.status() == TaskStatus::Done, "root done", TaskStatus::Done, root.status());
        crate::test_complete!("take_every_starts_a_worker_per_event");
    }

    #[test]
    fn take_leading_ignores_events_while_busy() {
        init_test("take_leading_ignores_events_while_busy");
        let started = Rc::new(RefCell::new(0));
        let mut runtime = Runtime::new(RecordingStore::default());
        runtime.run_saga(
            "root",
            saga::sequence([take_leading("A", counting_worker(&started))]),
        );
        runtime.dispatch(Event::new("A")).unwrap();
        runtime.dispatch(Event::new("A")).unwrap();
        crate::assert_with_log!(*started.borrow() == 1, "second event ignored", 1, *started.borrow());
        runtime.advance(Duration::from_millis(10));
        runtime.dispatch(Event::new("A")).unwrap();
        crate::assert_with_log!(*started.borrow() == 2, "free again", 2, *started.borrow());
        crate::test_complete!("take_leading_ignores_events_while_busy");
    }
}
