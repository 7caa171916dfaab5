//! End-to-end checks of the interpreter's core guarantees.

use proptest::prelude::*;
use sagasync::effect::{self, CallOutcome};
use sagasync::pattern::Pattern;
use sagasync::runtime::{Runtime, SagaMonitor, Task};
use sagasync::saga;
use sagasync::test_utils::{RecordingStore, init_test_logging};
use sagasync::types::{Event, TaskId, TaskOutcome, TaskStatus, Value};
use sagasync::{Channel, SagaError};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn init_test(name: &str) {
    init_test_logging();
    sagasync::test_phase!(name);
}

/// Records the order in which tasks settle.
#[derive(Clone, Default)]
struct SettleOrder(Rc<RefCell<Vec<TaskId>>>);

impl SagaMonitor for SettleOrder {
    fn task_settled(&self, task: TaskId, _outcome: &TaskOutcome) {
        self.0.borrow_mut().push(task);
    }
}

/// A saga sleeping for `ms`, recording `label` if it gets cancelled.
fn sleeper(label: &'static str, ms: u64, log: &Rc<RefCell<Vec<&'static str>>>) -> CallOutcome {
    let log = Rc::clone(log);
    CallOutcome::saga(saga::from_async(move |co| async move {
        let slept = co.effect(effect::delay(Duration::from_millis(ms))).await;
        if matches!(slept, Err(SagaError::Cancelled)) {
            log.borrow_mut().push(label);
        }
        slept
    }))
}

proptest! {
    #[test]
    fn pattern_forms_agree(tag in "[A-E]") {
        let event = Event::new(tag.clone());
        let expected = tag == "A" || tag == "B";

        let list = Pattern::one_of(["A", "B"]);
        let predicate = Pattern::predicate(|event| event.tag() == "A" || event.tag() == "B");

        prop_assert_eq!(list.matches(&event), expected);
        prop_assert_eq!(list.compile().matches(&event), expected);
        prop_assert_eq!(predicate.matches(&event), expected);
        prop_assert!(Pattern::from(tag.as_str()).matches(&event));
        prop_assert!(Pattern::from("*").matches(&event));
    }
}

#[test]
fn race_winner_is_keyed_and_loser_call_cancelled_once() {
    init_test("race_winner_is_keyed_and_loser_call_cancelled_once");
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut runtime = Runtime::new(RecordingStore::default());
    let loser = {
        let log = Rc::clone(&log);
        move |_: Vec<Value>| sleeper("loser", 100, &log)
    };
    let task = runtime.run_async("racer", move |co| async move {
        co.effect(effect::race([
            ("x", effect::take("X")),
            ("y", effect::call(loser, Vec::new())),
        ]))
        .await
    });
    sagasync::assert_with_log!(task.is_running(), "race pending", true, task.is_running());

    runtime.dispatch(Event::new("X")).unwrap();
    let winner = task.result().and_then(Value::into_winner);
    sagasync::assert_with_log!(
        winner == Some(("x".to_string(), Value::Event(Event::new("X")))),
        "first branch wins",
        "x",
        winner,
    );
    runtime.advance(Duration::from_millis(100));
    sagasync::assert_with_log!(*log.borrow() == ["loser"], "loser cancelled once", ["loser"], log.borrow().clone());
    sagasync::assert_with_log!(runtime.pending_effects() == 0, "nothing left", 0, runtime.pending_effects());
    sagasync::test_complete!("race_winner_is_keyed_and_loser_call_cancelled_once");
}

#[test]
fn race_ties_go_to_the_first_declared_branch() {
    init_test("race_ties_go_to_the_first_declared_branch");
    let mut runtime = Runtime::new(RecordingStore::default());
    let same_event = runtime.run_async("same-event", |co| async move {
        co.effect(effect::race([("b", effect::take("X")), ("a", effect::take("X"))]))
            .await
    });
    let same_deadline = runtime.run_async("same-deadline", |co| async move {
        co.effect(effect::race([
            ("b", effect::delay(Duration::from_millis(5))),
            ("a", effect::delay(Duration::from_millis(5))),
        ]))
        .await
    });

    runtime.dispatch(Event::new("X")).unwrap();
    let winner = same_event.result().and_then(Value::into_winner).map(|(key, _)| key);
    sagasync::assert_with_log!(
        winner.as_deref() == Some("b"),
        "same event picks declaration order",
        "b",
        winner,
    );

    runtime.advance(Duration::from_millis(5));
    let winner = same_deadline.result().and_then(Value::into_winner).map(|(key, _)| key);
    sagasync::assert_with_log!(
        winner.as_deref() == Some("b"),
        "same deadline picks declaration order",
        "b",
        winner,
    );
    sagasync::assert_with_log!(runtime.pending_effects() == 0, "losers released", 0, runtime.pending_effects());
    sagasync::test_complete!("race_ties_go_to_the_first_declared_branch");
}

#[test]
fn join_returns_result_and_rethrows_error() {
    init_test("join_returns_result_and_rethrows_error");
    let mut runtime = Runtime::default();
    let task = runtime.run_async("joiner", |co| async move {
        let ok = co
            .effect(effect::fork(|_| CallOutcome::ok(42), Vec::new()))
            .await?
            .into_task()
            .ok_or_else(|| SagaError::task("fork returned no task"))?;
        let failing = co
            .effect(effect::spawn(
                |_| CallOutcome::err(SagaError::task("boom")),
                Vec::new(),
            ))
            .await?
            .into_task()
            .ok_or_else(|| SagaError::task("spawn returned no task"))?;

        let value = co.effect(effect::join(&ok)).await?;
        let rethrown = co.effect(effect::join(&failing)).await;
        Ok::<_, SagaError>(Value::List(vec![
            value,
            Value::from(rethrown == Err(SagaError::task("boom"))),
        ]))
    });
    runtime.run_until_stalled();
    sagasync::assert_with_log!(
        task.result() == Some(Value::List(vec![Value::from(42), Value::from(true)])),
        "join result then same error",
        "[42, true]",
        task.result(),
    );
    sagasync::test_complete!("join_returns_result_and_rethrows_error");
}

#[test]
fn cancellation_cascades_to_attached_children_only() {
    init_test("cancellation_cascades_to_attached_children_only");
    let order = SettleOrder::default();
    let mut runtime = Runtime::builder().monitor(order.clone()).build().unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let handles: Rc<RefCell<Vec<Task>>> = Rc::default();

    let parent = runtime.run_async("parent", {
        let log = Rc::clone(&log);
        let handles = Rc::clone(&handles);
        move |co| async move {
            let child_log = Rc::clone(&log);
            let attached = co
                .effect(effect::fork(move |_| sleeper("child", 1_000, &child_log), Vec::new()))
                .await?;
            let detached = co
                .effect(effect::spawn(
                    |_| CallOutcome::Sleep(Duration::from_millis(50)),
                    Vec::new(),
                ))
                .await?;
            handles.borrow_mut().extend(attached.into_task());
            handles.borrow_mut().extend(detached.into_task());

            let waited = co.effect(effect::take("NEVER")).await;
            if matches!(waited, Err(SagaError::Cancelled)) {
                log.borrow_mut().push("parent");
            }
            waited
        }
    });
    let (attached, detached) = {
        let handles = handles.borrow();
        (handles[0].clone(), handles[1].clone())
    };

    runtime.cancel(&parent);
    sagasync::assert_with_log!(
        *log.borrow() == ["child", "parent"],
        "child cleanup runs before parent cleanup",
        ["child", "parent"],
        log.borrow().clone(),
    );
    assert_eq!(attached.status(), TaskStatus::Cancelled);
    assert_eq!(parent.status(), TaskStatus::Cancelled);
    let settled = order.0.borrow().clone();
    let position = |id: TaskId| settled.iter().position(|task| *task == id);
    assert!(position(attached.id()) < position(parent.id()));
    sagasync::assert_with_log!(detached.is_running(), "detached child survives", true, detached.is_running());

    runtime.advance(Duration::from_millis(50));
    assert_eq!(detached.status(), TaskStatus::Done);
    sagasync::test_complete!("cancellation_cascades_to_attached_children_only");
}

#[test]
fn channel_delivers_in_fifo_order() {
    init_test("channel_delivers_in_fifo_order");
    let mut runtime = Runtime::default();
    let channel = Channel::default();
    for n in 1..=3 {
        runtime.put(&channel, n).unwrap();
    }
    let task = runtime.run_async("reader", {
        let channel = channel.clone();
        move |co| async move {
            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.push(co.effect(effect::take(&channel)).await?);
            }
            Ok::<_, SagaError>(Value::List(seen))
        }
    });
    sagasync::assert_with_log!(
        task.result() == Some(Value::List(vec![1.into(), 2.into(), 3.into()])),
        "values come out in put order",
        "[1, 2, 3]",
        task.result(),
    );
    sagasync::test_complete!("channel_delivers_in_fifo_order");
}

#[test]
fn take_every_runs_independent_workers() {
    init_test("take_every_runs_independent_workers");
    let finished = Rc::new(Cell::new(0));
    let mut runtime = Runtime::new(RecordingStore::default());
    runtime.run_saga(
        "root",
        saga::sequence([sagasync::combinator::take_every("A", {
            let finished = Rc::clone(&finished);
            move |_| {
                let finished = Rc::clone(&finished);
                CallOutcome::saga(saga::from_async(move |co| async move {
                    co.effect(effect::delay(Duration::from_millis(10))).await?;
                    finished.set(finished.get() + 1);
                    Ok::<_, SagaError>(Value::Unit)
                }))
            }
        })]),
    );
    for _ in 0..3 {
        runtime.dispatch(Event::new("A")).unwrap();
    }
    runtime.advance(Duration::from_millis(10));
    sagasync::assert_with_log!(finished.get() == 3, "all three workers finish", 3, finished.get());
    sagasync::test_complete!("take_every_runs_independent_workers");
}

#[test]
fn take_latest_cancels_unfinished_worker_first() {
    init_test("take_latest_cancels_unfinished_worker_first");
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut runtime = Runtime::new(RecordingStore::default());
    runtime.run_saga(
        "root",
        saga::sequence([sagasync::combinator::take_latest("A", {
            let log = Rc::clone(&log);
            move |input| {
                let n = input
                    .as_event()
                    .and_then(|event| event.payload.as_i64())
                    .unwrap_or_default();
                let log = Rc::clone(&log);
                log.borrow_mut().push(format!("start {n}"));
                CallOutcome::saga(saga::from_async(move |co| async move {
                    match co.effect(effect::delay(Duration::from_millis(10))).await {
                        Ok(_) => log.borrow_mut().push(format!("done {n}")),
                        Err(_) => log.borrow_mut().push(format!("cancelled {n}")),
                    }
                    Ok::<_, SagaError>(Value::Unit)
                }))
            }
        })]),
    );
    runtime
        .dispatch(Event::with_payload("A", serde_json::json!(1)))
        .unwrap();
    runtime
        .dispatch(Event::with_payload("A", serde_json::json!(2)))
        .unwrap();
    runtime.advance(Duration::from_millis(10));
    sagasync::assert_with_log!(
        *log.borrow() == ["start 1", "cancelled 1", "start 2", "done 2"],
        "first worker cancelled before second starts",
        "start 1, cancelled 1, start 2, done 2",
        log.borrow().clone(),
    );
    sagasync::test_complete!("take_latest_cancels_unfinished_worker_first");
}
