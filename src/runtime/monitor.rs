//! Runtime observation: an effect monitor hook and counters.

use crate::error::SagaError;
use crate::types::{CancelReason, Event, TaskId, TaskOutcome, Value};
use serde::Serialize;
use std::fmt;

/// Callbacks fired as the runtime interprets effects.
///
/// Every method has an empty default, so a monitor only implements what it
/// needs. Monitors are called synchronously from the interpreter and must not
/// block.
pub trait SagaMonitor {
    /// A root saga was started.
    fn root_started(&self, _task: TaskId, _name: &str) {}

    /// A task yielded an effect.
    fn effect_triggered(&self, _task: TaskId, _tag: &'static str) {}

    /// An effect resolved with a value.
    fn effect_resolved(&self, _task: TaskId, _tag: &'static str, _value: &Value) {}

    /// An effect failed.
    fn effect_rejected(&self, _task: TaskId, _tag: &'static str, _error: &SagaError) {}

    /// A pending effect was cancelled.
    fn effect_cancelled(&self, _task: TaskId, _tag: &'static str) {}

    /// A cancellation request reached a task.
    fn task_cancelled(&self, _task: TaskId, _reason: &CancelReason) {}

    /// A task settled.
    fn task_settled(&self, _task: TaskId, _outcome: &TaskOutcome) {}

    /// An event went through the store and onto the bus.
    fn event_dispatched(&self, _event: &Event) {}
}

/// Counters describing what the runtime has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RuntimeStats {
    /// Tasks created (roots, forks and called sagas).
    pub tasks_spawned: u64,
    /// Tasks that settled with a value.
    pub tasks_done: u64,
    /// Tasks that settled cancelled.
    pub tasks_cancelled: u64,
    /// Tasks that settled with an error.
    pub tasks_errored: u64,
    /// Effects interpreted, including race and all branches.
    pub effects: u64,
    /// Events dispatched through the store.
    pub events: u64,
    /// Timers that expired.
    pub timers_fired: u64,
    /// Run loop iterations.
    pub steps: u64,
}

impl RuntimeStats {
    /// Tasks created but not yet settled.
    #[must_use]
    pub const fn tasks_live(&self) -> u64 {
        self.tasks_spawned
            .saturating_sub(self.tasks_done + self.tasks_cancelled + self.tasks_errored)
    }

    pub(crate) fn record_settled(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Done(_) => self.tasks_done += 1,
            TaskOutcome::Cancelled(_) => self.tasks_cancelled += 1,
            TaskOutcome::Errored(_) => self.tasks_errored += 1,
        }
    }
}

impl fmt::Display for RuntimeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tasks={} live={} done={} cancelled={} errored={} effects={} events={} timers={}",
            self.tasks_spawned,
            self.tasks_live(),
            self.tasks_done,
            self.tasks_cancelled,
            self.tasks_errored,
            self.effects,
            self.events,
            self.timers_fired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_tasks_are_spawned_minus_settled() {
        let mut stats = RuntimeStats {
            tasks_spawned: 4,
            ..RuntimeStats::default()
        };
        stats.record_settled(&TaskOutcome::Done(Value::Unit));
        stats.record_settled(&TaskOutcome::Cancelled(CancelReason::race_lost()));
        assert_eq!(stats.tasks_live(), 2);
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["tasks_cancelled"], 1);
        assert!(stats.to_string().starts_with("tasks=4 live=2"));
    }
}
