//! Task lifecycle: driving sagas, cancellation, failure and settlement.
//!
//! A task settles only when its own body has finished and every attached
//! child has settled. Cancellation and failure walk the child list first, then
//! interrupt the body, so children are always torn down before their parent.

use super::interpret::{Launch, Parent};
use super::task::{MainState, Task, TaskLink, TaskRecord};
use super::{Job, Runtime};
use crate::error::SagaError;
use crate::saga::{Resume, Saga, Step};
use crate::tracing_compat::{debug, error, trace, warn};
use crate::types::{CancelReason, EffectId, TaskId, TaskOutcome, Value};

impl Runtime {
    /// Registers a new task record and returns its handle.
    pub(crate) fn create_task(
        &mut self,
        name: &str,
        parent: Option<TaskId>,
        link: TaskLink,
        saga: Box<dyn Saga>,
    ) -> Task {
        let id = TaskId::from_arena(self.tasks.vacant_index());
        let handle = Task::new(id, name.to_string(), link == TaskLink::Detached);
        self.tasks
            .insert(TaskRecord::new(handle.clone(), parent, link, saga));
        self.stats.tasks_spawned += 1;
        debug!(task = %handle, parent = ?parent, link = ?link, "task created");
        handle
    }

    /// Queues a forked task to start once the current step is over.
    pub(crate) fn schedule_start(&mut self, id: TaskId) {
        self.jobs.push_back(Job::Start(id));
    }

    /// Resumes a task's saga and keeps it running until it suspends or ends.
    pub(crate) fn drive(&mut self, id: TaskId, input: Resume) {
        let mut input = input;
        loop {
            let Some(record) = self.tasks.get_mut(id.arena_index()) else {
                return;
            };
            if record.main.is_finished() {
                return;
            }
            let Some(mut saga) = record.saga.take() else {
                return;
            };
            record.started = true;
            record.running = true;

            let effect = match saga.resume(input) {
                Step::Yield(effect) => effect,
                Step::Done(value) => {
                    self.main_finished(id, Ok(value));
                    return;
                }
                Step::Threw(err) => {
                    self.main_finished(id, Err(err));
                    return;
                }
            };
            let launch = self.run_effect(id, effect, Parent::Task);

            let Some(record) = self.tasks.get_mut(id.arena_index()) else {
                return;
            };
            record.saga = Some(saga);
            record.running = false;
            if let Some(interrupt) = record.interrupt.take() {
                let reason = interrupt_reason(record);
                if let Launch::Pending(effect) = launch {
                    self.cancel_effect(effect, &reason);
                }
                input = interrupt;
                continue;
            }
            match launch {
                Launch::Immediate(settle) => input = settle.into_resume(),
                Launch::Pending(effect) => {
                    record.pending = Some(effect);
                    return;
                }
            }
        }
    }

    /// Requests cancellation of a task and its attached subtree.
    pub(crate) fn cancel_task(&mut self, id: TaskId, reason: CancelReason) {
        let Some(record) = self.tasks.get_mut(id.arena_index()) else {
            return;
        };
        if let Some(existing) = record.cancel.as_mut() {
            existing.strengthen(&reason);
            return;
        }
        if record.error.is_some() {
            trace!(task = %record.handle, "cancel ignored, task is already failing");
            return;
        }
        debug!(task = %record.handle, reason = %reason, "cancelling task");
        record.cancel = Some(reason.clone());
        record.handle.mark_cancelled();
        let children = record.children.clone();
        if let Some(monitor) = self.monitor.as_deref() {
            monitor.task_cancelled(id, &reason);
        }
        for child in children {
            self.cancel_task(child, CancelReason::parent_cancelled());
        }
        self.interrupt_main(id, Resume::Cancel);
        self.try_settle(id);
    }

    /// Fails a task with an error raised by one of its attached children.
    ///
    /// Remaining children are cancelled and the error is thrown into the
    /// body. Only the first error counts.
    pub(crate) fn fail_task(&mut self, id: TaskId, err: SagaError) {
        let Some(record) = self.tasks.get_mut(id.arena_index()) else {
            return;
        };
        if record.cancel.is_some() {
            debug!(task = %record.handle, error = %err, "child error ignored during cancellation");
            return;
        }
        if record.error.is_some() {
            trace!(task = %record.handle, error = %err, "task already failing");
            return;
        }
        debug!(task = %record.handle, error = %err, "task failing");
        record.error = Some(err.clone());
        let children = record.children.clone();
        for child in children {
            self.cancel_task(child, CancelReason::sibling_failed());
        }
        self.interrupt_main(id, Resume::Error(err));
        self.try_settle(id);
    }

    /// Delivers a cancel or error signal to a task's body.
    fn interrupt_main(&mut self, id: TaskId, signal: Resume) {
        let Some(record) = self.tasks.get_mut(id.arena_index()) else {
            return;
        };
        if record.main.is_finished() {
            return;
        }
        if !record.started {
            record.saga = None;
            record.main = MainState::Finished(Value::Unit);
            return;
        }
        if record.running {
            record.interrupt = Some(signal);
            return;
        }
        let reason = interrupt_reason(record);
        if let Some(effect) = record.pending.take() {
            self.cancel_effect(effect, &reason);
        }
        self.drive(id, signal);
    }

    /// Records the end of a task's body.
    fn main_finished(&mut self, id: TaskId, result: Result<Value, SagaError>) {
        let Some(record) = self.tasks.get_mut(id.arena_index()) else {
            return;
        };
        record.saga = None;
        record.running = false;
        record.pending = None;
        record.interrupt = None;
        let cancelling = record.cancel.is_some();
        let failing = record.error.is_some();
        match result {
            Ok(value) => record.main = MainState::Finished(value),
            Err(SagaError::Terminated) => record.main = MainState::Finished(Value::Unit),
            Err(SagaError::Cancelled) => {
                record.main = MainState::Finished(Value::Unit);
                if !cancelling && !failing {
                    trace!(task = %record.handle, "cancellation escaped the body");
                    self.cancel_task(id, CancelReason::propagated());
                    return;
                }
            }
            Err(err) if cancelling => {
                warn!(task = %record.handle, error = %err, "error raised during cancellation cleanup discarded");
                record.main = MainState::Finished(Value::Unit);
            }
            Err(err) if failing => {
                trace!(task = %record.handle, error = %err, "body rethrew while failing");
                record.main = MainState::Finished(Value::Unit);
            }
            Err(err) => {
                record.main = MainState::Finished(Value::Unit);
                self.fail_task(id, err);
                return;
            }
        }
        self.try_settle(id);
    }

    /// Settles a task whose body and children are all done.
    pub(crate) fn try_settle(&mut self, id: TaskId) {
        let ready = self
            .tasks
            .get(id.arena_index())
            .is_some_and(|record| record.main.is_finished() && record.children.is_empty());
        if !ready {
            return;
        }
        let Some(mut record) = self.tasks.remove(id.arena_index()) else {
            return;
        };
        let outcome = record.outcome();
        record.handle.settle(outcome.clone());
        self.stats.record_settled(&outcome);
        if let Some(monitor) = self.monitor.as_deref() {
            monitor.task_settled(id, &outcome);
        }
        debug!(task = %record.handle, status = %outcome.status(), "task settled");

        match record.link {
            TaskLink::Root => {
                if let TaskOutcome::Errored(err) = &outcome {
                    error!(task = %record.handle, error = %err, "root saga failed");
                    if let Some(hook) = self.on_error.as_mut() {
                        hook(&record.handle, err);
                    }
                }
            }
            TaskLink::Detached => {
                if let TaskOutcome::Errored(err) = &outcome {
                    warn!(task = %record.handle, error = %err, "detached task failed");
                }
            }
            TaskLink::Attached => {
                if let Some(parent) = record.parent {
                    if let Some(parent_record) = self.tasks.get_mut(parent.arena_index()) {
                        parent_record.children.retain(|child| *child != id);
                    }
                    if let TaskOutcome::Errored(err) = &outcome {
                        self.fail_task(parent, err.clone());
                    }
                    self.try_settle(parent);
                }
            }
            TaskLink::Call(effect) => {
                let result = match outcome {
                    TaskOutcome::Done(value) => Ok(value),
                    TaskOutcome::Errored(err) => Err(err),
                    TaskOutcome::Cancelled(_) => Err(SagaError::Cancelled),
                };
                self.settle_effect(effect, result.into());
            }
        }

        for joiner in record.joiners {
            self.join_progress(joiner);
        }
    }

    pub(crate) fn unregister_joiner(&mut self, task: TaskId, joiner: EffectId) {
        if let Some(record) = self.tasks.get_mut(task.arena_index()) {
            record.joiners.retain(|effect| *effect != joiner);
        }
    }

    /// Returns true if the task is running its cancellation cleanup.
    pub(crate) fn is_cancelling(&self, id: TaskId) -> bool {
        self.tasks
            .get(id.arena_index())
            .is_some_and(|record| record.cancel.is_some())
    }
}

/// The reason handed to a pending effect torn down by an interrupt.
fn interrupt_reason(record: &TaskRecord) -> CancelReason {
    if record.cancel.is_some() {
        CancelReason::parent_cancelled()
    } else {
        CancelReason::sibling_failed()
    }
}
