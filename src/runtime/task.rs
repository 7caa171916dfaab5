//! Task handles and the runtime's task records.
//!
//! A [`Task`] is the handle sagas receive from `FORK` and pass to `JOIN` and
//! `CANCEL`. It stays valid after the task settles and keeps the outcome, so
//! joiners never need the runtime record. The [`TaskRecord`] is the runtime's
//! private bookkeeping and is dropped as soon as the task settles.

use crate::error::SagaError;
use crate::saga::{Resume, Saga};
use crate::types::{EffectId, TaskId, TaskOutcome, TaskStatus, Value};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    outcome: Option<TaskOutcome>,
}

#[derive(Debug)]
struct TaskInner {
    id: TaskId,
    name: String,
    detached: bool,
    state: RefCell<TaskState>,
}

/// A handle to a task.
///
/// Handles are cheap to clone and compare by identity.
#[derive(Clone)]
pub struct Task(Rc<TaskInner>);

impl Task {
    pub(crate) fn new(id: TaskId, name: String, detached: bool) -> Self {
        Self(Rc::new(TaskInner {
            id,
            name,
            detached,
            state: RefCell::new(TaskState {
                status: TaskStatus::Running,
                outcome: None,
            }),
        }))
    }

    /// Returns the task id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.0.id
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns true for tasks started with `spawn`.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.0.detached
    }

    /// Returns the current status.
    ///
    /// `Cancelled` is reported as soon as cancellation is requested, while
    /// cleanup may still be running.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.0.state.borrow().status
    }

    /// Returns true until the task settles.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.0.state.borrow().outcome.is_none()
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status() == TaskStatus::Cancelled
    }

    /// Returns the settled outcome.
    #[must_use]
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.0.state.borrow().outcome.clone()
    }

    /// Returns the result of a task that completed successfully.
    #[must_use]
    pub fn result(&self) -> Option<Value> {
        match self.outcome() {
            Some(TaskOutcome::Done(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns the error of a task that failed.
    #[must_use]
    pub fn error(&self) -> Option<SagaError> {
        match self.outcome() {
            Some(TaskOutcome::Errored(err)) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn mark_cancelled(&self) {
        self.0.state.borrow_mut().status = TaskStatus::Cancelled;
    }

    pub(crate) fn settle(&self, outcome: TaskOutcome) {
        let mut state = self.0.state.borrow_mut();
        state.status = outcome.status();
        state.outcome = Some(outcome);
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("status", &self.status())
            .finish()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.0.name, self.0.id)
    }
}

/// How a task relates to the task that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskLink {
    /// Started by the host.
    Root,
    /// Forked; failures propagate to the parent, which waits for it.
    Attached,
    /// Spawned; isolated from the parent.
    Detached,
    /// Driven on behalf of a pending `CALL`; settles that effect.
    Call(EffectId),
}

/// Progress of a task's own saga body.
#[derive(Debug)]
pub(crate) enum MainState {
    Active,
    Finished(Value),
}

impl MainState {
    pub(crate) const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Runtime bookkeeping for a live task.
pub(crate) struct TaskRecord {
    pub(crate) handle: Task,
    pub(crate) parent: Option<TaskId>,
    pub(crate) link: TaskLink,
    pub(crate) children: SmallVec<[TaskId; 4]>,
    pub(crate) saga: Option<Box<dyn Saga>>,
    pub(crate) started: bool,
    pub(crate) running: bool,
    pub(crate) pending: Option<EffectId>,
    pub(crate) interrupt: Option<Resume>,
    pub(crate) main: MainState,
    pub(crate) cancel: Option<crate::types::CancelReason>,
    pub(crate) error: Option<SagaError>,
    pub(crate) joiners: Vec<EffectId>,
}

impl TaskRecord {
    pub(crate) fn new(
        handle: Task,
        parent: Option<TaskId>,
        link: TaskLink,
        saga: Box<dyn Saga>,
    ) -> Self {
        Self {
            handle,
            parent,
            link,
            children: SmallVec::new(),
            saga: Some(saga),
            started: false,
            running: false,
            pending: None,
            interrupt: None,
            main: MainState::Active,
            cancel: None,
            error: None,
            joiners: Vec::new(),
        }
    }

    /// The outcome this task settles with once its body and children are done.
    pub(crate) fn outcome(&mut self) -> TaskOutcome {
        if let Some(reason) = self.cancel.take() {
            return TaskOutcome::Cancelled(reason);
        }
        if let Some(err) = self.error.take() {
            return TaskOutcome::Errored(err);
        }
        match std::mem::replace(&mut self.main, MainState::Active) {
            MainState::Finished(value) => TaskOutcome::Done(value),
            MainState::Active => TaskOutcome::Done(Value::Unit),
        }
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("task", &self.handle)
            .field("parent", &self.parent)
            .field("link", &self.link)
            .field("children", &self.children)
            .field("pending", &self.pending)
            .field("main", &self.main)
            .field("cancel", &self.cancel)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelReason;

    #[test]
    fn handle_keeps_outcome_after_settling() {
        let task = Task::new(TaskId::new_for_test(1, 1), "worker".into(), false);
        assert!(task.is_running());
        assert_eq!(task.status(), TaskStatus::Running);
        task.mark_cancelled();
        assert!(task.is_cancelled());
        assert!(task.is_running());
        task.settle(TaskOutcome::Cancelled(CancelReason::race_lost()));
        assert!(!task.is_running());
        assert_eq!(task.result(), None);
        assert_eq!(task.to_string(), "worker[T1]");
        assert_eq!(task, task.clone());
    }

    #[test]
    fn errored_handle_exposes_error() {
        let task = Task::new(TaskId::new_for_test(2, 1), "failing".into(), true);
        task.settle(TaskOutcome::Errored(SagaError::task("boom")));
        assert!(task.is_detached());
        assert_eq!(task.status(), TaskStatus::Errored);
        assert_eq!(task.error(), Some(SagaError::task("boom")));
    }
}
