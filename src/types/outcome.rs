//! Task status and settled outcomes.

use super::{CancelReason, Value};
use crate::error::SagaError;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
///
/// `Cancelled` is observable as soon as cancellation is requested; the task
/// settles once its cleanup and children have finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task is executing or waiting for its children.
    Running,
    /// The task produced a result.
    Done,
    /// The task was cancelled.
    Cancelled,
    /// The task failed.
    Errored,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// The settled outcome of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Completed with a value.
    Done(Value),
    /// Failed with an error.
    Errored(SagaError),
    /// Cancelled for the given reason.
    Cancelled(CancelReason),
}

impl TaskOutcome {
    /// Returns the status this outcome settles into.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        match self {
            Self::Done(_) => TaskStatus::Done,
            Self::Errored(_) => TaskStatus::Errored,
            Self::Cancelled(_) => TaskStatus::Cancelled,
        }
    }

    /// Converts the outcome into what a joiner is resumed with.
    ///
    /// A cancelled task delivers the cancellation signal, not a failure.
    pub fn into_result(self) -> Result<Value, SagaError> {
        match self {
            Self::Done(value) => Ok(value),
            Self::Errored(err) => Err(err),
            Self::Cancelled(_) => Err(SagaError::Cancelled),
        }
    }

    /// Returns true if the task completed successfully.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Returns true if the task failed.
    #[must_use]
    pub const fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }

    /// Returns true if the task was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
