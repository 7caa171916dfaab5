//! Error types.
//!
//! Everything a saga can observe at a yield point is a [`SagaError`]. The
//! variants keep the four error kinds of the effect protocol apart:
//!
//! - [`TaskError`]: an uncaught error raised by a saga body or an invoked
//!   function. Propagates through attached forks.
//! - [`EffectError`]: a malformed descriptor. Thrown into the yielding saga
//!   immediately.
//! - [`SagaError::Cancelled`]: the cancellation signal. Never a failure;
//!   joiners use it to tell "cancelled" from "failed".
//! - [`ChannelError`]: surfaced when a resolving put targets a closed
//!   channel, or a fixed buffer overflows.
//!
//! `SagaError` is `Clone` because one task failure is delivered to every
//! joiner of that task.

use serde_json::Value as Json;
use thiserror::Error;

/// Result alias used across saga bodies and effect functions.
pub type Result<T, E = SagaError> = std::result::Result<T, E>;

/// Errors delivered into (or raised by) a saga.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SagaError {
    /// An uncaught error from a saga body or effect function.
    #[error(transparent)]
    Task(#[from] TaskError),
    /// A malformed effect descriptor.
    #[error(transparent)]
    Effect(#[from] EffectError),
    /// A channel rejected a put.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// Cancellation signal: the task (or a task it joined) was cancelled.
    #[error("task cancelled")]
    Cancelled,
    /// The source of a plain `TAKE` closed; the saga should unwind normally.
    #[error("saga terminated: take source closed")]
    Terminated,
}

impl SagaError {
    /// Creates a task error from a message.
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task(TaskError::new(message))
    }

    /// Returns true for the cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true for the end-of-stream termination signal.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Returns true for signals that unwind a saga without being failures.
    #[must_use]
    pub const fn is_interrupt(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Terminated)
    }
}

impl From<&str> for SagaError {
    fn from(message: &str) -> Self {
        Self::task(message)
    }
}

impl From<String> for SagaError {
    fn from(message: String) -> Self {
        Self::task(message)
    }
}

/// An uncaught error raised by a saga body.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct TaskError {
    /// Human readable message.
    pub message: String,
    /// Optional structured payload.
    pub data: Option<Json>,
}

impl TaskError {
    /// Creates a task error with no payload.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: Json) -> Self {
        self.data = Some(data);
        self
    }
}

/// A descriptor the interpreter cannot execute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    /// `RACE` with no branches can never settle.
    #[error("race effect has no branches")]
    EmptyRace,
    /// Two `RACE` branches share a name.
    #[error("race effect declares branch `{0}` more than once")]
    DuplicateRaceKey(String),
    /// `PUT` to the event bus with something other than an event or END.
    #[error("put to the event bus requires an event, got {0}")]
    NotAnEvent(&'static str),
    /// `JOIN` targeting the joining task itself.
    #[error("a task cannot join itself")]
    SelfJoin,
    /// `CALL`/`FORK` function produced a one-shot outcome twice.
    #[error("call outcome was already consumed")]
    OutcomeConsumed,
    /// An async saga awaited something other than an effect.
    #[error("saga awaited a future that is not an effect")]
    ForeignAwait,
}

/// Errors raised by channel puts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel was closed.
    #[error("channel closed")]
    Closed,
    /// A fixed buffer is full.
    #[error("channel buffer overflow (capacity {0})")]
    Overflow(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn saga_error_display() {
        let errors = vec![
            SagaError::task("boom"),
            SagaError::Effect(EffectError::EmptyRace),
            SagaError::Effect(EffectError::DuplicateRaceKey("a".into())),
            SagaError::Channel(ChannelError::Closed),
            SagaError::Channel(ChannelError::Overflow(2)),
            SagaError::Cancelled,
            SagaError::Terminated,
        ];
        let expected = [
            "boom",
            "race effect has no branches",
            "race effect declares branch `a` more than once",
            "channel closed",
            "channel buffer overflow (capacity 2)",
            "task cancelled",
            "saga terminated: take source closed",
        ];
        for (err, expected) in errors.iter().zip(expected.iter()) {
            assert_eq!(err.to_string(), *expected);
            assert_eq!(err.clone(), *err);
        }
    }

    #[test]
    fn interrupts_are_not_failures() {
        assert!(SagaError::Cancelled.is_interrupt());
        assert!(SagaError::Terminated.is_interrupt());
        assert!(!SagaError::task("x").is_interrupt());
        assert!(SagaError::Cancelled.is_cancelled());
        assert!(!SagaError::Terminated.is_cancelled());
    }

    #[test]
    fn task_error_carries_payload() {
        let err = TaskError::new("bad input").with_data(json!({"field": "name"}));
        let saga: SagaError = err.clone().into();
        assert_eq!(saga, SagaError::Task(err));
        let from_str: SagaError = "plain".into();
        assert_eq!(from_str.to_string(), "plain");
    }
}
