//! Deadlines for effects.
//!
//! A timeout is a race between the protected effect and a timer. The effect
//! returned by [`timeout`] resolves with the protected effect's value, or
//! fails with a [`TaskError`] carrying the deadline when the timer wins.

use super::call_helper;
use crate::effect::{self, Effect};
use crate::error::{SagaError, TaskError};
use crate::saga::Co;
use crate::types::Value;
use serde_json::json;
use std::time::Duration;

/// Race branch holding the protected effect.
pub const VALUE_KEY: &str = "value";

/// Race branch holding the timer.
pub const TIMEOUT_KEY: &str = "timeout";

/// Wraps `inner` so it fails if it does not settle within `limit`.
///
/// The losing side is cancelled, so a timed-out `CALL` of a saga is torn
/// down rather than left running.
#[must_use]
pub fn timeout(inner: Effect, limit: Duration) -> Effect {
    call_helper("timeout", move |co| guarded(co, inner.clone(), limit))
}

async fn guarded(co: Co, inner: Effect, limit: Duration) -> Result<Value, SagaError> {
    let settled = co
        .effect(effect::race([
            (VALUE_KEY, inner),
            (TIMEOUT_KEY, effect::delay(limit)),
        ]))
        .await?;
    match settled.into_winner() {
        Some((key, value)) if key == VALUE_KEY => Ok(value),
        _ => Err(timed_out(limit)),
    }
}

fn timed_out(limit: Duration) -> SagaError {
    let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
    TaskError::new(format!("timed out after {millis}ms"))
        .with_data(json!({ "timeout_ms": millis }))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::test_utils::{RecordingStore, init_test_logging};
    use crate::types::{Event, TaskStatus};

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn value_arriving_in_time_is_returned() {
        init_test("value_arriving_in_time_is_returned");
        let mut runtime = Runtime::new(RecordingStore::default());
        let task = runtime.run_async("guarded", |co| async move {
            co.effect(timeout(effect::take("REPLY"), Duration::from_millis(100)))
                .await
        });
        runtime.advance(Duration::from_millis(99));
        runtime.dispatch(Event::new("REPLY")).unwrap();
        crate::assert_with_log!(
            task.result() == Some(Value::Event(Event::new("REPLY"))),
            "reply wins",
            "REPLY",
            task.result()
        );
        crate::test_complete!("value_arriving_in_time_is_returned");
    }

    #[test]
    fn timer_winning_fails_and_cancels_the_effect() {
        init_test("timer_winning_fails_and_cancels_the_effect");
        let mut runtime = Runtime::new(RecordingStore::default());
        let task = runtime.run_async("guarded", |co| async move {
            match co
                .effect(timeout(effect::take("REPLY"), Duration::from_millis(100)))
                .await
            {
                Err(SagaError::Task(err)) => Ok(Value::from(err.message)),
                other => other,
            }
        });
        runtime.advance(Duration::from_millis(100));
        crate::assert_with_log!(
            task.result() == Some(Value::from("timed out after 100ms")),
            "timeout error caught",
            "timed out after 100ms",
            task.result()
        );
        assert_eq!(task.status(), TaskStatus::Done);
        assert_eq!(runtime.pending_effects(), 0);
        crate::test_complete!("timer_winning_fails_and_cancels_the_effect");
    }
}
