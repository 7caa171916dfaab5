//! Retrying calls.

use super::call_helper;
use crate::effect::{self, CallOutcome, Callable, Effect};
use crate::error::SagaError;
use crate::saga::Co;
use crate::tracing_compat::debug;
use crate::types::Value;
use std::time::Duration;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A fixed-delay policy.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            multiplier: 1,
            max_delay: Duration::MAX,
        }
    }

    /// Multiplies the delay by `multiplier` after every failure.
    #[must_use]
    pub const fn with_backoff(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Caps each delay.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Returns the delay that follows failed attempt number `attempt`
    /// (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Calls `func(args)` up to `max_attempts` times, waiting `delay` between
/// failures. Resolves with the first success or throws the last error.
pub fn retry<F>(max_attempts: u32, delay: Duration, func: F, args: Vec<Value>) -> Effect
where
    F: Fn(Vec<Value>) -> CallOutcome + 'static,
{
    retry_with(
        RetryPolicy::new(max_attempts, delay),
        Callable::new(std::any::type_name::<F>(), func),
        args,
    )
}

/// Like [`retry`], with a full policy and a prepared callable.
#[must_use]
pub fn retry_with(policy: RetryPolicy, func: Callable, args: Vec<Value>) -> Effect {
    call_helper("retry", move |co| {
        attempt_loop(co, policy, func.clone(), args.clone())
    })
}

async fn attempt_loop(
    co: Co,
    policy: RetryPolicy,
    func: Callable,
    args: Vec<Value>,
) -> Result<Value, SagaError> {
    let mut attempt = 1;
    loop {
        match co.effect(effect::call_fn(func.clone(), args.clone())).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_interrupt() || attempt >= policy.attempts() => return Err(err),
            Err(err) => {
                let pause = policy.delay_after(attempt);
                debug!(func = func.name(), attempt, error = %err, delay_ms = pause.as_millis() as u64, "call failed, retrying");
                co.effect(effect::delay(pause)).await?;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::test_utils::init_test_logging;
    use crate::types::TaskStatus;
    use std::cell::Cell;
    use std::rc::Rc;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn flaky(failures: u32, calls: &Rc<Cell<u32>>) -> impl Fn(Vec<Value>) -> CallOutcome + 'static {
        let calls = Rc::clone(calls);
        move |_| {
            calls.set(calls.get() + 1);
            if calls.get() <= failures {
                CallOutcome::err(format!("attempt {} failed", calls.get()))
            } else {
                CallOutcome::ok("ok")
            }
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10))
            .with_backoff(2)
            .with_max_delay(Duration::from_millis(30));
        assert_eq!(policy.delay_after(1), Duration::from_millis(10));
        assert_eq!(policy.delay_after(2), Duration::from_millis(20));
        assert_eq!(policy.delay_after(3), Duration::from_millis(30));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }

    #[test]
    fn succeeds_after_transient_failures() {
        init_test("succeeds_after_transient_failures");
        let calls = Rc::new(Cell::new(0));
        let mut runtime = Runtime::default();
        let task = runtime.run_async("retrying", {
            let func = flaky(2, &calls);
            move |co| async move {
                co.effect(retry(3, Duration::from_millis(5), func, Vec::new()))
                    .await
            }
        });
        runtime.advance(Duration::from_millis(5));
        crate::assert_with_log!(calls.get() == 2, "second attempt ran", 2, calls.get());
        assert!(task.is_running());
        runtime.advance(Duration::from_millis(5));
        crate::assert_with_log!(task.result() == Some(Value::from("ok")), "third attempt wins", "ok", task.result());
        crate::test_complete!("succeeds_after_transient_failures");
    }

    #[test]
    fn gives_up_with_last_error() {
        init_test("gives_up_with_last_error");
        let calls = Rc::new(Cell::new(0));
        let mut runtime = Runtime::default();
        let task = runtime.run_async("retrying", {
            let func = flaky(10, &calls);
            move |co| async move {
                co.effect(retry(2, Duration::from_millis(5), func, Vec::new()))
                    .await
            }
        });
        runtime.run_until_stalled();
        crate::assert_with_log!(calls.get() == 2, "two attempts", 2, calls.get());
        assert_eq!(task.status(), TaskStatus::Errored);
        assert_eq!(task.error(), Some(SagaError::task("attempt 2 failed")));
        crate::test_complete!("gives_up_with_last_error");
    }
}
