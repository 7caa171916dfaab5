//! Rate-limited watchers.

use super::{Worker, fork_helper};
use crate::channel::BufferPolicy;
use crate::effect::{self, CallOutcome, Effect};
use crate::error::SagaError;
use crate::pattern::Pattern;
use crate::saga::Co;
use crate::types::Value;
use std::time::Duration;

/// Forks `worker` for a matching event, then ignores events for `window`.
///
/// The newest event seen during the window is kept and starts the next
/// worker once the window closes.
pub fn throttle<W>(window: Duration, pattern: impl Into<Pattern>, worker: W) -> Effect
where
    W: Fn(Value) -> CallOutcome + 'static,
{
    let pattern = pattern.into();
    let worker = Worker::from_fn(worker);
    fork_helper("throttle", move |co| {
        throttled(co, window, pattern.clone(), worker.clone())
    })
}

async fn throttled(
    co: Co,
    window: Duration,
    pattern: Pattern,
    worker: Worker,
) -> Result<Value, SagaError> {
    let opened = co
        .effect(effect::action_channel_with(pattern, BufferPolicy::Sliding(1)))
        .await?;
    let Some(channel) = opened.as_channel().cloned() else {
        return Err(SagaError::task("action channel effect returned no channel"));
    };
    loop {
        let input = co.effect(effect::take(&channel)).await?;
        co.effect(worker.fork(input)).await?;
        co.effect(effect::delay(window)).await?;
    }
}

/// Forks `worker` with the last matching event once no further match has
/// arrived for `window`.
///
/// If the bus ends while an event is waiting, the worker still starts.
pub fn debounce<W>(window: Duration, pattern: impl Into<Pattern>, worker: W) -> Effect
where
    W: Fn(Value) -> CallOutcome + 'static,
{
    let pattern = pattern.into();
    let worker = Worker::from_fn(worker);
    fork_helper("debounce", move |co| {
        debounced(co, window, pattern.clone(), worker.clone())
    })
}

async fn debounced(
    co: Co,
    window: Duration,
    pattern: Pattern,
    worker: Worker,
) -> Result<Value, SagaError> {
    loop {
        let mut input = co.effect(effect::take(pattern.clone())).await?;
        loop {
            let settled = co
                .effect(effect::race([
                    ("quiet", effect::delay(window)),
                    ("next", effect::take_maybe(pattern.clone())),
                ]))
                .await?;
            match settled.into_winner() {
                Some((key, next)) if key == "next" && !next.is_end() => input = next,
                Some((key, _)) if key == "next" => {
                    co.effect(worker.fork(input)).await?;
                    return Ok(Value::Unit);
                }
                _ => {
                    co.effect(worker.fork(input)).await?;
                    break;
                }
            }
        }
    }
}
