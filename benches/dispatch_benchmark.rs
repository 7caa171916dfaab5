//! Dispatch and effect interpretation benchmarks for sagasync.
//!
//! Benchmarks the paths every application exercises:
//! - Event dispatch fan-out to blocked pattern takers
//! - Worker start-up through `take_every`
//! - Channel put/take handoff between two sagas
//! - Race setup and loser cancellation
//!
//! Run:
//!   cargo bench --bench dispatch_benchmark

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use sagasync::channel::Channel;
use sagasync::combinator::take_every;
use sagasync::effect::{self, CallOutcome};
use sagasync::runtime::{NullStore, Runtime};
use sagasync::saga::{self, Co};
use sagasync::SagaError;
use sagasync::types::{Event, Value};
use std::time::Duration;

// =============================================================================
// HELPERS
// =============================================================================

async fn listen(co: Co) -> Result<Value, SagaError> {
    loop {
        co.effect(effect::take("TICK")).await?;
    }
}

/// A runtime with `listeners` root sagas each looping on `take("TICK")`.
fn runtime_with_listeners(listeners: usize) -> Runtime {
    let mut runtime = Runtime::new(NullStore);
    for index in 0..listeners {
        runtime.run_async(&format!("listener-{index}"), listen);
    }
    runtime
}

// =============================================================================
// DISPATCH BENCHMARKS
// =============================================================================

fn bench_dispatch_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/fan_out");
    for &listeners in &[1usize, 16, 256] {
        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(
            BenchmarkId::new("take_loop", listeners),
            &listeners,
            |b, &listeners| {
                let mut runtime = runtime_with_listeners(listeners);
                b.iter(|| black_box(runtime.dispatch(Event::new("TICK"))))
            },
        );
    }
    group.finish();
}

fn bench_take_every_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/take_every");
    let events = 128u64;
    group.throughput(Throughput::Elements(events));
    group.bench_function("spawn_ready_workers", |b| {
        b.iter_batched(
            || {
                let mut runtime = Runtime::default();
                runtime.run_saga(
                    "root",
                    saga::sequence([take_every("JOB", |input| CallOutcome::ok(input))]),
                );
                runtime
            },
            |mut runtime| {
                for _ in 0..events {
                    runtime.dispatch(Event::new("JOB")).ok();
                }
                runtime
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

// =============================================================================
// CHANNEL BENCHMARKS
// =============================================================================

fn bench_channel_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel/handoff");
    let values = 256i64;
    group.throughput(Throughput::Elements(values as u64));
    group.bench_function("producer_consumer", |b| {
        b.iter(|| {
            let mut runtime = Runtime::default();
            let channel = Channel::default();
            let consumer = runtime.run_async("consumer", {
                let channel = channel.clone();
                move |co| async move {
                    let mut sum = 0;
                    loop {
                        let value = co.effect(effect::take_maybe(&channel)).await?;
                        if value.is_end() {
                            return Ok::<_, SagaError>(Value::from(sum));
                        }
                        sum += value.as_i64().unwrap_or_default();
                    }
                }
            });
            runtime.run_async("producer", move |co| async move {
                for n in 0..values {
                    co.effect(effect::put_channel(&channel, n)).await?;
                }
                co.effect(effect::put_channel(&channel, Value::End)).await
            });
            black_box(consumer.result())
        })
    });
    group.finish();
}

// =============================================================================
// RACE BENCHMARKS
// =============================================================================

fn bench_race_cancellation(c: &mut Criterion) {
    let mut group = c.benchmark_group("race/cancel_losers");
    for &branches in &[2usize, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("timer_losers", branches),
            &branches,
            |b, &branches| {
                b.iter(|| {
                    let mut runtime = Runtime::default();
                    let task = runtime.run_async("racer", move |co| async move {
                        let mut arms = vec![("winner".to_string(), effect::take("GO"))];
                        arms.extend((0..branches).map(|index| {
                            (
                                format!("loser-{index}"),
                                effect::delay(Duration::from_secs(60)),
                            )
                        }));
                        co.effect(effect::race(arms)).await
                    });
                    runtime.dispatch(Event::new("GO")).ok();
                    black_box(task.result())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_dispatch_fan_out,
    bench_take_every_workers,
    bench_channel_handoff,
    bench_race_cancellation
);
criterion_main!(benches);
