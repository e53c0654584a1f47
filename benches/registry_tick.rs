use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use gametick::clock::GameClock;
use gametick::config::SchedulerConfig;
use gametick::timer::{GameTimer, OwnerId, TimerRegistry};

/// Registry with `count` live timers, a tenth of them due on every pass.
fn populated_registry(count: u64) -> (Arc<GameClock>, TimerRegistry, Vec<GameTimer>) {
    let clock = Arc::new(GameClock::new());
    let mut registry = TimerRegistry::new(clock.clone(), SchedulerConfig::default());

    let timers: Vec<GameTimer> = (0..count)
        .map(|i| {
            let interval = if i % 10 == 0 { 5 } else { 60_000 };
            let timer = GameTimer::with_callback(registry.handle(), OwnerId(i), move |_| Ok(interval));
            timer.start_with(interval);
            timer
        })
        .collect();

    registry.tick(clock.advance(1));
    (clock, registry, timers)
}

fn bench_tick(c: &mut Criterion) {
    let (clock, mut registry, _timers) = populated_registry(10_000);
    c.bench_function("tick 10k live, 1k due", |b| {
        b.iter(|| black_box(registry.tick(clock.advance(10))))
    });
}

fn bench_churn(c: &mut Criterion) {
    let (clock, mut registry, timers) = populated_registry(10_000);
    c.bench_function("tick with 100 stop/start requests", |b| {
        b.iter(|| {
            for timer in timers.iter().step_by(100) {
                timer.stop();
            }
            registry.tick(clock.advance(10));
            for timer in timers.iter().step_by(100) {
                timer.start_with(60_000);
            }
            black_box(registry.tick(clock.advance(10)))
        })
    });
}

criterion_group!(benches, bench_tick, bench_churn);
criterion_main!(benches);
