//! Server driver loop
//!
//! Advances the game clock once per frame and runs one timer registry pass.
//! The clock follows wall time measured from when the loop was created; a
//! frame that arrives late simply sees a larger jump.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::clock::GameClock;
use crate::config::SchedulerConfig;
use crate::core::{shutdown_requested, SharedServerState};
use crate::timer::{RegistryHandle, TickStats, TimerRegistry};

pub struct GameLoop {
    registry: TimerRegistry,
    /// Wall-clock reference for `step`
    started: Instant,
    /// Clock value at `started`
    base_tick: i64,
    tick_rate: Duration,
    frames: u64,
}

impl GameLoop {
    pub fn new(clock: Arc<GameClock>, config: SchedulerConfig) -> Self {
        let tick_rate = Duration::from_millis(config.tick_rate_ms);
        let base_tick = clock.now();
        Self {
            registry: TimerRegistry::new(clock, config),
            started: Instant::now(),
            base_tick,
            tick_rate,
            frames: 0,
        }
    }

    pub fn registry(&self) -> &TimerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TimerRegistry {
        &mut self.registry
    }

    /// Handle for constructing timers driven by this loop.
    pub fn handle(&self) -> &Arc<RegistryHandle> {
        self.registry.handle()
    }

    pub fn clock(&self) -> &Arc<GameClock> {
        self.registry.clock()
    }

    pub fn tick_rate(&self) -> Duration {
        self.tick_rate
    }

    /// Frames run so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Stamp the clock from wall time and run one registry pass.
    pub fn step(&mut self) -> TickStats {
        let elapsed = i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let now = self
            .registry
            .clock()
            .advance_to(self.base_tick.saturating_add(elapsed));
        self.run_frame(now)
    }

    /// Advance the clock by exactly `delta` ms and run one registry pass.
    /// Deterministic; used by tools and tests that drive time by hand.
    pub fn step_by(&mut self, delta: i64) -> TickStats {
        let now = self.registry.clock().advance(delta);
        self.run_frame(now)
    }

    fn run_frame(&mut self, now: i64) -> TickStats {
        self.frames += 1;
        self.registry.tick(now)
    }

    /// Run frames at the configured tick rate until shutdown is requested.
    /// Returns the number of frames run.
    pub async fn run(&mut self, state: SharedServerState) -> u64 {
        let first = self.frames;
        let mut ticker = tokio::time::interval(self.tick_rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "[loop] [started] tick_rate={:?} epoch={}",
            self.tick_rate,
            self.registry.clock().epoch()
        );

        loop {
            ticker.tick().await;
            if shutdown_requested(&state) {
                break;
            }
            self.step();
        }

        let ran = self.frames - first;
        tracing::info!(
            "[loop] [stopped] frames={} live_timers={}",
            ran,
            self.registry.live_count()
        );
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::create_server_state;
    use crate::timer::{GameTimer, OwnerId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            tick_rate_ms: 1,
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn test_step_by_is_deterministic() {
        let clock = Arc::new(GameClock::new());
        let mut game_loop = GameLoop::new(clock.clone(), SchedulerConfig::default());

        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let timer = GameTimer::with_callback(game_loop.handle(), OwnerId(1), move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(100)
        });
        timer.start_with(100);

        for _ in 0..10 {
            game_loop.step_by(10);
        }
        assert_eq!(clock.now(), 100);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        game_loop.step_by(10);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(game_loop.frames(), 11);
    }

    #[test]
    fn test_step_follows_wall_clock() {
        let clock = Arc::new(GameClock::starting_at(5_000));
        let mut game_loop = GameLoop::new(clock.clone(), fast_config());

        std::thread::sleep(Duration::from_millis(5));
        game_loop.step();
        assert!(clock.now() >= 5_005);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let clock = Arc::new(GameClock::new());
        let mut game_loop = GameLoop::new(clock, fast_config());
        let state = create_server_state();

        let beats = Arc::new(AtomicUsize::new(0));
        let b = beats.clone();
        let s = state.clone();
        let heartbeat = GameTimer::with_callback(game_loop.handle(), OwnerId(1), move |_| {
            if b.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                s.lock().unwrap().request_shutdown();
            }
            Ok(2)
        });
        heartbeat.start_with(2);

        let frames = tokio::time::timeout(Duration::from_secs(10), game_loop.run(state.clone()))
            .await
            .expect("loop did not stop");

        assert!(frames > 0);
        assert_eq!(beats.load(Ordering::SeqCst), 3);
        assert!(heartbeat.is_live());
    }

    #[tokio::test]
    async fn test_term_func_stops_timers_on_shutdown() {
        let mut game_loop = GameLoop::new(Arc::new(GameClock::new()), fast_config());
        let state = create_server_state();

        let s = state.clone();
        let heartbeat = GameTimer::with_callback(game_loop.handle(), OwnerId(1), move |_| {
            s.lock().unwrap().request_shutdown();
            Ok(2)
        });
        heartbeat.start_with(2);

        let h = heartbeat.clone();
        state.lock().unwrap().set_term_func(move || h.stop());

        tokio::time::timeout(Duration::from_secs(10), game_loop.run(state.clone()))
            .await
            .expect("loop did not stop");
        assert!(heartbeat.is_live());

        let stats = game_loop.step();
        assert_eq!(stats.removed, 1);
        assert!(!heartbeat.is_live());
        assert_eq!(game_loop.registry().live_count(), 0);
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_already_shut_down() {
        let mut game_loop = GameLoop::new(Arc::new(GameClock::new()), fast_config());
        let state = create_server_state();
        state.lock().unwrap().request_shutdown();

        assert_eq!(game_loop.run(state).await, 0);
    }
}
