//! Timer registry
//!
//! Owns the live set and drives it once per server tick:
//!
//! 1. drain pending removals
//! 2. drain pending additions (in request order)
//! 3. fire every live timer whose `next_fire_tick < now`, in insertion order
//!
//! Steps 1-2 are the only places the live set changes. Anything a callback
//! starts or stops during step 3 lands in the pending buffers and takes
//! effect on the next pass.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::handle::PendingIntent;
use super::{lock, GameTimer, OwnerId, TimerError, TimerId};
use crate::clock::GameClock;
use crate::config::SchedulerConfig;

/// Staged membership changes. Multiple producers, drained by the tick thread.
#[derive(Default)]
struct PendingOps {
    add: Vec<GameTimer>,
    remove: Vec<GameTimer>,
}

/// The part of a registry that timers hold on to.
///
/// Timers use it to read the clock and queue start/stop requests; it never
/// exposes the live set.
pub struct RegistryHandle {
    clock: Arc<GameClock>,
    config: SchedulerConfig,
    pending: Mutex<PendingOps>,
    /// Set when the owning registry is dropped; later starts are refused.
    closed: AtomicBool,
}

impl RegistryHandle {
    pub fn clock(&self) -> &Arc<GameClock> {
        &self.clock
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// True once the owning `TimerRegistry` has been dropped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Raw (add, remove) buffer lengths. Stale entries are included.
    pub fn pending_counts(&self) -> (usize, usize) {
        let pending = lock(&self.pending);
        (pending.add.len(), pending.remove.len())
    }

    /// Queue `timer` for the live set.
    ///
    /// Last request wins: a start after a not-yet-drained stop cancels the
    /// stop, and the timer keeps its place in the live set.
    pub(crate) fn request_add(&self, timer: &GameTimer) {
        let mut pending = lock(&self.pending);

        if self.is_closed() {
            tracing::warn!("[timer] [add] {} registry is shut down", timer.describe());
            return;
        }

        if timer.is_live() {
            if timer.intent() == PendingIntent::Remove {
                timer.set_intent(PendingIntent::None);
                tracing::trace!("[timer] [add] {} cancels pending stop", timer.describe());
            }
            return;
        }

        if timer.intent() != PendingIntent::Add {
            timer.set_intent(PendingIntent::Add);
            pending.add.push(timer.clone());
        }
    }

    /// Queue `timer` for removal. A stop on a timer that is only queued for
    /// start cancels the start; otherwise a non-live timer is ignored.
    pub(crate) fn request_remove(&self, timer: &GameTimer) {
        let mut pending = lock(&self.pending);

        if timer.is_live() {
            if timer.intent() != PendingIntent::Remove {
                timer.set_intent(PendingIntent::Remove);
                pending.remove.push(timer.clone());
            }
        } else if timer.intent() == PendingIntent::Add {
            timer.set_intent(PendingIntent::None);
            tracing::trace!("[timer] [remove] {} cancels pending start", timer.describe());
        }
    }
}

/// Counters for one registry pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub removed: usize,
    pub added: usize,
    pub fired: usize,
    pub failed: usize,
    /// Live set size after the pass
    pub live: usize,
    pub elapsed: Duration,
}

pub struct TimerRegistry {
    handle: Arc<RegistryHandle>,
    live: Vec<GameTimer>,
}

impl TimerRegistry {
    pub fn new(clock: Arc<GameClock>, config: SchedulerConfig) -> Self {
        Self {
            handle: Arc::new(RegistryHandle {
                clock,
                config,
                pending: Mutex::new(PendingOps::default()),
                closed: AtomicBool::new(false),
            }),
            live: Vec::new(),
        }
    }

    /// Handle to pass to `GameTimer` constructors.
    pub fn handle(&self) -> &Arc<RegistryHandle> {
        &self.handle
    }

    pub fn clock(&self) -> &Arc<GameClock> {
        &self.handle.clock
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.handle.config
    }

    fn check_owned(&self, timer: &GameTimer) -> Result<(), TimerError> {
        if Arc::ptr_eq(timer.registry(), &self.handle) {
            Ok(())
        } else {
            Err(TimerError::ForeignRegistry {
                timer: timer.describe(),
            })
        }
    }

    /// Queue `timer` for the live set without restamping it.
    pub fn request_add(&self, timer: &GameTimer) -> Result<(), TimerError> {
        self.check_owned(timer)?;
        self.handle.request_add(timer);
        Ok(())
    }

    pub fn request_remove(&self, timer: &GameTimer) -> Result<(), TimerError> {
        self.check_owned(timer)?;
        self.handle.request_remove(timer);
        Ok(())
    }

    /// Live-set membership. Pending starts are not live yet.
    pub fn contains(&self, timer: &GameTimer) -> bool {
        Arc::ptr_eq(timer.registry(), &self.handle) && timer.is_live()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Live timers in fire order.
    pub fn live_timers(&self) -> &[GameTimer] {
        &self.live
    }

    pub fn pending_counts(&self) -> (usize, usize) {
        self.handle.pending_counts()
    }

    pub fn timers_owned_by(&self, owner: OwnerId) -> Vec<GameTimer> {
        self.live
            .iter()
            .filter(|t| t.owner() == Some(owner))
            .cloned()
            .collect()
    }

    /// Stop every live or queued timer attached to `owner`, e.g. when the
    /// entity despawns. Returns how many timers were stopped.
    pub fn stop_all_owned_by(&self, owner: OwnerId) -> usize {
        let queued: Vec<GameTimer> = lock(&self.handle.pending)
            .add
            .iter()
            .filter(|t| t.owner() == Some(owner))
            .cloned()
            .collect();

        let mut seen: HashSet<TimerId> = HashSet::new();
        let mut stopped = 0;
        for timer in self
            .live
            .iter()
            .filter(|t| t.owner() == Some(owner))
            .chain(queued.iter())
        {
            if !seen.insert(timer.id()) {
                continue;
            }
            if timer.is_live() || timer.intent() == PendingIntent::Add {
                timer.stop();
                stopped += 1;
            }
        }

        if stopped > 0 {
            tracing::debug!("[timer] [owner] stopped {} timers for {}", stopped, owner);
        }
        stopped
    }

    /// Drop every live and pending timer immediately. Handles held elsewhere
    /// report `is_live() == false` afterwards and can be started again.
    pub fn stop_all(&mut self) -> usize {
        let mut guard = lock(&self.handle.pending);
        let pending = &mut *guard;
        for timer in pending.add.drain(..).chain(pending.remove.drain(..)) {
            timer.set_intent(PendingIntent::None);
        }

        let count = self.live.len();
        for timer in self.live.drain(..) {
            timer.set_live(false);
            timer.set_intent(PendingIntent::None);
        }
        count
    }

    /// Run one registry pass at tick time `now`.
    pub fn tick(&mut self, now: i64) -> TickStats {
        let started = Instant::now();
        let mut stats = TickStats::default();

        self.drain_pending(&mut stats);

        let policy = self.handle.config.on_callback_error;
        for timer in &self.live {
            if timer.next_fire_tick() < now {
                stats.fired += 1;
                if let Err(e) = timer.fire(now, policy) {
                    stats.failed += 1;
                    tracing::error!("[timer] [callback] {} (policy={:?})", e, policy);
                }
            }
        }

        stats.live = self.live.len();
        stats.elapsed = started.elapsed();

        let slow = Duration::from_millis(self.handle.config.slow_tick_warn_ms);
        if stats.elapsed > slow {
            tracing::warn!(
                "[timer] [slow] pass at tick={} took {:?} (fired={}, live={})",
                now,
                stats.elapsed,
                stats.fired,
                stats.live
            );
        } else {
            tracing::trace!("[timer] [tick] now={} {:?}", now, stats);
        }

        stats
    }

    fn drain_pending(&mut self, stats: &mut TickStats) {
        let mut pending = lock(&self.handle.pending);
        let removals = std::mem::take(&mut pending.remove);
        let additions = std::mem::take(&mut pending.add);

        for timer in removals {
            // stale entries: the stop was cancelled or already applied
            if timer.intent() == PendingIntent::Remove && timer.is_live() {
                timer.set_live(false);
                timer.set_intent(PendingIntent::None);
                stats.removed += 1;
            }
        }
        if stats.removed > 0 {
            self.live.retain(|t| t.is_live());
        }

        for timer in additions {
            if timer.intent() == PendingIntent::Add && !timer.is_live() {
                timer.set_live(true);
                timer.set_intent(PendingIntent::None);
                self.live.push(timer);
                stats.added += 1;
            }
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        {
            // under the buffer lock so no start can slip in after the flag
            let _pending = lock(&self.handle.pending);
            self.handle.closed.store(true, Ordering::Release);
        }
        let count = self.stop_all();
        if count > 0 {
            tracing::debug!("[timer] [teardown] released {} live timers", count);
        }
    }
}
