//! Timer handle
//!
//! A `GameTimer` is a cheap cloneable handle. The owning entity keeps it
//! around to start and stop the timer; the registry keeps a clone in its
//! live set while the timer is scheduled. Clones compare equal.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use super::registry::RegistryHandle;
use super::{lock, OwnerId, PropertyCollection, TimerError, TimerId};
use crate::clock::TimeSource;
use crate::config::CallbackFailurePolicy;

/// Callback invoked when a timer fires. The returned value is the next
/// interval in ms; `0` stops the timer.
pub type TimerCallback = Box<dyn FnMut(&GameTimer) -> anyhow::Result<i32> + Send + 'static>;

/// Net membership change requested since the last drain.
///
/// Only written while the registry's pending buffer lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum PendingIntent {
    None = 0,
    Add = 1,
    Remove = 2,
}

impl PendingIntent {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PendingIntent::Add,
            2 => PendingIntent::Remove,
            _ => PendingIntent::None,
        }
    }
}

/// Target time for `time_until_elapsed`, measured on a separate time source.
struct LegacyTarget {
    target: i64,
    source: Option<Arc<dyn TimeSource>>,
}

struct TimerInner {
    id: TimerId,
    owner: Option<OwnerId>,
    registry: Arc<RegistryHandle>,

    interval: AtomicI32,
    start_tick: AtomicI64,

    callback: Mutex<Option<TimerCallback>>,
    /// Bumped by every set/clear so `fire` knows not to restore a callback
    /// that was replaced while it ran.
    callback_gen: AtomicU64,

    /// Member of the registry's live set. Written only by the drain.
    live: AtomicBool,
    intent: AtomicU8,

    legacy: Mutex<LegacyTarget>,
    properties: OnceLock<PropertyCollection>,
}

#[derive(Clone)]
pub struct GameTimer {
    inner: Arc<TimerInner>,
}

impl GameTimer {
    /// A timer attached to `owner` with no callback yet.
    pub fn new(registry: &Arc<RegistryHandle>, owner: OwnerId) -> Self {
        Self::build(registry, Some(owner), None, 0, None)
    }

    pub fn with_callback<F>(registry: &Arc<RegistryHandle>, owner: OwnerId, callback: F) -> Self
    where
        F: FnMut(&GameTimer) -> anyhow::Result<i32> + Send + 'static,
    {
        let callback: TimerCallback = Box::new(callback);
        Self::build(registry, Some(owner), Some(callback), 0, None)
    }

    /// Like `with_callback` but with the interval preset. The timer is not
    /// started; call `start_with(timer.interval())` or `start_with(..)`.
    pub fn with_interval<F>(
        registry: &Arc<RegistryHandle>,
        owner: OwnerId,
        callback: F,
        interval: i32,
    ) -> Self
    where
        F: FnMut(&GameTimer) -> anyhow::Result<i32> + Send + 'static,
    {
        let callback: TimerCallback = Box::new(callback);
        Self::build(registry, Some(owner), Some(callback), interval.max(0), None)
    }

    /// An unowned timer bound to a separate time source, for collaborators
    /// that read `time_until_elapsed`.
    pub fn for_time_source(registry: &Arc<RegistryHandle>, source: Arc<dyn TimeSource>) -> Self {
        Self::build(registry, None, None, 0, Some(source))
    }

    fn build(
        registry: &Arc<RegistryHandle>,
        owner: Option<OwnerId>,
        callback: Option<TimerCallback>,
        interval: i32,
        source: Option<Arc<dyn TimeSource>>,
    ) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                id: TimerId::next(),
                owner,
                registry: Arc::clone(registry),
                interval: AtomicI32::new(interval),
                start_tick: AtomicI64::new(0),
                callback: Mutex::new(callback),
                callback_gen: AtomicU64::new(0),
                live: AtomicBool::new(false),
                intent: AtomicU8::new(PendingIntent::None as u8),
                legacy: Mutex::new(LegacyTarget { target: -1, source }),
                properties: OnceLock::new(),
            }),
        }
    }

    // ============================================
    // Scheduling
    // ============================================

    /// Start with the registry's default interval.
    pub fn start(&self) {
        self.start_with(self.inner.registry.config().default_interval_ms);
    }

    /// Start counting `interval` ms from the current tick. Negative intervals
    /// are clamped to 0 (fire on the next pass, then stop).
    ///
    /// Starting a live timer restamps it but does not move it in the live set.
    pub fn start_with(&self, interval: i32) {
        let interval = if interval < 0 {
            tracing::warn!(
                "[timer] [start] {} negative interval {}ms clamped to 0",
                self.describe(),
                interval
            );
            0
        } else {
            interval
        };
        self.arm(interval);
    }

    /// Like `start_with` but rejects negative intervals.
    pub fn try_start_with(&self, interval: i32) -> Result<(), TimerError> {
        if interval < 0 {
            return Err(TimerError::NegativeInterval(interval));
        }
        self.arm(interval);
        Ok(())
    }

    fn arm(&self, interval: i32) {
        let now = self.inner.registry.clock().now();
        self.inner.start_tick.store(now, Ordering::Release);
        self.inner.interval.store(interval, Ordering::Release);
        self.inner.registry.request_add(self);
    }

    /// Request removal from the live set. No-op if not live.
    pub fn stop(&self) {
        self.inner.registry.request_remove(self);
    }

    /// True while the timer is a member of the registry's live set.
    /// Pending starts do not count.
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    // ============================================
    // Accessors
    // ============================================

    pub fn id(&self) -> TimerId {
        self.inner.id
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.inner.owner
    }

    pub fn interval(&self) -> i32 {
        self.inner.interval.load(Ordering::Acquire)
    }

    pub fn start_tick(&self) -> i64 {
        self.inner.start_tick.load(Ordering::Acquire)
    }

    pub fn next_fire_tick(&self) -> i64 {
        self.start_tick() + i64::from(self.interval())
    }

    pub fn has_callback(&self) -> bool {
        lock(&self.inner.callback).is_some()
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(&GameTimer) -> anyhow::Result<i32> + Send + 'static,
    {
        let callback: TimerCallback = Box::new(callback);
        let mut slot = lock(&self.inner.callback);
        *slot = Some(callback);
        self.inner.callback_gen.fetch_add(1, Ordering::AcqRel);
    }

    pub fn clear_callback(&self) {
        let mut slot = lock(&self.inner.callback);
        *slot = None;
        self.inner.callback_gen.fetch_add(1, Ordering::AcqRel);
    }

    /// Lazily created key/value store for callback state.
    pub fn properties(&self) -> &PropertyCollection {
        self.inner.properties.get_or_init(PropertyCollection::new)
    }

    /// Set the target time measured on the attached time source.
    pub fn set_legacy_target(&self, target: i64) {
        lock(&self.inner.legacy).target = target;
    }

    pub fn set_time_source(&self, source: Arc<dyn TimeSource>) {
        lock(&self.inner.legacy).source = Some(source);
    }

    /// Milliseconds until the legacy target time, or -1 if none is set.
    pub fn time_until_elapsed(&self) -> i64 {
        let legacy = lock(&self.inner.legacy);
        if legacy.target < 0 {
            return -1;
        }
        match &legacy.source {
            Some(source) => legacy.target - source.current_time(),
            None => -1,
        }
    }

    /// `timer#N (owner#M)` for log lines.
    pub fn describe(&self) -> String {
        match self.inner.owner {
            Some(owner) => format!("{} ({})", self.inner.id, owner),
            None => format!("{} (unowned)", self.inner.id),
        }
    }

    // ============================================
    // Registry-side
    // ============================================

    pub(crate) fn registry(&self) -> &Arc<RegistryHandle> {
        &self.inner.registry
    }

    pub(crate) fn intent(&self) -> PendingIntent {
        PendingIntent::from_u8(self.inner.intent.load(Ordering::Acquire))
    }

    pub(crate) fn set_intent(&self, intent: PendingIntent) {
        self.inner.intent.store(intent as u8, Ordering::Release);
    }

    pub(crate) fn set_live(&self, live: bool) {
        self.inner.live.store(live, Ordering::Release);
    }

    /// Run one firing. Called by the registry at most once per pass.
    ///
    /// Restamps the start tick, runs the callback and adopts its return value
    /// as the new interval. An interval of 0 requests removal. Failures are
    /// handled per `policy` and returned for logging.
    pub(crate) fn fire(&self, now: i64, policy: CallbackFailurePolicy) -> Result<(), TimerError> {
        self.inner.start_tick.store(now, Ordering::Release);

        let gen = self.inner.callback_gen.load(Ordering::Acquire);
        let taken = lock(&self.inner.callback).take();

        let mut failure = None;
        if let Some(mut callback) = taken {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(self)));

            {
                let mut slot = lock(&self.inner.callback);
                if slot.is_none() && self.inner.callback_gen.load(Ordering::Acquire) == gen {
                    *slot = Some(callback);
                }
            }

            match result {
                Ok(Ok(next)) => {
                    let next = if next < 0 {
                        tracing::warn!(
                            "[timer] [fire] {} callback returned negative interval {}, stopping",
                            self.describe(),
                            next
                        );
                        0
                    } else {
                        next
                    };
                    self.inner.interval.store(next, Ordering::Release);
                }
                Ok(Err(e)) => {
                    failure = Some(TimerError::CallbackFailed {
                        timer: self.describe(),
                        reason: format!("{e:#}"),
                    });
                }
                Err(payload) => {
                    failure = Some(TimerError::CallbackPanicked {
                        timer: self.describe(),
                        reason: panic_message(payload.as_ref()),
                    });
                }
            }
        }

        match failure {
            Some(err) => {
                // a one-shot has nothing to re-arm with, even under keep_live
                if policy == CallbackFailurePolicy::Stop || self.interval() == 0 {
                    self.stop();
                }
                Err(err)
            }
            None => {
                if self.interval() == 0 {
                    self.stop();
                }
                Ok(())
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "(non-string panic payload)".to_string()
    }
}

impl PartialEq for GameTimer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for GameTimer {}

impl std::hash::Hash for GameTimer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl std::fmt::Debug for GameTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameTimer")
            .field("id", &self.inner.id)
            .field("owner", &self.inner.owner)
            .field("interval", &self.interval())
            .field("start_tick", &self.start_tick())
            .field("live", &self.is_live())
            .finish()
    }
}
