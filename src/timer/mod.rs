//! Tick-driven timer scheduling
//!
//! Entities register delayed or periodic callbacks on a [`TimerRegistry`];
//! the driver loop calls [`TimerRegistry::tick`] once per server frame.
//!
//! Starting and stopping a timer never touches the live set directly. The
//! request lands in a pending buffer that the registry drains at the start of
//! its next pass, so callbacks may start or stop any timer (including their
//! own) while the registry is iterating.
//!
//! ```
//! use std::sync::Arc;
//! use gametick::clock::GameClock;
//! use gametick::config::SchedulerConfig;
//! use gametick::timer::{GameTimer, OwnerId, TimerRegistry};
//!
//! let clock = Arc::new(GameClock::new());
//! let mut registry = TimerRegistry::new(clock.clone(), SchedulerConfig::default());
//!
//! let timer = GameTimer::with_callback(registry.handle(), OwnerId(7), |_| Ok(0));
//! timer.start_with(100);
//!
//! registry.tick(clock.advance(10));   // drained, not yet due
//! assert!(timer.is_live());
//! registry.tick(clock.advance(100));  // fires, returns 0 -> stop requested
//! registry.tick(clock.advance(10));   // removal drained
//! assert!(!timer.is_live());
//! ```

mod handle;
mod properties;
mod registry;

pub use handle::{GameTimer, TimerCallback};
pub use properties::PropertyCollection;
pub use registry::{RegistryHandle, TickStats, TimerRegistry};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Interval used when a timer is started without one and no config is loaded
pub const DEFAULT_INTERVAL_MS: i32 = 500;

/// Error types for timer operations
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("Negative interval: {0}ms")]
    NegativeInterval(i32),

    #[error("Timer {timer} belongs to a different registry")]
    ForeignRegistry { timer: String },

    #[error("Callback failed: timer={timer}, reason={reason}")]
    CallbackFailed { timer: String, reason: String },

    #[error("Callback panicked: timer={timer}, reason={reason}")]
    CallbackPanicked { timer: String, reason: String },
}

/// Opaque id of the entity a timer is attached to. Bookkeeping only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Process-unique timer identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Callback panics are caught and isolated; the scheduler's own state must
/// stay usable afterwards.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
