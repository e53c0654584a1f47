//! Gametick - tick-driven timer scheduling for game servers
//!
//! Thousands of entities register delayed or periodic callbacks on one
//! registry that the server's driver loop pumps once per frame. No thread per
//! timer, no locks around the live set.

// ============================================
// Scheduling
// ============================================

/// Server tick clock
pub mod clock;
/// Timers, the timer registry and pending-op staging
pub mod timer;
/// Driver loop that advances the clock and pumps the registry
pub mod game_loop;

// ============================================
// Server plumbing
// ============================================

/// Scheduler configuration (YAML)
pub mod config;
/// Server lifecycle and shutdown state
pub mod core;
