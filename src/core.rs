//! Core server lifecycle
//!
//! This module provides:
//! - The default server tick rate
//! - Shutdown state shared between the driver loop and signal handling
//! - Termination callback system

use std::sync::{Arc, Mutex};

/// Default server tick rate in milliseconds
pub const SERVER_TICK_RATE_MS: u64 = 10;

/// Type alias for termination callback functions
/// These are called once when shutdown is requested
pub type TermFunc = Box<dyn Fn() + Send + 'static>;

/// Global server state
pub struct ServerState {
    /// Flag indicating if shutdown has been requested
    pub shutdown_requested: bool,
    /// Optional termination callback
    pub term_func: Option<TermFunc>,
}

impl ServerState {
    /// Create a new ServerState
    pub fn new() -> Self {
        ServerState {
            shutdown_requested: false,
            term_func: None,
        }
    }

    /// Request server shutdown. Runs the termination callback the first time.
    pub fn request_shutdown(&mut self) {
        if !self.shutdown_requested {
            self.call_term_func();
        }
        self.shutdown_requested = true;
    }

    /// Check if shutdown has been requested
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_requested
    }

    /// Set the termination callback function
    pub fn set_term_func<F>(&mut self, func: F)
    where
        F: Fn() + Send + 'static,
    {
        self.term_func = Some(Box::new(func));
    }

    /// Call the termination function if set
    pub fn call_term_func(&self) {
        if let Some(ref func) = self.term_func {
            func();
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe server state, shared by the driver loop and the signal task
pub type SharedServerState = Arc<Mutex<ServerState>>;

/// Create a new shared server state
pub fn create_server_state() -> SharedServerState {
    Arc::new(Mutex::new(ServerState::new()))
}

/// Check a shared state for shutdown, treating a poisoned lock as "yes".
pub fn shutdown_requested(state: &SharedServerState) -> bool {
    state.lock().map(|s| s.should_shutdown()).unwrap_or(true)
}
