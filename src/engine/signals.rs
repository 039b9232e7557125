//! Signal flags for the `watch` loop: SIGINT/SIGTERM request shutdown, SIGHUP
//! requests a full reload of the monitored log.
//!
//! Handlers only flip atomics; the loop polls them between redraws.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    reload_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create the flags and register OS hooks. Registration failures are
    /// reported on stderr and otherwise ignored.
    #[must_use]
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// Flags without OS hooks, for tests and embedding.
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            reload_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Check and clear the reload request.
    #[must_use]
    pub fn should_reload(&self) -> bool {
        self.reload_flag.swap(false, Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_reload(&self) {
        self.reload_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        for (signal, name) in [(SIGTERM, "SIGTERM"), (SIGINT, "SIGINT")] {
            if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&self.shutdown_flag)) {
                eprintln!("[CLM-SIGNAL] failed to register {name}: {e}");
            }
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::SIGHUP;
            if let Err(e) = signal_hook::flag::register(SIGHUP, Arc::clone(&self.reload_flag)) {
                eprintln!("[CLM-SIGNAL] failed to register SIGHUP: {e}");
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
