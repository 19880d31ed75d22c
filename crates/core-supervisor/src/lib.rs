//! Startup arbitration and shutdown signaling (spec component C9).
//!
//! The wire-level control API that would normally flip between live and
//! playback mode at runtime is out of scope; the in-scope stand-in is a
//! mode fixed for the process's lifetime plus a duration-based auto-stop,
//! both decided once at startup. What's in-scope either way is owning the
//! single stop flag every loop polls and installing the signal handlers
//! that set it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Which of C6 (live DDP ingest) or C7 (clip playback) drives the writer
/// for this run. Exactly one is ever active, matching spec §4.9's "at most
/// one is active" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Playback,
}

/// Owns the process-wide stop flag. Cloneable handles share the same
/// underlying flag, so every loop thread that only ever sees a bare
/// `&AtomicBool` (the UDP receiver, the clip player) still observes a
/// signal or a configured duration expiring the same way a caller of
/// `should_stop` does.
pub struct Supervisor {
    stop: Arc<AtomicBool>,
    mode: Mode,
}

impl Supervisor {
    /// If `duration` is set, spawns a detached watcher thread that sleeps
    /// for it and then sets the stop flag, so the deadline is visible to
    /// every holder of the flag, not just callers of `should_stop`.
    pub fn new(mode: Mode, duration: Option<Duration>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        if let Some(duration) = duration {
            let watcher_stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(duration);
                watcher_stop.store(true, Ordering::Relaxed);
            });
        }
        Self { stop, mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// A handle loops can poll without holding a reference to the
    /// `Supervisor` itself.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Installs handlers for SIGINT/SIGTERM that set the stop flag exactly
    /// once (spec §4.9). Must be called at most once per process.
    pub fn install_signal_handlers(&self) -> Result<(), ctrlc::Error> {
        let stop = Arc::clone(&self.stop);
        ctrlc::set_handler(move || {
            tracing::info!("shutdown_signal_received");
            stop.store(true, Ordering::Relaxed);
        })
    }

    /// True once a signal has set the flag or the configured duration's
    /// watcher thread has set it. Loops should poll this between
    /// iterations and exit after completing any frame already in flight.
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Programmatic stop, used by tests and by the binary's own shutdown
    /// path after the run loop returns.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
