//! Process signal handling for the daemon.
//!
//! SIGINT, SIGTERM and SIGHUP all request a graceful shutdown: the flag in
//! [`SignalState::running`] is cleared and the service loop drains on its
//! next poll.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::{Handle, Signals},
};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

/// Signal handling state shared between threads.
pub struct SignalState {
    /// Cleared once a termination signal arrives
    pub running: Arc<AtomicBool>,
    handle: Handle,
}

impl SignalState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SignalState {
    fn drop(&mut self) {
        self.handle.close();
    }
}

fn signal_name(sig: i32) -> &'static str {
    match sig {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGHUP => "SIGHUP",
        _ => "signal",
    }
}

/// Register handlers and start the listener thread.
pub fn setup_signal_handler() -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));

    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("failed to register signal handlers")?;
    let handle = signals.handle();

    let running_clone = Arc::clone(&running);
    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                log_pipe!();
                log_info!("Received {}, shutting down", signal_name(sig));
                running_clone.store(false, Ordering::SeqCst);
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(SignalState { running, handle })
}
