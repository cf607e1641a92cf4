// ABOUTME: Ctrl-C handling: aborts in-flight cluster requests and restores terminal echo.
// ABOUTME: The context is shared with the signal handler and disarmed before a normal exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use sx_cluster::AbortHandle;
use tracing::debug;

/// Exit status of a process stopped by SIGINT or SIGTERM.
pub const INTERRUPTED_STATUS: i32 = 1;

/// State the interrupt handler acts on.
#[derive(Debug)]
pub struct InterruptContext {
    armed: AtomicBool,
    watched: Mutex<Option<AbortHandle>>,
}

impl InterruptContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            armed: AtomicBool::new(true),
            watched: Mutex::new(None),
        })
    }

    /// Registers the process-wide SIGINT/SIGTERM handler.
    ///
    /// On a signal while armed the handler prints "Process interrupted" and
    /// exits with `INTERRUPTED_STATUS`.
    pub fn install(self: &Arc<Self>) -> Result<(), ctrlc::Error> {
        let context = Arc::clone(self);
        ctrlc::set_handler(move || {
            if let Some(status) = context.exit_status() {
                eprintln!("Process interrupted");
                std::process::exit(status);
            }
        })
    }

    /// Handles a signal and says how the process should end, if at all.
    pub fn exit_status(&self) -> Option<i32> {
        self.on_signal().then_some(INTERRUPTED_STATUS)
    }

    /// Makes `handle` the one aborted on interrupt until the guard drops.
    pub fn watch(self: &Arc<Self>, handle: AbortHandle) -> WatchGuard {
        if let Ok(mut watched) = self.watched.lock() {
            *watched = Some(handle);
        }
        WatchGuard {
            context: Arc::clone(self),
        }
    }

    fn release(&self) {
        if let Ok(mut watched) = self.watched.lock() {
            *watched = None;
        }
    }

    /// Reacts to a signal. Returns false when disarmed, in which case nothing happens.
    pub fn on_signal(&self) -> bool {
        if !self.armed.load(Ordering::SeqCst) {
            return false;
        }
        // try_lock: the signal may land while the main thread holds the lock
        if let Ok(watched) = self.watched.try_lock() {
            if let Some(handle) = watched.as_ref() {
                debug!("aborting cluster requests");
                handle.abort();
            }
        }
        restore_echo();
        true
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

/// Unregisters the watched handle when dropped.
#[derive(Debug)]
pub struct WatchGuard {
    context: Arc<InterruptContext>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.context.release();
    }
}

/// Turns echo back on in case the signal arrived during a password prompt.
#[cfg(unix)]
fn restore_echo() {
    restore_echo_on(std::io::stdin());
}

#[cfg(not(unix))]
fn restore_echo() {}

#[cfg(unix)]
fn restore_echo_on<Fd: std::os::fd::AsFd>(terminal: Fd) {
    use nix::sys::termios::{tcgetattr, tcsetattr, SetArg};

    // Not a terminal: nothing to restore
    let Ok(mut attrs) = tcgetattr(&terminal) else {
        return;
    };
    if enable_echo(&mut attrs.local_flags) {
        if let Err(e) = tcsetattr(&terminal, SetArg::TCSANOW, &attrs) {
            debug!(error = %e, "failed to restore terminal echo");
        }
    }
}

/// Sets ECHO; false when it was already set.
#[cfg(unix)]
fn enable_echo(flags: &mut nix::sys::termios::LocalFlags) -> bool {
    use nix::sys::termios::LocalFlags;

    if flags.contains(LocalFlags::ECHO) {
        return false;
    }
    flags.insert(LocalFlags::ECHO);
    true
}
