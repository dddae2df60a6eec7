//! SIGINT handling.
//!
//! While plaintext sits in a temporary file, or a write is in flight, an
//! interrupt must not kill the process before cleanup runs. Such sections
//! hold a [`Deferral`]; an interrupt arriving inside one is recorded and
//! surfaces as [`Error::Interrupted`] at the next [`check`]. Outside of any
//! deferral nothing needs cleaning up, so the handler exits right away.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

use treevault_common::{Error, Result};

/// Exit status used when the user interrupts or cancels.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Deferral depth plus an interrupt waiting to be reported.
struct Latch {
    deferred: AtomicUsize,
    pending: AtomicBool,
}

impl Latch {
    const fn new() -> Self {
        Self {
            deferred: AtomicUsize::new(0),
            pending: AtomicBool::new(false),
        }
    }

    fn enter(&self) {
        self.deferred.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.deferred.fetch_sub(1, Ordering::SeqCst);
    }

    /// Record an interrupt. Returns `false` if nothing defers it.
    fn interrupt(&self) -> bool {
        if self.deferred.load(Ordering::SeqCst) == 0 {
            return false;
        }
        self.pending.store(true, Ordering::SeqCst);
        true
    }

    fn take(&self) -> Result<()> {
        if self.pending.swap(false, Ordering::SeqCst) {
            debug!("Interrupt received during deferred section");
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

static LATCH: Latch = Latch::new();

/// Install the process-wide SIGINT handler.
pub fn install() -> Result<()> {
    ctrlc::set_handler(on_interrupt).map_err(|e| {
        Error::Io(std::io::Error::other(format!(
            "cannot install signal handler: {}",
            e
        )))
    })
}

fn on_interrupt() {
    if !LATCH.interrupt() {
        eprintln!();
        eprintln!("Interrupted, vault left unchanged");
        std::process::exit(EXIT_INTERRUPTED);
    }
}

/// Guard that keeps interrupts from terminating the process while alive.
#[must_use = "interrupts are only deferred while the guard is held"]
pub struct Deferral(());

impl Drop for Deferral {
    fn drop(&mut self) {
        LATCH.leave();
    }
}

/// Defer interrupts until the returned guard is dropped.
pub fn defer() -> Deferral {
    LATCH.enter();
    Deferral(())
}

/// Turn an interrupt received during a deferral into an error.
pub fn check() -> Result<()> {
    LATCH.take()
}
