//! Write-once interrupt flag shared by the controller, the workers and
//! whatever asks the bridge to stop

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Why the bridge stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptReason {
    /// Requested locally (signal, API call)
    Local,
    /// A bus reported that its host asked it to stop
    External(String),
}

impl InterruptReason {
    /// Process exit status for this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            InterruptReason::Local => 0,
            InterruptReason::External(_) => 1,
        }
    }
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptReason::Local => write!(f, "local interrupt"),
            InterruptReason::External(bus) => write!(f, "shutdown requested by host of bus '{}'", bus),
        }
    }
}

#[derive(Debug, Default)]
struct Signal {
    flag: AtomicBool,
    reason: Mutex<Option<InterruptReason>>,
    cond: Condvar,
}

/// Cloneable handle to the shared interrupt flag
///
/// The first `interrupt` wins; later calls keep the original reason.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    signal: Arc<Signal>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns false if it was already raised.
    pub fn interrupt(&self, reason: InterruptReason) -> bool {
        let mut slot = self.signal.reason.lock();
        if slot.is_some() {
            return false;
        }
        log::info!("Bridge interrupted: {}", reason);
        *slot = Some(reason);
        self.signal.flag.store(true, Ordering::Release);
        self.signal.cond.notify_all();
        true
    }

    pub fn is_interrupted(&self) -> bool {
        self.signal.flag.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<InterruptReason> {
        self.signal.reason.lock().clone()
    }

    /// Block until the flag is raised
    pub fn wait(&self) -> InterruptReason {
        let mut slot = self.signal.reason.lock();
        loop {
            if let Some(reason) = slot.as_ref() {
                return reason.clone();
            }
            self.signal.cond.wait(&mut slot);
        }
    }

    /// Block until the flag is raised or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<InterruptReason> {
        let mut slot = self.signal.reason.lock();
        if slot.is_none() {
            self.signal.cond.wait_for(&mut slot, timeout);
        }
        slot.clone()
    }
}
