//! Ctrl+C wiring for the bridge process
//!
//! `ctrlc` accepts a single handler per process, so the handler is installed
//! once and forwards to whatever [`InterruptHandle`] is currently armed.

use super::interrupt::{InterruptHandle, InterruptReason};
use crate::error::{RelayError, RelayResult};
use colored::Colorize;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Grace period after a second Ctrl+C before the process is forced down
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(2);

type Slot = Arc<Mutex<Option<InterruptHandle>>>;

/// Installed signal handler targeting one bridge
///
/// Dropping the hook disarms it; the OS-level handler stays registered but
/// does nothing until re-armed.
pub struct ShutdownHook {
    slot: Slot,
}

impl ShutdownHook {
    /// Register the process Ctrl+C handler and arm it with `target`
    pub fn install(target: InterruptHandle) -> RelayResult<Self> {
        let slot: Slot = Arc::new(Mutex::new(Some(target)));
        let handler_slot = Arc::clone(&slot);
        ctrlc::set_handler(move || {
            fire(&handler_slot);
        })
        .map_err(|e| {
            RelayError::config(format!("failed to set signal handler: {}", e))
        })?;
        Ok(Self { slot })
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Stop forwarding signals to the bridge
    pub fn disarm(&self) {
        self.slot.lock().take();
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Signal body. Returns true if a bridge was interrupted.
fn fire(slot: &Slot) -> bool {
    let target = slot.lock().clone();
    let Some(target) = target else {
        return false;
    };

    if target.interrupt(InterruptReason::Local) {
        eprintln!("{}", "\nCtrl+C received! Shutting down bridge...".red());
        true
    } else {
        // Second signal while still shutting down
        std::thread::spawn(|| {
            std::thread::sleep(FORCE_EXIT_AFTER);
            eprintln!("{}", "Force terminating bridge...".red());
            std::process::exit(1);
        });
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_interrupts_armed_target() {
        let target = InterruptHandle::new();
        let slot: Slot = Arc::new(Mutex::new(Some(target.clone())));

        assert!(fire(&slot));
        assert_eq!(target.reason(), Some(InterruptReason::Local));
    }

    #[test]
    fn test_fire_after_disarm_is_noop() {
        let target = InterruptHandle::new();
        let slot: Slot = Arc::new(Mutex::new(Some(target.clone())));
        let hook = ShutdownHook {
            slot: Arc::clone(&slot),
        };
        assert!(hook.is_armed());
        hook.disarm();
        assert!(!hook.is_armed());

        assert!(!fire(&slot));
        assert!(!target.is_interrupted());
    }
}
