//! Shutdown Signal
//!
//! A cloneable one-shot signal used to interrupt backoff waits and move a
//! consumer into its draining state. The waiting side parks on a condvar with
//! a timeout, so a trigger wakes it promptly instead of letting an exponential
//! backoff run to completion.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct SignalInner {
    triggered: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

/// One-shot graceful-shutdown signal
///
/// Clones share the same underlying signal. Triggering is idempotent and
/// wakes every thread currently parked in [`ShutdownSignal::wait_timeout`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

impl ShutdownSignal {
    /// Create a new, untriggered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal, waking all waiters
    pub fn trigger(&self) {
        // Hold the lock while flipping the flag so a waiter cannot re-check
        // the flag and park between our store and the notify.
        let _guard = self.inner.lock.lock();
        self.inner.triggered.store(true, Ordering::Release);
        self.inner.condvar.notify_all();
    }

    /// Whether the signal has been triggered
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Wait up to `timeout`, returning early if the signal fires
    ///
    /// # Returns
    /// `true` if the signal was triggered (before or during the wait),
    /// `false` if the full timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        let mut guard = self.inner.lock.lock();
        if self.is_triggered() {
            return true;
        }
        self.inner.condvar.wait_for(&mut guard, timeout);
        self.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_untriggered_wait_runs_full_timeout() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        let fired = signal.wait_timeout(Duration::from_millis(50));

        assert!(!fired);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_trigger_before_wait_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        let start = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_trigger_interrupts_parked_waiter() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let fired = waiter.wait_timeout(Duration::from_secs(30));
            (fired, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        signal.trigger();

        let (fired, elapsed) = handle.join().unwrap();
        assert!(fired);
        // Woken by the trigger, not the 30s timeout
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        clone.trigger();
        assert!(signal.is_triggered());
    }
}
