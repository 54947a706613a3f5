//! Process-wide send throttle
//!
//! A single `Throttle` is built once per run and shared (behind an `Arc`)
//! by every transport, so the minimum spacing between sends holds across
//! all sessions, not just within one. Waiting senders are not served in
//! FIFO order.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Minimum-interval gate for outgoing sends
#[derive(Debug)]
pub struct Throttle {
    interval: Option<Duration>,
    last_send: Mutex<Instant>,
}

impl Throttle {
    /// Create a throttle; `None` or a zero interval disables it
    pub fn new(interval: Option<Duration>) -> Self {
        Throttle {
            interval: interval.filter(|d| !d.is_zero()),
            last_send: Mutex::new(Instant::now()),
        }
    }

    /// Create a throttle from a millisecond interval
    pub fn from_millis(ms: Option<u64>) -> Self {
        Self::new(ms.map(Duration::from_millis))
    }

    /// A throttle that never waits
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Configured interval, if any
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Run `send` under the gate
    ///
    /// Sleeps until `interval` has passed since the previous send finished,
    /// runs `send`, then records the completion time. The gate is held for
    /// the whole sequence and released however `send` exits.
    pub fn run<T>(&self, send: impl FnOnce() -> T) -> T {
        let Some(interval) = self.interval else {
            return send();
        };

        let mut last_send = self
            .last_send
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let remaining = interval.saturating_sub(last_send.elapsed());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }

        let result = send();
        *last_send = Instant::now();
        result
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::disabled()
    }
}
