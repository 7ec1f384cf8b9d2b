//! Soft timer service
//!
//! Two independent countdown timers decremented by the 10 ms housekeeping
//! interrupt. A protocol routine that needs a timeout loads one of the
//! counters, then polls [`SoftTimers::expired`] inside its wait loop; the
//! countdown advances only via the interrupt, so the caller always regains
//! control within the configured bound.
//!
//! The counters are atomics rather than bare cells because the decrement
//! happens at interrupt level while the main loop reads and reloads them.
//! Relaxed ordering suffices: each counter is an independent monotone value,
//! not a hand-off signal.

use core::sync::atomic::{AtomicU8, Ordering};

/// Selects one of the two countdown timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    /// Long-bound timer: initialization handshake and data-token waits.
    A,
    /// Short-bound timer: ready polling between commands.
    B,
}

/// Two 100 Hz countdown timers shared between the tick interrupt and the
/// polled driver code.
///
/// `const`-constructible so it can live in a `static` next to the vector
/// table; the driver holds a shared reference.
#[derive(Debug, Default)]
pub struct SoftTimers {
    a: AtomicU8,
    b: AtomicU8,
}

impl SoftTimers {
    /// Create both timers at zero (expired).
    pub const fn new() -> Self {
        Self {
            a: AtomicU8::new(0),
            b: AtomicU8::new(0),
        }
    }

    /// Decrement both timers toward zero. Call once per 10 ms period from
    /// the housekeeping interrupt; never wraps below zero.
    pub fn tick(&self) {
        let _ = self.a.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
        let _ = self.b.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Load a timer with `ticks` 10 ms periods.
    pub fn start(&self, id: TimerId, ticks: u8) {
        self.cell(id).store(ticks, Ordering::Relaxed);
    }

    /// `true` once the timer has counted down to zero.
    pub fn expired(&self, id: TimerId) -> bool {
        self.cell(id).load(Ordering::Relaxed) == 0
    }

    /// Remaining ticks on a timer.
    pub fn remaining(&self, id: TimerId) -> u8 {
        self.cell(id).load(Ordering::Relaxed)
    }

    fn cell(&self, id: TimerId) -> &AtomicU8 {
        match id {
            TimerId::A => &self.a,
            TimerId::B => &self.b,
        }
    }
}
