//! Sample acquisition and the capture double buffer
//!
//! `CaptureBuffer<N>` holds two `N`-byte banks. The conversion-complete
//! interrupt stores samples into the *active* bank; when it fills, the
//! interrupt swaps roles, rewinds the write offset, and raises `ready`.
//! The polled main loop observes `ready`, clears it, and drains the bank
//! that was just filled.
//!
//! The `ready` flag is the **only** hand-off signal between the two sides:
//! a single-producer/single-consumer discipline, not a lock. It is safe
//! because the producer never writes the bank the consumer is draining and
//! the consumer never reads a bank without having observed `ready` first.
//! Nothing else may touch the banks.
//!
//! The producer must finish each [`push_sample`](CaptureBuffer::push_sample)
//! within one sample period and must not call into the storage stack
//! (which may be sitting in a bounded wait) — it touches the banks and the
//! bias-corrected value, nothing more.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Fixed offset of the converter's midpoint, removed from every raw sample
/// before it is stored.
pub const DC_BIAS: i16 = 0x04DB;

/// Center a raw conversion result around zero.
#[allow(clippy::cast_possible_wrap)] // converter results are 12-bit, far from the sign bit
pub fn bias_corrected(raw: u16) -> i16 {
    (raw as i16).wrapping_sub(DC_BIAS)
}

/// Double buffer carrying little-endian 16-bit samples from the conversion
/// interrupt to the polled drain loop.
///
/// `N` is the bank size in bytes and must be a nonzero multiple of the
/// sample width. `const`-constructible so the banks can live in a `static`
/// reachable from the interrupt handler.
pub struct CaptureBuffer<const N: usize> {
    banks: [UnsafeCell<[u8; N]>; 2],
    /// Byte offset of the next store into the active bank. Producer-owned.
    write_at: AtomicUsize,
    /// Which bank the producer is filling (0 or 1).
    active: AtomicUsize,
    /// Hand-off flag: the inactive bank is full and unread.
    ready: AtomicBool,
}

// SAFETY: the banks are plain byte arrays guarded by the SPSC discipline
// described in the module docs; the index/flag fields are atomics.
unsafe impl<const N: usize> Sync for CaptureBuffer<N> {}

impl<const N: usize> CaptureBuffer<N> {
    /// Create an empty buffer with bank 0 active.
    pub const fn new() -> Self {
        assert!(N != 0 && N % 2 == 0);
        Self {
            banks: [UnsafeCell::new([0; N]), UnsafeCell::new([0; N])],
            write_at: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
        }
    }

    /// Bank capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// `true` while a full bank is waiting to be drained.
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Rewind both banks and clear the hand-off flag.
    ///
    /// Only valid while the producer interrupt is not running.
    pub fn reset(&self) {
        self.write_at.store(0, Ordering::Relaxed);
        self.active.store(0, Ordering::Relaxed);
        self.ready.store(false, Ordering::Relaxed);
    }

    /// Store one sample, little-endian, into the active bank.
    ///
    /// Producer side; call only from the conversion-complete interrupt (or
    /// the single test thread standing in for it). On filling the bank this
    /// swaps roles, rewinds the offset, and publishes `ready`.
    #[allow(clippy::indexing_slicing)] // bank is masked to 0/1; `at + 1 < N` by the swap below
    #[allow(clippy::arithmetic_side_effects)] // offsets advance by 2 from 0 within an even N
    pub fn push_sample(&self, sample: i16) {
        let bank = self.active.load(Ordering::Relaxed) & 1;
        let at = self.write_at.load(Ordering::Relaxed);
        if at >= N {
            return; // unreachable under the producer contract
        }
        let bytes = sample.to_le_bytes();
        // SAFETY: single producer; the consumer dereferences only the other
        // bank, and only between the `ready` publication below and the next
        // role swap.
        unsafe {
            let base = (*self.banks[bank].get()).as_mut_ptr();
            base.add(at).write(bytes[0]);
            base.add(at + 1).write(bytes[1]);
        }
        let next = at + 2;
        if next >= N {
            self.active.store(bank ^ 1, Ordering::Relaxed);
            self.write_at.store(0, Ordering::Relaxed);
            self.ready.store(true, Ordering::Release);
        } else {
            self.write_at.store(next, Ordering::Relaxed);
        }
    }

    /// Drain the most recently filled bank, if one is pending.
    ///
    /// Consumer side. Clears `ready` immediately upon observing it, then
    /// runs `drain` over the full inactive bank. The closure must complete
    /// before the producer fills the other bank — the same real-time bound
    /// the interrupt design already imposes on the drain path.
    #[allow(clippy::indexing_slicing)] // bank index is masked to 0/1
    pub fn take<R>(&self, drain: impl FnOnce(&[u8]) -> R) -> Option<R> {
        if !self.ready.swap(false, Ordering::Acquire) {
            return None;
        }
        let bank = (self.active.load(Ordering::Relaxed) ^ 1) & 1;
        // SAFETY: `ready` was published after the producer moved `active`
        // off this bank; the acquire/release pair makes the filled bytes
        // visible here, and the producer will not revisit this bank before
        // filling the other one.
        let pcm: &[u8; N] = unsafe { &*self.banks[bank].get() };
        Some(drain(pcm))
    }
}

impl<const N: usize> Default for CaptureBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
