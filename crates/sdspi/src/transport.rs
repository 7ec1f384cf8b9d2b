//! Serial transport
//!
//! Byte-level primitives over the synchronous bus: full-duplex exchange,
//! chip-select control, the power-up clock train, and ready polling bounded
//! by the soft timers. Everything above this layer thinks in commands and
//! data tokens; everything below it is an `embedded-hal` bus.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::error::DiskError;
use crate::timers::{SoftTimers, TimerId};

/// The all-ones filler clocked out whenever the driver only wants to read.
pub const FILL: u8 = 0xFF;

/// Ready-wait bound: 50 ticks of the 100 Hz soft timer (500 ms).
const READY_TIMEOUT_TICKS: u8 = 50;

/// Byte exchanges making up the power-up clock train. Ten bytes gives 80
/// clock edges, comfortably past the 74 the card requires before it will
/// accept a native command.
const CLOCK_TRAIN_BYTES: usize = 10;

/// Chip-select plus full-duplex byte exchange over an SPI bus.
pub struct Transport<Spi, Cs> {
    spi: Spi,
    cs: Cs,
}

impl<Spi, Cs> Transport<Spi, Cs>
where
    Spi: SpiBus,
    Cs: OutputPin,
{
    /// Take ownership of the bus and the chip-select pin.
    pub fn new(spi: Spi, cs: Cs) -> Self {
        Self { spi, cs }
    }

    /// Hand the bus and pin back.
    pub fn release(self) -> (Spi, Cs) {
        (self.spi, self.cs)
    }

    /// Assert chip select (active low).
    pub fn select(&mut self) -> Result<(), DiskError> {
        self.cs.set_low().map_err(|_| DiskError::Bus)
    }

    /// Deassert chip select.
    pub fn deselect(&mut self) -> Result<(), DiskError> {
        self.cs.set_high().map_err(|_| DiskError::Bus)
    }

    /// One full-duplex exchange: clock `byte` out, return the byte clocked in.
    pub fn exchange(&mut self, byte: u8) -> Result<u8, DiskError> {
        let mut word = [byte];
        self.spi
            .transfer_in_place(&mut word)
            .map_err(|_| DiskError::Bus)?;
        Ok(word[0])
    }

    /// Receive one byte by clocking out filler.
    pub fn receive(&mut self) -> Result<u8, DiskError> {
        self.exchange(FILL)
    }

    /// Send a run of bytes, discarding whatever comes back.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), DiskError> {
        for &byte in bytes {
            self.exchange(byte)?;
        }
        Ok(())
    }

    /// Drive the power-up clock train with chip select deasserted.
    ///
    /// The data line idles high (filler bytes) while the clock wiggles the
    /// required number of times; only after this will a freshly powered card
    /// accept any command.
    pub fn prime_clock_train(&mut self) -> Result<(), DiskError> {
        self.deselect()?;
        for _ in 0..CLOCK_TRAIN_BYTES {
            self.exchange(FILL)?;
        }
        Ok(())
    }

    /// Poll until the card reports ready (`0xFF`) or the bound expires.
    ///
    /// Returns the last byte received; callers must compare it against
    /// [`FILL`] to distinguish readiness from a timeout.
    pub fn wait_ready(&mut self, timers: &SoftTimers) -> Result<u8, DiskError> {
        timers.start(TimerId::B, READY_TIMEOUT_TICKS);
        self.receive()?;
        loop {
            let byte = self.receive()?;
            if byte == FILL || timers.expired(TimerId::B) {
                return Ok(byte);
            }
        }
    }
}
