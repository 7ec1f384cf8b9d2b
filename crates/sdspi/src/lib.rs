//! SPI-mode SD/MMC block storage driver
//!
//! Turns a full-duplex synchronous serial bus plus a chip-select pin into a
//! 512-byte block device: the card-protocol command engine, the
//! multi-variant initialization handshake, data-token framing, and
//! timeout-bounded polling that never blocks the interrupt layer.
//!
//! # Layers
//!
//! ```text
//! FAT volume layer (external collaborator)
//!         ↓
//! SdCard - status / initialize / read / write / control
//!         ↓
//! Transport - byte exchange, chip select, clock-train priming
//!         ↓
//! embedded-hal SpiBus + OutputPin (board crate)
//! ```
//!
//! Timeouts are cooperative: every polling loop is bounded by one of the two
//! [`SoftTimers`] countdowns, which a 10 ms periodic interrupt decrements via
//! [`SoftTimers::tick`]. A wedged bus therefore costs at most the configured
//! bound, never a hang.
//!
//! # Features
//!
//! - `defmt`: enable defmt::Format derives

#![cfg_attr(not(test), no_std)]
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod card;
pub mod command;
pub mod error;
pub mod timers;
pub mod transport;

pub use card::{CardVariant, Control, ControlData, DiskStatus, SdCard, BLOCK_LEN};
pub use command::Command;
pub use error::DiskError;
pub use timers::{SoftTimers, TimerId};
pub use transport::Transport;
