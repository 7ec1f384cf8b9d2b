//! Hardware Abstraction Layer for the audio field recorder
//!
//! This crate provides trait-based abstractions for every collaborator the
//! recorder core touches, enabling development and testing without physical
//! hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (recorder crate)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (board crate: pin mux, clocks, vector table)
//! ```
//!
//! # Abstractions
//!
//! - [`Switch`] - panel switches and the card-detect line
//! - [`AnalogSource`] - the sampling converter
//! - [`SampleClock`] - the sample-rate timer
//! - [`Filesystem`] / [`File`] - the volume the recorder writes into
//!
//! The storage driver itself (the `sdspi` crate) sits *below* the
//! [`Filesystem`] collaborator and is generic over `embedded-hal` traits
//! directly; it does not appear here.
//!
//! # Features
//!
//! - `std`: expose the mock peripherals to dependent crates' tests
//! - `defmt`: enable defmt::Format derives

#![cfg_attr(not(test), no_std)]
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(feature = "std")]
extern crate std;

pub mod adc;
pub mod fs;
pub mod gpio;
pub mod mocks;
pub mod timer;

pub use adc::AnalogSource;
pub use fs::{File, Filesystem};
pub use gpio::{ActiveLow, PinState, Switch};
pub use timer::SampleClock;
