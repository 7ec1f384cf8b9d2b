//! Audio capture pipeline and recorder sequencing
//!
//! Three pieces tie the sampling interrupt to a WAV file on the card:
//!
//! - [`CaptureBuffer`] — the lock-free double buffer the conversion
//!   interrupt fills while the main loop drains the other bank
//! - [`WavInfo`] — writes the fixed 44-byte container header and patches
//!   the size fields when the recording closes
//! - [`Recorder`] — the state machine sequencing mount, open, record,
//!   finish, and the terminal error state
//!
//! Nothing here performs hardware access directly: switches, the sample
//! clock, and the volume layer all arrive as `platform` traits, so the
//! entire pipeline runs against mocks on the host.
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

pub mod buffer;
pub mod machine;
pub mod wav;

pub use buffer::{bias_corrected, CaptureBuffer, DC_BIAS};
pub use machine::{Fault, Recorder, State, RECORDING_FILE};
pub use wav::{RecordingFormat, WavInfo};
