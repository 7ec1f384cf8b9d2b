//! Recorder state machine
//!
//! [`Recorder`] is the application sequencer: it mounts the volume, waits
//! for the start switch, opens the recording file, drains the capture
//! buffer while recording, and finalizes the container on stop. It is
//! invoked repeatedly from the main loop ([`step`](Recorder::step)) and
//! never blocks — every call does at most one bounded piece of work.
//!
//! States form a one-way pipeline with two terminal idles:
//!
//! ```text
//! Initial → Wait → Open → Record → Finish (idles once finalized)
//!     \______\______\_______\________\→ Error (idles forever)
//! ```
//!
//! `Error` is reachable from every state — card absent or removed, a file
//! operation failing, or finalization failing — and has no recovery path
//! short of reset. The machine fires no indicator on entry; callers can
//! watch [`state`](Recorder::state) and [`fault`](Recorder::fault) if the
//! board wants to signal.

use platform::fs::{File, Filesystem};
use platform::gpio::Switch;
use platform::timer::SampleClock;
use thiserror_no_std::Error;

use crate::buffer::CaptureBuffer;
use crate::wav::{RecordingFormat, WavInfo};

/// Name of the file each recording session creates.
pub const RECORDING_FILE: &str = "REC.WAV";

/// The recorder's control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Reset the buffer, fix the recording parameters, mount the volume.
    Initial,
    /// Volume mounted; waiting for the start switch.
    Wait,
    /// Start seen; create the file and write the container header.
    Open,
    /// Sampling; drain full capture banks into the file.
    Record,
    /// Stop seen; patch the header, close, unmount, then idle.
    Finish,
    /// Unrecoverable; idles until reset.
    Error,
}

/// Why the machine entered [`State::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// The volume failed to mount.
    #[error("volume mount failed")]
    Mount,
    /// The detect contact reported no card.
    #[error("card absent or removed")]
    Media,
    /// Creating the recording file failed.
    #[error("file create failed")]
    Create,
    /// Writing or flushing the container header failed.
    #[error("header write failed")]
    Header,
    /// Writing drained sample data failed.
    #[error("sample write failed")]
    Write,
    /// Patching the header, closing the file, or unmounting failed.
    #[error("finalize failed")]
    Finalize,
}

/// The application sequencer tying switches, the capture buffer, the
/// sample clock, and the volume layer together.
///
/// Owns its peripherals; the capture buffer is shared with the conversion
/// interrupt, so only a reference arrives here.
pub struct Recorder<'b, FS, SW, CLK, const N: usize>
where
    FS: Filesystem,
    SW: Switch,
    CLK: SampleClock,
{
    state: State,
    fault: Option<Fault>,
    fs: FS,
    file: Option<FS::File>,
    start: SW,
    stop: SW,
    detect: SW,
    clock: CLK,
    buffer: &'b CaptureBuffer<N>,
    wav: WavInfo,
}

impl<'b, FS, SW, CLK, const N: usize> Recorder<'b, FS, SW, CLK, N>
where
    FS: Filesystem,
    SW: Switch,
    CLK: SampleClock,
{
    /// Build the machine in [`State::Initial`] with the device's fixed
    /// recording format. No work happens until the first
    /// [`step`](Self::step).
    pub fn new(
        fs: FS,
        start: SW,
        stop: SW,
        detect: SW,
        clock: CLK,
        buffer: &'b CaptureBuffer<N>,
    ) -> Self {
        Self {
            state: State::Initial,
            fault: None,
            fs,
            file: None,
            start,
            stop,
            detect,
            clock,
            buffer,
            wav: WavInfo::new(RecordingFormat::default()),
        }
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The failure that drove the machine into [`State::Error`], if any.
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// Sample bytes written to the file so far.
    pub fn bytes_recorded(&self) -> u32 {
        self.wav.payload_bytes()
    }

    /// Run one iteration of the machine. Call repeatedly from the main
    /// loop; terminal states return immediately.
    pub fn step(&mut self) {
        self.state = match self.state {
            State::Initial => self.enter_initial(),
            State::Wait => self.poll_wait(),
            State::Open => self.enter_open(),
            State::Record => self.poll_record(),
            State::Finish => self.finalize(),
            State::Error => State::Error,
        };
    }

    fn fail(&mut self, fault: Fault) -> State {
        self.fault = Some(fault);
        State::Error
    }

    /// `Initial`: reset the capture buffer and totals, then mount.
    fn enter_initial(&mut self) -> State {
        self.buffer.reset();
        self.wav = WavInfo::new(self.wav.format());
        match self.fs.mount() {
            Ok(()) => State::Wait,
            Err(_) => self.fail(Fault::Mount),
        }
    }

    /// `Wait`: card must stay present; start switch opens the file.
    fn poll_wait(&mut self) -> State {
        if !self.detect.is_closed() {
            return self.fail(Fault::Media);
        }
        if self.start.is_closed() {
            return State::Open;
        }
        State::Wait
    }

    /// `Open`: create the file, write and flush the header, start sampling.
    fn enter_open(&mut self) -> State {
        let mut file = match self.fs.create(RECORDING_FILE) {
            Ok(file) => file,
            Err(_) => return self.fail(Fault::Create),
        };
        if self.wav.write_header(&mut file).is_err() || file.sync().is_err() {
            return self.fail(Fault::Header);
        }
        self.clock.enable();
        self.file = Some(file);
        State::Record
    }

    /// `Record`: detect has priority, then stop, then at most one drained
    /// bank per step.
    fn poll_record(&mut self) -> State {
        if !self.detect.is_closed() {
            return self.fail(Fault::Media);
        }
        if self.stop.is_closed() {
            self.clock.disable();
            return State::Finish;
        }
        let buffer = self.buffer;
        let Some(file) = self.file.as_mut() else {
            return self.fail(Fault::Write);
        };
        match buffer.take(|pcm| file.write(pcm)) {
            Some(Ok(written)) => {
                // A bank is at most the buffer capacity; it fits in u32.
                #[allow(clippy::cast_possible_truncation)]
                self.wav.add_payload(written as u32);
                State::Record
            }
            Some(Err(_)) => self.fail(Fault::Write),
            None => State::Record,
        }
    }

    /// `Finish`: patch the size fields, close, unmount — once. Later steps
    /// find no file and idle here.
    fn finalize(&mut self) -> State {
        let Some(mut file) = self.file.take() else {
            return State::Finish;
        };
        if self.wav.patch_header(&mut file).is_err() {
            return self.fail(Fault::Finalize);
        }
        if file.close().is_err() {
            return self.fail(Fault::Finalize);
        }
        if self.fs.unmount().is_err() {
            return self.fail(Fault::Finalize);
        }
        State::Finish
    }
}
