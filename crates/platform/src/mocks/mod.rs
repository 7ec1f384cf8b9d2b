//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits for use
//! in unit and integration tests. The switch, clock, and filesystem mocks
//! hand out cloneable probes over shared state, because the recorder takes
//! ownership of its peripherals and tests still need to script and inspect
//! them from outside.

#![cfg(any(test, feature = "std"))]
#![allow(clippy::unwrap_used)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use crate::adc::AnalogSource;
use crate::fs::{File, Filesystem};
use crate::gpio::Switch;
use crate::timer::SampleClock;

/// Mock switch whose level is scripted through any clone.
#[derive(Clone, Default)]
pub struct MockSwitch {
    closed: Rc<Cell<bool>>,
}

impl MockSwitch {
    /// Create a new mock switch, initially open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the switch level seen by all clones.
    pub fn set_closed(&self, closed: bool) {
        self.closed.set(closed);
    }
}

impl Switch for MockSwitch {
    fn is_closed(&mut self) -> bool {
        self.closed.get()
    }
}

/// Mock sample-rate timer that records enable/disable calls.
#[derive(Clone, Default)]
pub struct MockSampleClock {
    state: Rc<RefCell<ClockState>>,
}

#[derive(Default)]
struct ClockState {
    enabled: bool,
    enable_count: usize,
    disable_count: usize,
}

impl MockSampleClock {
    /// Create a new mock clock, initially disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while the clock is enabled.
    pub fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    /// Number of `enable` calls seen.
    pub fn enable_count(&self) -> usize {
        self.state.borrow().enable_count
    }

    /// Number of `disable` calls seen.
    pub fn disable_count(&self) -> usize {
        self.state.borrow().disable_count
    }
}

impl SampleClock for MockSampleClock {
    fn enable(&mut self) {
        let mut state = self.state.borrow_mut();
        state.enabled = true;
        state.enable_count = state.enable_count.saturating_add(1);
    }

    fn disable(&mut self) {
        let mut state = self.state.borrow_mut();
        state.enabled = false;
        state.disable_count = state.disable_count.saturating_add(1);
    }
}

/// Mock analog source fed from a scripted sample queue.
///
/// `read_sample` pops the front of the queue, returning 0 when empty.
pub struct MockAnalogSource {
    samples: heapless::Deque<u16, 64>,
    conversions: usize,
}

impl Default for MockAnalogSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAnalogSource {
    /// Create a new mock source with an empty queue.
    pub fn new() -> Self {
        Self {
            samples: heapless::Deque::new(),
            conversions: 0,
        }
    }

    /// Queue a conversion result.
    pub fn add_sample(&mut self, sample: u16) -> Result<(), u16> {
        self.samples.push_back(sample)
    }

    /// Number of conversions triggered so far.
    pub fn conversions(&self) -> usize {
        self.conversions
    }
}

impl AnalogSource for MockAnalogSource {
    fn start_conversion(&mut self) {
        self.conversions = self.conversions.saturating_add(1);
    }

    fn read_sample(&mut self) -> u16 {
        self.samples.pop_front().unwrap_or(0)
    }
}

/// Error type for the mock filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFsError {
    /// The scripted failure for this operation was armed.
    Injected,
    /// Operation attempted while the volume is not mounted.
    NotMounted,
}

#[derive(Default)]
struct FsState {
    mounted: bool,
    files: BTreeMap<String, Vec<u8>>,
    sync_count: usize,
    fail_mount: bool,
    fail_create: bool,
    fail_write: bool,
    fail_close: bool,
    fail_unmount: bool,
}

/// In-memory mock volume with per-operation failure injection.
///
/// Clones share state: hold one clone as a probe and move another into the
/// code under test.
#[derive(Clone, Default)]
pub struct MockFilesystem {
    state: Rc<RefCell<FsState>>,
}

impl MockFilesystem {
    /// Create a new, unmounted mock volume.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while the volume is mounted.
    pub fn is_mounted(&self) -> bool {
        self.state.borrow().mounted
    }

    /// Bytes of `path`, if it exists.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.state.borrow().files.get(path).cloned()
    }

    /// Number of `sync` calls across all files.
    pub fn sync_count(&self) -> usize {
        self.state.borrow().sync_count
    }

    /// Arm or clear a mount failure.
    pub fn set_fail_mount(&self, fail: bool) {
        self.state.borrow_mut().fail_mount = fail;
    }

    /// Arm or clear a create failure.
    pub fn set_fail_create(&self, fail: bool) {
        self.state.borrow_mut().fail_create = fail;
    }

    /// Arm or clear a write failure.
    pub fn set_fail_write(&self, fail: bool) {
        self.state.borrow_mut().fail_write = fail;
    }

    /// Arm or clear a close failure.
    pub fn set_fail_close(&self, fail: bool) {
        self.state.borrow_mut().fail_close = fail;
    }

    /// Arm or clear an unmount failure.
    pub fn set_fail_unmount(&self, fail: bool) {
        self.state.borrow_mut().fail_unmount = fail;
    }
}

impl Filesystem for MockFilesystem {
    type Error = MockFsError;
    type File = MockFile;

    fn mount(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_mount {
            return Err(MockFsError::Injected);
        }
        state.mounted = true;
        Ok(())
    }

    fn create(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        let mut state = self.state.borrow_mut();
        if !state.mounted {
            return Err(MockFsError::NotMounted);
        }
        if state.fail_create {
            return Err(MockFsError::Injected);
        }
        state.files.insert(path.to_string(), Vec::new());
        Ok(MockFile {
            path: path.to_string(),
            pos: 0,
            state: Rc::clone(&self.state),
        })
    }

    fn unmount(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_unmount {
            return Err(MockFsError::Injected);
        }
        state.mounted = false;
        Ok(())
    }
}

/// A file open on a [`MockFilesystem`].
pub struct MockFile {
    path: String,
    pos: usize,
    state: Rc<RefCell<FsState>>,
}

impl File for MockFile {
    type Error = MockFsError;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_write {
            return Err(MockFsError::Injected);
        }
        let data = state
            .files
            .get_mut(&self.path)
            .ok_or(MockFsError::NotMounted)?;
        if data.len() < self.pos {
            data.resize(self.pos, 0);
        }
        for (offset, byte) in buf.iter().enumerate() {
            let at = self.pos.saturating_add(offset);
            if at < data.len() {
                // Overwrite-in-place path used by the header patch.
                #[allow(clippy::indexing_slicing)] // at < data.len() checked above
                {
                    data[at] = *byte;
                }
            } else {
                data.push(*byte);
            }
        }
        self.pos = self.pos.saturating_add(buf.len());
        Ok(buf.len())
    }

    fn seek(&mut self, pos: u32) -> Result<(), Self::Error> {
        self.pos = pos as usize;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        state.sync_count = state.sync_count.saturating_add(1);
        Ok(())
    }

    fn close(mut self) -> Result<(), Self::Error> {
        self.sync()?;
        let state = self.state.borrow();
        if state.fail_close {
            return Err(MockFsError::Injected);
        }
        Ok(())
    }
}
