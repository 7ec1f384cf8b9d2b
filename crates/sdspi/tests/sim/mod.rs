//! Byte-level simulated SD/MMC card behind the `SpiBus` trait.
//!
//! The simulator parses 6-byte command frames off the wire, answers with R1
//! responses, streams data tokens, and captures write payloads — enough to
//! exercise the whole driver without hardware. Each supported variant
//! follows its own initialization script; fault injection can stall a
//! multi-block read mid-stream or reject a write payload.
//!
//! Tests keep a [`SimProbe`] clone to script faults and inspect traffic
//! after the driver has taken ownership of the bus.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]
#![allow(dead_code)] // each integration test file links its own copy

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use sdspi::SoftTimers;

/// CSD register served for SD v2 cards: C_SIZE bytes chosen so the decoded
/// total is `(0x100 + 1) << 10` sectors.
pub const CSD_V2: [u8; 16] = [
    0x40, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x00, 0, 0, 0, 0, 0, 0,
];
/// Decoded sector count for [`CSD_V2`].
pub const CSD_V2_SECTORS: u32 = 257 << 10;

/// CSD register served for SD v1 and MMC cards (mantissa/exponent layout).
pub const CSD_V1: [u8; 16] = [
    0x00, 0, 0, 0, 0, 0x09, 0x00, 0x02, 0x40, 0x01, 0x80, 0, 0, 0, 0, 0,
];
/// Decoded sector count for [`CSD_V1`].
pub const CSD_V1_SECTORS: u32 = 320;

/// CID register served by every simulated card.
pub const CID: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// Personality of the simulated card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimVariant {
    /// MultiMediaCard: rejects CMD8 and CMD55, initializes via CMD1.
    Mmc,
    /// SD v1: rejects CMD8, initializes via ACMD41 without HCS.
    SdV1,
    /// SD v2, byte addressed (OCR CCS clear).
    SdV2,
    /// SD v2 high capacity, block addressed (OCR CCS set).
    SdV2Block,
    /// Empty socket: never drives the data line.
    Vacant,
    /// SD v2 card that never leaves busy during ACMD41 polling.
    SdV2Stuck,
}

impl SimVariant {
    fn block_addressed(self) -> bool {
        matches!(self, Self::SdV2Block)
    }

    fn is_v2(self) -> bool {
        matches!(self, Self::SdV2 | Self::SdV2Block | Self::SdV2Stuck)
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Parsing command frames / idling.
    Command,
    /// Streaming blocks for READ_MULTIPLE_BLOCK until CMD12.
    MultiRead { lba: u32, index: usize },
    /// Capturing a write payload after CMD24/CMD25.
    WriteData {
        lba: u32,
        multi: bool,
        index: usize,
        token_seen: bool,
        got: usize,
    },
}

struct SimState {
    variant: SimVariant,
    app_cmd: bool,
    op_cond_polls: u32,
    /// Op-condition polls answered busy before the card reports ready.
    ready_after: u32,
    blocks: BTreeMap<u32, [u8; 512]>,
    capture: [u8; 512],

    // fault injection
    fail_read_block: Option<usize>,
    fail_write_block: Option<usize>,

    // traffic counters
    cmd12_count: usize,
    stop_tokens: usize,
    pre_erase: Option<u32>,
    writes_accepted: usize,

    // wire state
    cmd: [u8; 6],
    cmd_len: usize,
    out: VecDeque<u8>,
    phase: Phase,
    byte_count: u32,
}

impl SimState {
    fn new(variant: SimVariant) -> Self {
        Self {
            variant,
            app_cmd: false,
            op_cond_polls: 0,
            ready_after: 1,
            blocks: BTreeMap::new(),
            capture: [0; 512],
            fail_read_block: None,
            fail_write_block: None,
            cmd12_count: 0,
            stop_tokens: 0,
            pre_erase: None,
            writes_accepted: 0,
            cmd: [0; 6],
            cmd_len: 0,
            out: VecDeque::new(),
            phase: Phase::Command,
            byte_count: 0,
        }
    }

    /// Default content of an unwritten block: a per-block byte pattern.
    fn pattern(lba: u32, offset: usize) -> u8 {
        (lba as u8).wrapping_mul(31).wrapping_add(offset as u8)
    }

    fn block_bytes(&self, lba: u32) -> [u8; 512] {
        self.blocks.get(&lba).copied().unwrap_or_else(|| {
            let mut block = [0u8; 512];
            for (offset, byte) in block.iter_mut().enumerate() {
                *byte = Self::pattern(lba, offset);
            }
            block
        })
    }

    fn lba_from_wire(&self, address: u32) -> Option<u32> {
        if self.variant.block_addressed() {
            Some(address)
        } else if address % 512 == 0 {
            Some(address / 512)
        } else {
            None
        }
    }

    fn clock_byte(&mut self, mosi: u8) -> u8 {
        self.byte_count += 1;
        if let Phase::WriteData { .. } = self.phase {
            return self.write_byte(mosi);
        }
        if self.cmd_len > 0 || mosi & 0xC0 == 0x40 {
            self.cmd[self.cmd_len] = mosi;
            self.cmd_len += 1;
            if self.cmd_len == 6 {
                self.cmd_len = 0;
                self.execute();
            }
            return 0xFF;
        }
        self.emit()
    }

    fn emit(&mut self) -> u8 {
        if let Some(byte) = self.out.pop_front() {
            return byte;
        }
        if let Phase::MultiRead { lba, index } = self.phase {
            if self.fail_read_block == Some(index) {
                return 0xFF; // stream stalls; the host will time out and stop
            }
            self.out.push_back(0xFE);
            let block = self.block_bytes(lba + index as u32);
            self.out.extend(block.iter().copied());
            self.out.push_back(0xAA); // CRC
            self.out.push_back(0xAA);
            self.phase = Phase::MultiRead {
                lba,
                index: index + 1,
            };
            return self.out.pop_front().unwrap();
        }
        0xFF
    }

    fn write_byte(&mut self, mosi: u8) -> u8 {
        if let Some(byte) = self.out.pop_front() {
            return byte;
        }
        let Phase::WriteData {
            lba,
            multi,
            index,
            token_seen,
            got,
        } = self.phase
        else {
            return 0xFF;
        };
        if !token_seen {
            let expected = if multi { 0xFC } else { 0xFE };
            if mosi == expected {
                self.phase = Phase::WriteData {
                    lba,
                    multi,
                    index,
                    token_seen: true,
                    got: 0,
                };
            } else if multi && mosi == 0xFD {
                self.stop_tokens += 1;
                self.phase = Phase::Command;
            }
            return 0xFF;
        }
        if got < 512 {
            self.capture[got] = mosi;
            self.phase = Phase::WriteData {
                lba,
                multi,
                index,
                token_seen: true,
                got: got + 1,
            };
            return 0xFF;
        }
        // CRC bytes; after the second one, queue the data response.
        let crc_seen = got - 512 + 1;
        if crc_seen < 2 {
            self.phase = Phase::WriteData {
                lba,
                multi,
                index,
                token_seen: true,
                got: got + 1,
            };
            return 0xFF;
        }
        if self.fail_write_block == Some(index) {
            self.out.push_back(0x0D); // CRC-rejected data response
            self.phase = if multi {
                Phase::WriteData {
                    lba,
                    multi,
                    index,
                    token_seen: false,
                    got: 0,
                }
            } else {
                Phase::Command
            };
        } else {
            self.blocks.insert(lba + index as u32, self.capture);
            self.writes_accepted += 1;
            self.out.push_back(0x05); // accepted
            self.phase = if multi {
                Phase::WriteData {
                    lba,
                    multi,
                    index: index + 1,
                    token_seen: false,
                    got: 0,
                }
            } else {
                Phase::Command
            };
        }
        0xFF
    }

    fn respond(&mut self, r1: u8) {
        self.out.push_back(0xFF); // response gap
        self.out.push_back(r1);
    }

    fn respond_with(&mut self, r1: u8, payload: &[u8]) {
        self.respond(r1);
        self.out.extend(payload.iter().copied());
    }

    fn respond_block(&mut self, r1: u8, payload: &[u8]) {
        self.respond(r1);
        self.out.push_back(0xFF); // token gap
        self.out.push_back(0xFE);
        self.out.extend(payload.iter().copied());
        self.out.push_back(0xAA); // CRC
        self.out.push_back(0xAA);
    }

    fn op_cond_ready(&mut self) -> u8 {
        self.op_cond_polls += 1;
        if self.op_cond_polls > self.ready_after {
            0x00
        } else {
            0x01
        }
    }

    fn execute(&mut self) {
        if self.variant == SimVariant::Vacant {
            return;
        }
        let index = self.cmd[0] & 0x3F;
        let arg = u32::from_be_bytes([self.cmd[1], self.cmd[2], self.cmd[3], self.cmd[4]]);
        let app_cmd = std::mem::replace(&mut self.app_cmd, false);
        self.out.clear();
        match index {
            0 => {
                self.phase = Phase::Command;
                self.respond(0x01);
            }
            8 => {
                if self.variant.is_v2() && arg == 0x1AA {
                    self.respond_with(0x01, &[0x00, 0x00, 0x01, 0xAA]);
                } else {
                    self.respond(0x05); // illegal command while idle
                }
            }
            55 => {
                if self.variant == SimVariant::Mmc {
                    self.respond(0x05);
                } else {
                    self.app_cmd = true;
                    self.respond(0x01);
                }
            }
            41 if app_cmd => {
                let r1 = if self.variant == SimVariant::SdV2Stuck {
                    0x01
                } else {
                    self.op_cond_ready()
                };
                self.respond(r1);
            }
            1 => {
                if self.variant == SimVariant::Mmc {
                    let r1 = self.op_cond_ready();
                    self.respond(r1);
                } else {
                    self.respond(0x05);
                }
            }
            16 => self.respond(if arg == 512 { 0x00 } else { 0x40 }),
            23 if app_cmd => {
                self.pre_erase = Some(arg);
                self.respond(0x00);
            }
            58 => {
                let ocr0 = if self.variant.block_addressed() {
                    0xC0
                } else {
                    0x80
                };
                self.respond_with(0x00, &[ocr0, 0xFF, 0x80, 0x00]);
            }
            9 => {
                let csd = if self.variant.is_v2() { CSD_V2 } else { CSD_V1 };
                self.respond_block(0x00, &csd);
            }
            10 => self.respond_block(0x00, &CID),
            17 => match self.lba_from_wire(arg) {
                Some(lba) => {
                    let block = self.block_bytes(lba);
                    self.respond_block(0x00, &block);
                }
                None => self.respond(0x40),
            },
            18 => match self.lba_from_wire(arg) {
                Some(lba) => {
                    self.respond(0x00);
                    self.phase = Phase::MultiRead { lba, index: 0 };
                }
                None => self.respond(0x40),
            },
            24 => match self.lba_from_wire(arg) {
                Some(lba) => {
                    self.respond(0x00);
                    self.phase = Phase::WriteData {
                        lba,
                        multi: false,
                        index: 0,
                        token_seen: false,
                        got: 0,
                    };
                }
                None => self.respond(0x40),
            },
            25 => match self.lba_from_wire(arg) {
                Some(lba) => {
                    self.respond(0x00);
                    self.phase = Phase::WriteData {
                        lba,
                        multi: true,
                        index: 0,
                        token_seen: false,
                        got: 0,
                    };
                }
                None => self.respond(0x40),
            },
            12 => {
                self.cmd12_count += 1;
                self.phase = Phase::Command;
                self.out.push_back(0xFF);
                self.out.push_back(0xFF);
                self.out.push_back(0x00);
            }
            _ => self.respond(0x05),
        }
    }
}

/// The simulated card; implements `SpiBus` so the driver can own it.
///
/// With [`with_timers`](SimCard::with_timers) the card advances the
/// driver's soft timers as bytes are exchanged (one 10 ms tick per four
/// bytes), letting timeout paths run to expiry deterministically.
pub struct SimCard<'t> {
    state: Rc<RefCell<SimState>>,
    timers: Option<&'t SoftTimers>,
}

impl<'t> SimCard<'t> {
    /// Create a card of the given personality.
    pub fn new(variant: SimVariant) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::new(variant))),
            timers: None,
        }
    }

    /// Let bus traffic advance the driver's soft timers.
    pub fn with_timers(mut self, timers: &'t SoftTimers) -> Self {
        self.timers = Some(timers);
        self
    }

    /// A probe sharing this card's state, for scripting and inspection.
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: Rc::clone(&self.state),
        }
    }

    fn clock(&mut self, mosi: u8) -> u8 {
        let miso = self.state.borrow_mut().clock_byte(mosi);
        if let Some(timers) = self.timers {
            if self.state.borrow().byte_count % 4 == 0 {
                timers.tick();
            }
        }
        miso
    }
}

/// Inspection handle over a [`SimCard`]'s shared state.
#[derive(Clone)]
pub struct SimProbe {
    state: Rc<RefCell<SimState>>,
}

impl SimProbe {
    /// Number of STOP_TRANSMISSION commands seen.
    pub fn cmd12_count(&self) -> usize {
        self.state.borrow().cmd12_count
    }

    /// Number of stop-transfer tokens seen after multi-block writes.
    pub fn stop_tokens(&self) -> usize {
        self.state.borrow().stop_tokens
    }

    /// The pre-erase count announced via ACMD23, if any.
    pub fn pre_erase(&self) -> Option<u32> {
        self.state.borrow().pre_erase
    }

    /// Number of write payloads the card accepted.
    pub fn writes_accepted(&self) -> usize {
        self.state.borrow().writes_accepted
    }

    /// Contents of a block: written data or the default pattern.
    pub fn block(&self, lba: u32) -> [u8; 512] {
        self.state.borrow().block_bytes(lba)
    }

    /// `true` once a write has stored data at `lba`.
    pub fn block_written(&self, lba: u32) -> bool {
        self.state.borrow().blocks.contains_key(&lba)
    }

    /// Stall the multi-read stream before serving block `index`.
    pub fn set_fail_read_block(&self, index: usize) {
        self.state.borrow_mut().fail_read_block = Some(index);
    }

    /// Reject the write payload for block `index`.
    pub fn set_fail_write_block(&self, index: usize) {
        self.state.borrow_mut().fail_write_block = Some(index);
    }

    /// Number of busy polls before op-condition commands report ready.
    pub fn set_ready_after(&self, polls: u32) {
        self.state.borrow_mut().ready_after = polls;
    }
}

impl embedded_hal::spi::ErrorType for SimCard<'_> {
    type Error = core::convert::Infallible;
}

impl embedded_hal::spi::SpiBus<u8> for SimCard<'_> {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.clock(0xFF);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &word in words {
            self.clock(word);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let common = read.len().min(write.len());
        for i in 0..common {
            read[i] = self.clock(write[i]);
        }
        for word in read.iter_mut().skip(common) {
            *word = self.clock(0xFF);
        }
        for &word in write.iter().skip(common) {
            self.clock(word);
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.clock(*word);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Chip-select stand-in for simulator tests.
pub struct SimCs;

impl embedded_hal::digital::ErrorType for SimCs {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for SimCs {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
