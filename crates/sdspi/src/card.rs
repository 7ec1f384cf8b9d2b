//! Card protocol engine and block storage surface
//!
//! [`SdCard`] owns the card session: the transport, the soft-timer
//! reference, the classified variant, and the socket flags. The public
//! surface is the five operations the volume layer consumes — status,
//! initialize, read, write, control — everything else is the command
//! engine underneath them.
//!
//! The initialization handshake distinguishes MMC, SD v1, and SD v2 cards
//! and, for v2, whether the card takes block indices or byte offsets on the
//! wire. That addressing decision is fixed once per session and honored by
//! every later transfer.

use crate::command::Command;
use crate::error::DiskError;
use crate::timers::{SoftTimers, TimerId};
use crate::transport::{Transport, FILL};
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// Transfer unit: every card is driven with 512-byte blocks.
pub const BLOCK_LEN: usize = 512;

/// Overall initialization bound: 100 ticks of the 100 Hz timer (1 s).
const INIT_TIMEOUT_TICKS: u8 = 100;
/// Data-token wait bound, per block (1 s).
const TOKEN_TIMEOUT_TICKS: u8 = 100;

/// R1 response: ready, no error bits.
const R1_READY: u8 = 0x00;
/// R1 response: in idle state, no other error.
const R1_IDLE: u8 = 0x01;
/// Receive attempts while polling for an R1 response.
const RESPONSE_ATTEMPTS: usize = 10;
/// Fixed read length of the stop-transmission response window.
const STOP_RESPONSE_BYTES: usize = 10;

/// Start token for single-block transfers in both directions.
const TOKEN_START: u8 = 0xFE;
/// Start token for each block of a multi-block write.
const TOKEN_MULTI_START: u8 = 0xFC;
/// Stop token terminating a multi-block write.
const TOKEN_STOP_TRAN: u8 = 0xFD;
/// Accepted value of the data-response nibble after a write.
const DATA_ACCEPTED: u8 = 0x05;

/// SEND_IF_COND argument: 2.7-3.6 V range plus the `0xAA` check pattern.
const IF_COND_PATTERN: u32 = 0x1AA;
/// ACMD41 host-capacity-support bit.
const HCS_BIT: u32 = 1 << 30;
/// OCR bit 30: card capacity status (block addressing).
const OCR_CCS: u8 = 0x40;

/// The card variant classified during initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardVariant {
    /// MultiMediaCard, byte addressed.
    Mmc,
    /// SD card version 1, byte addressed.
    SdV1,
    /// SD card version 2+, byte addressed.
    SdV2,
    /// SD card version 2+ high capacity, block addressed.
    SdV2Block,
}

impl CardVariant {
    /// `true` when the card takes block indices on the wire instead of byte
    /// offsets.
    pub const fn block_addressed(self) -> bool {
        matches!(self, Self::SdV2Block)
    }

    /// `true` for SD-class cards (which take the application-command forms).
    pub const fn is_sd(self) -> bool {
        !matches!(self, Self::Mmc)
    }

    /// Translate a block index into the on-wire transfer address.
    pub const fn transfer_address(self, lba: u32) -> u32 {
        if self.block_addressed() {
            lba
        } else {
            // Byte-addressed cards are at most 2 GB, so this cannot wrap in
            // practice; wrapping matches the 32-bit register arithmetic.
            lba.wrapping_mul(BLOCK_LEN as u32)
        }
    }
}

/// Session status flags reported by [`SdCard::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiskStatus {
    /// Initialization handshake has completed.
    pub initialized: bool,
    /// The socket's detect contact reports no card.
    pub no_card: bool,
    /// The socket's write-protect contact is set.
    pub write_protected: bool,
}

/// Miscellaneous control operations, mirroring the volume layer's ioctl
/// surface with typed arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Control {
    /// Turn socket power off. A no-op when already off.
    PowerOff,
    /// Turn socket power on and prime the clock train.
    PowerOn,
    /// Query socket power state.
    PowerStatus,
    /// Total number of 512-byte sectors, decoded from the CSD.
    SectorCount,
    /// Sector size in bytes (constant 512).
    SectorSize,
    /// Wait until any in-flight write has finished.
    Sync,
    /// Raw 16-byte card-specific-data register.
    ReadCsd,
    /// Raw 16-byte card-identification register.
    ReadCid,
    /// Raw 4-byte operating-condition register.
    ReadOcr,
}

/// Responses to [`SdCard::control`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlData {
    /// The operation completed with no payload.
    None,
    /// Socket power state.
    Power(bool),
    /// Total 512-byte sectors on the medium.
    SectorCount(u32),
    /// Sector size in bytes.
    SectorSize(u16),
    /// CSD register contents.
    Csd([u8; 16]),
    /// CID register contents.
    Cid([u8; 16]),
    /// OCR register contents.
    Ocr([u8; 4]),
}

/// SPI-mode SD/MMC card session over a bus, a chip-select pin, and the
/// shared soft timers.
pub struct SdCard<'t, Spi, Cs> {
    transport: Transport<Spi, Cs>,
    timers: &'t SoftTimers,
    variant: Option<CardVariant>,
    no_card: bool,
    write_protected: bool,
    power_on: bool,
}

impl<'t, Spi, Cs> SdCard<'t, Spi, Cs>
where
    Spi: SpiBus,
    Cs: OutputPin,
{
    /// Create an uninitialized session. No bus traffic happens until
    /// [`initialize`](Self::initialize).
    pub fn new(spi: Spi, cs: Cs, timers: &'t SoftTimers) -> Self {
        Self {
            transport: Transport::new(spi, cs),
            timers,
            variant: None,
            no_card: false,
            write_protected: false,
            power_on: false,
        }
    }

    /// Hand back the bus and chip-select pin.
    pub fn release(self) -> (Spi, Cs) {
        self.transport.release()
    }

    /// Mirror the socket's detect contact into the session. Clearing
    /// presence does not tear the session down; it only gates
    /// [`initialize`](Self::initialize) and the reported status.
    pub fn set_card_present(&mut self, present: bool) {
        self.no_card = !present;
    }

    /// Mirror the socket's write-protect contact into the session.
    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    /// Current session flags.
    pub fn status(&self) -> DiskStatus {
        DiskStatus {
            initialized: self.variant.is_some(),
            no_card: self.no_card,
            write_protected: self.write_protected,
        }
    }

    /// The variant classified by the last successful initialization.
    pub fn variant(&self) -> Option<CardVariant> {
        self.variant
    }

    /// Advance the soft timers. Call once per 10 ms; on hardware the
    /// housekeeping interrupt normally calls [`SoftTimers::tick`] on the
    /// shared `static` directly.
    pub fn tick(&self) {
        self.timers.tick();
    }

    /// Run the initialization handshake and classify the card.
    ///
    /// Returns the resulting status rather than an error: an unknown or
    /// unresponsive card simply leaves the session uninitialized (and
    /// powers the socket back off), which callers must check for.
    pub fn initialize(&mut self) -> DiskStatus {
        if self.no_card {
            return self.status();
        }
        let variant = self.handshake().ok().flatten();
        let _ = self.transport.deselect();
        let _ = self.transport.receive(); // release the data line
        self.variant = variant;
        if variant.is_none() {
            self.power_off();
        }
        self.status()
    }

    /// Read `count` blocks starting at `lba` into `buffer`.
    pub fn read(&mut self, buffer: &mut [u8], lba: u32, count: u8) -> Result<(), DiskError> {
        let variant = self.transfer_checks(count, buffer.len())?;
        let address = variant.transfer_address(lba);
        self.transport.select()?;
        let result = self.read_blocks(buffer, address, count);
        self.release_bus();
        result
    }

    /// Write `count` blocks from `buffer` starting at `lba`.
    pub fn write(&mut self, buffer: &[u8], lba: u32, count: u8) -> Result<(), DiskError> {
        let variant = self.transfer_checks(count, buffer.len())?;
        if self.write_protected {
            return Err(DiskError::WriteProtected);
        }
        let address = variant.transfer_address(lba);
        self.transport.select()?;
        let result = self.write_blocks(buffer, address, count, variant);
        self.release_bus();
        result
    }

    /// Miscellaneous control operations.
    ///
    /// Power control is honored even while uninitialized; everything else
    /// requires a completed handshake.
    pub fn control(&mut self, op: Control) -> Result<ControlData, DiskError> {
        match op {
            Control::PowerOff => {
                if self.power_on {
                    self.power_off();
                }
                Ok(ControlData::None)
            }
            Control::PowerOn => {
                self.power_up()?;
                Ok(ControlData::None)
            }
            Control::PowerStatus => Ok(ControlData::Power(self.power_on)),
            _ => {
                if self.variant.is_none() {
                    return Err(DiskError::NotReady);
                }
                self.transport.select()?;
                let result = self.control_selected(op);
                self.release_bus();
                result
            }
        }
    }

    // ── command engine ──────────────────────────────────────────────────────

    /// Send a command frame and poll for its R1 response.
    ///
    /// Returns `0xFF` when the card never answers within the attempt
    /// window; callers compare against the response codes they expect.
    fn send_command(&mut self, cmd: Command, arg: u32) -> Result<u8, DiskError> {
        if self.transport.wait_ready(self.timers)? != FILL {
            return Ok(0xFF);
        }
        self.transport.send(&cmd.frame(arg))?;
        if cmd == Command::StopTransmission {
            // Skip the stuff byte the card clocks out when stopping a read.
            self.transport.receive()?;
        }
        let mut response = FILL;
        for _ in 0..RESPONSE_ATTEMPTS {
            response = self.transport.receive()?;
            if response & 0x80 == 0 {
                break;
            }
        }
        Ok(response)
    }

    /// Terminate a multiple-block read.
    ///
    /// The card may still be draining data, so there is no ready gate, and
    /// the gap before its response varies between cards: read a fixed
    /// window and keep the last non-filler byte seen. This tolerance is
    /// deliberate — some cards skip the specified filler gap entirely.
    fn send_stop_transmission(&mut self) -> Result<u8, DiskError> {
        self.transport
            .send(&[Command::StopTransmission.opcode(), 0, 0, 0, 0, 0])?;
        let mut response = FILL;
        for _ in 0..STOP_RESPONSE_BYTES {
            let byte = self.transport.receive()?;
            if byte != FILL {
                response = byte;
            }
        }
        Ok(response)
    }

    /// Wait for a start token and receive one data block into `dst`,
    /// discarding the trailing CRC.
    fn receive_data_block(&mut self, dst: &mut [u8]) -> Result<(), DiskError> {
        self.timers.start(TimerId::A, TOKEN_TIMEOUT_TICKS);
        let token = loop {
            let byte = self.transport.receive()?;
            if byte != FILL || self.timers.expired(TimerId::A) {
                break byte;
            }
        };
        if token != TOKEN_START {
            return Err(DiskError::Protocol);
        }
        for byte in dst.iter_mut() {
            *byte = self.transport.receive()?;
        }
        self.transport.receive()?; // CRC
        self.transport.receive()?;
        Ok(())
    }

    /// Send one data block (or, with `None`, just the stop token) and check
    /// the card's data response.
    fn transmit_data_block(&mut self, block: Option<&[u8]>, token: u8) -> Result<(), DiskError> {
        if self.transport.wait_ready(self.timers)? != FILL {
            return Err(DiskError::Protocol);
        }
        self.transport.exchange(token)?;
        if let Some(data) = block {
            self.transport.send(data)?;
            self.transport.send(&[FILL, FILL])?; // CRC placeholder
            let response = self.transport.receive()?;
            if response & 0x1F != DATA_ACCEPTED {
                return Err(DiskError::Protocol);
            }
        }
        Ok(())
    }

    // ── initialization ──────────────────────────────────────────────────────

    fn power_up(&mut self) -> Result<(), DiskError> {
        self.transport.prime_clock_train()?;
        self.power_on = true;
        Ok(())
    }

    fn power_off(&mut self) {
        self.power_on = false;
    }

    /// The variant-probing handshake. `Ok(None)` means the card is absent,
    /// unsupported, or timed out; bus faults propagate as errors and are
    /// treated the same by [`initialize`](Self::initialize).
    fn handshake(&mut self) -> Result<Option<CardVariant>, DiskError> {
        self.power_up()?;
        // Prime again with the session powered: guarantees the card is in
        // SPI mode even if it was already powered before this call.
        self.transport.prime_clock_train()?;
        self.transport.select()?;

        if self.send_command(Command::GoIdleState, 0)? != R1_IDLE {
            return Ok(None);
        }
        self.timers.start(TimerId::A, INIT_TIMEOUT_TICKS);

        if self.send_command(Command::SendIfCond, IF_COND_PATTERN)? == R1_IDLE {
            self.sd_v2_handshake()
        } else {
            self.legacy_handshake()
        }
    }

    /// SD v2+: the card echoed the interface condition. Poll ACMD41 with
    /// host-capacity support, then read the OCR to pick the addressing mode.
    fn sd_v2_handshake(&mut self) -> Result<Option<CardVariant>, DiskError> {
        let mut echo = [0u8; 4];
        for byte in echo.iter_mut() {
            *byte = self.transport.receive()?;
        }
        if echo[2] != 0x01 || echo[3] != 0xAA {
            return Ok(None);
        }
        loop {
            if self.send_command(Command::AppCmd, 0)? <= R1_IDLE
                && self.send_command(Command::AppSendOpCond, HCS_BIT)? == R1_READY
            {
                break;
            }
            if self.timers.expired(TimerId::A) {
                return Ok(None);
            }
        }
        if self.timers.expired(TimerId::A) {
            return Ok(None);
        }
        if self.send_command(Command::ReadOcr, 0)? != R1_READY {
            return Ok(None);
        }
        let mut ocr = [0u8; 4];
        for byte in ocr.iter_mut() {
            *byte = self.transport.receive()?;
        }
        Ok(Some(if ocr[0] & OCR_CCS != 0 {
            CardVariant::SdV2Block
        } else {
            CardVariant::SdV2
        }))
    }

    /// SD v1 or MMC: probe once with the application form to tell them
    /// apart, poll the matching operating-condition command until ready,
    /// then fix the block length for these byte-addressed cards.
    fn legacy_handshake(&mut self) -> Result<Option<CardVariant>, DiskError> {
        let sd = self.send_command(Command::AppCmd, 0)? <= R1_IDLE
            && self.send_command(Command::AppSendOpCond, 0)? <= R1_IDLE;
        let variant = if sd { CardVariant::SdV1 } else { CardVariant::Mmc };
        loop {
            let ready = if sd {
                self.send_command(Command::AppCmd, 0)? <= R1_IDLE
                    && self.send_command(Command::AppSendOpCond, 0)? == R1_READY
            } else {
                self.send_command(Command::SendOpCond, 0)? == R1_READY
            };
            if ready {
                break;
            }
            if self.timers.expired(TimerId::A) {
                return Ok(None);
            }
        }
        if self.timers.expired(TimerId::A) {
            return Ok(None);
        }
        if self.send_command(Command::SetBlockLen, BLOCK_LEN as u32)? != R1_READY {
            return Ok(None);
        }
        Ok(Some(variant))
    }

    // ── transfers ───────────────────────────────────────────────────────────

    /// Parameter and session checks shared by read and write.
    fn transfer_checks(&self, count: u8, buffer_len: usize) -> Result<CardVariant, DiskError> {
        if count == 0 {
            return Err(DiskError::InvalidParameter);
        }
        if buffer_len < usize::from(count).saturating_mul(BLOCK_LEN) {
            return Err(DiskError::InvalidParameter);
        }
        self.variant.ok_or(DiskError::NotReady)
    }

    fn read_blocks(&mut self, buffer: &mut [u8], address: u32, count: u8) -> Result<(), DiskError> {
        if count == 1 {
            if self.send_command(Command::ReadSingleBlock, address)? != R1_READY {
                return Err(DiskError::Protocol);
            }
            let block = buffer
                .get_mut(..BLOCK_LEN)
                .ok_or(DiskError::InvalidParameter)?;
            return self.receive_data_block(block);
        }
        if self.send_command(Command::ReadMultipleBlock, address)? != R1_READY {
            return Err(DiskError::Protocol);
        }
        let mut remaining = usize::from(count);
        for chunk in buffer.chunks_exact_mut(BLOCK_LEN).take(usize::from(count)) {
            if self.receive_data_block(chunk).is_err() {
                break;
            }
            remaining = remaining.saturating_sub(1);
        }
        // The stop sequence goes out exactly once, aborted or not; its
        // response is informational only.
        self.send_stop_transmission()?;
        if remaining == 0 {
            Ok(())
        } else {
            Err(DiskError::Protocol)
        }
    }

    fn write_blocks(
        &mut self,
        buffer: &[u8],
        address: u32,
        count: u8,
        variant: CardVariant,
    ) -> Result<(), DiskError> {
        if count == 1 {
            if self.send_command(Command::WriteBlock, address)? != R1_READY {
                return Err(DiskError::Protocol);
            }
            let block = buffer.get(..BLOCK_LEN).ok_or(DiskError::InvalidParameter)?;
            return self.transmit_data_block(Some(block), TOKEN_START);
        }
        if variant.is_sd() {
            // Pre-erase announcement; responses are advisory.
            self.send_command(Command::AppCmd, 0)?;
            self.send_command(Command::SetBlockCount, u32::from(count))?;
        }
        if self.send_command(Command::WriteMultipleBlock, address)? != R1_READY {
            return Err(DiskError::Protocol);
        }
        let mut remaining = usize::from(count);
        for chunk in buffer.chunks_exact(BLOCK_LEN).take(usize::from(count)) {
            if self
                .transmit_data_block(Some(chunk), TOKEN_MULTI_START)
                .is_err()
            {
                break;
            }
            remaining = remaining.saturating_sub(1);
        }
        let stopped = self.transmit_data_block(None, TOKEN_STOP_TRAN).is_ok();
        if remaining == 0 && stopped {
            Ok(())
        } else {
            Err(DiskError::Protocol)
        }
    }

    // ── control ─────────────────────────────────────────────────────────────

    fn control_selected(&mut self, op: Control) -> Result<ControlData, DiskError> {
        match op {
            Control::SectorCount => {
                let csd = self.read_register_block()?;
                Ok(ControlData::SectorCount(sector_count_from_csd(&csd)))
            }
            Control::SectorSize => Ok(ControlData::SectorSize(BLOCK_LEN as u16)),
            Control::Sync => {
                if self.transport.wait_ready(self.timers)? == FILL {
                    Ok(ControlData::None)
                } else {
                    Err(DiskError::Protocol)
                }
            }
            Control::ReadCsd => Ok(ControlData::Csd(self.read_register_block()?)),
            Control::ReadCid => {
                if self.send_command(Command::SendCid, 0)? != R1_READY {
                    return Err(DiskError::Protocol);
                }
                let mut cid = [0u8; 16];
                self.receive_data_block(&mut cid)?;
                Ok(ControlData::Cid(cid))
            }
            Control::ReadOcr => {
                if self.send_command(Command::ReadOcr, 0)? != R1_READY {
                    return Err(DiskError::Protocol);
                }
                let mut ocr = [0u8; 4];
                for byte in ocr.iter_mut() {
                    *byte = self.transport.receive()?;
                }
                Ok(ControlData::Ocr(ocr))
            }
            // Power operations are dispatched before selection.
            Control::PowerOff | Control::PowerOn | Control::PowerStatus => {
                Err(DiskError::InvalidParameter)
            }
        }
    }

    fn read_register_block(&mut self) -> Result<[u8; 16], DiskError> {
        if self.send_command(Command::SendCsd, 0)? != R1_READY {
            return Err(DiskError::Protocol);
        }
        let mut csd = [0u8; 16];
        self.receive_data_block(&mut csd)?;
        Ok(csd)
    }

    fn release_bus(&mut self) {
        let _ = self.transport.deselect();
        let _ = self.transport.receive(); // release the data line
    }
}

/// Decode the 512-byte-sector total from a raw CSD register.
///
/// Version 2 CSDs carry C_SIZE directly in 512 KiB units; version 1 and MMC
/// CSDs spread a mantissa and exponent across several fields.
#[allow(clippy::indexing_slicing)] // all indices are constants within the 16-byte register
#[allow(clippy::arithmetic_side_effects)] // field widths bound every shift and sum
fn sector_count_from_csd(csd: &[u8; 16]) -> u32 {
    if csd[0] >> 6 == 1 {
        let c_size = u32::from(csd[9]) + (u32::from(csd[8]) << 8) + 1;
        c_size << 10
    } else {
        let exponent = (csd[5] & 15) + ((csd[10] & 128) >> 7) + ((csd[9] & 3) << 1) + 2;
        let c_size =
            u32::from(csd[8] >> 6) + (u32::from(csd[7]) << 2) + (u32::from(csd[6] & 3) << 10) + 1;
        c_size << (exponent - 9)
    }
}
