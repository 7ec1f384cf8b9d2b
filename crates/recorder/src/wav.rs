//! WAV container writer
//!
//! Emits the fixed 44-byte header of an uncompressed-PCM WAV file with
//! placeholder size fields, tracks the running byte totals while sample
//! data is appended, and patches the two size fields when the recording
//! closes.
//!
//! Layout reference: <https://ccrma.stanford.edu/courses/422-winter-2014/projects/WaveFormat/>

use platform::fs::File;

/// Byte offset of the RIFF total-size field.
pub const TOTAL_SIZE_OFFSET: u32 = 4;
/// Byte offset of the data-chunk payload-size field.
pub const PAYLOAD_SIZE_OFFSET: u32 = 40;
/// Total header length ahead of the first sample.
pub const HEADER_LEN: u32 = 44;

/// PCM stream parameters baked into the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordingFormat {
    /// Channel count (1 = mono).
    pub channels: u16,
    /// Samples per second.
    pub sample_rate_hz: u32,
    /// Bits per sample per channel.
    pub bits_per_sample: u16,
}

impl RecordingFormat {
    /// Bytes of sample data per second.
    #[allow(clippy::arithmetic_side_effects)] // ≤ 2 channels × 16 bits × audio rates fits easily
    pub const fn byte_rate(&self) -> u32 {
        self.sample_rate_hz * self.channels as u32 * self.bits_per_sample as u32 / 8
    }

    /// Bytes per sample frame across all channels.
    #[allow(clippy::arithmetic_side_effects)] // ≤ 2 channels × 16 bits
    pub const fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }
}

impl Default for RecordingFormat {
    /// The device's fixed capture format: mono, 40 kHz, 16-bit.
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate_hz: 40_000,
            bits_per_sample: 16,
        }
    }
}

/// Header state for one recording: the stream format plus the running
/// totals needed to patch the size fields at close.
///
/// `chunk_size` mirrors the RIFF total-size field: every byte after that
/// field, so the header contributes `header_bytes` (36) and each drained
/// buffer adds its own length via [`add_payload`](Self::add_payload).
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WavInfo {
    format: RecordingFormat,
    chunk_size: u32,
    header_bytes: u32,
}

impl WavInfo {
    /// Start header state for a new recording.
    pub fn new(format: RecordingFormat) -> Self {
        Self {
            format,
            chunk_size: 0,
            header_bytes: 0,
        }
    }

    /// The stream format this header describes.
    pub fn format(&self) -> RecordingFormat {
        self.format
    }

    /// Bytes of sample payload accumulated so far.
    pub fn payload_bytes(&self) -> u32 {
        self.chunk_size.saturating_sub(self.header_bytes)
    }

    /// Current value of the RIFF total-size field.
    pub fn total_bytes(&self) -> u32 {
        self.chunk_size
    }

    /// Account for `bytes` of sample data appended after the header.
    pub fn add_payload(&mut self, bytes: u32) {
        self.chunk_size = self.chunk_size.saturating_add(bytes);
    }

    /// Write the 44-byte header with placeholder size fields and reset the
    /// running totals.
    pub fn write_header<F: File>(&mut self, file: &mut F) -> Result<(), F::Error> {
        self.header_bytes = 0;
        self.chunk_size = 0;

        // Group header: id and total size (patched at close) are excluded
        // from the running count; everything after them is included.
        file.write(b"RIFF")?;
        file.write(&0u32.to_le_bytes())?;
        self.tag(file, b"WAVE")?;

        // Format sub-chunk: 16-byte linear-PCM description.
        self.tag(file, b"fmt ")?;
        self.u32_field(file, 16)?;
        self.u16_field(file, 1)?; // linear PCM, no compression
        self.u16_field(file, self.format.channels)?;
        self.u32_field(file, self.format.sample_rate_hz)?;
        self.u32_field(file, self.format.byte_rate())?;
        self.u16_field(file, self.format.block_align())?;
        self.u16_field(file, self.format.bits_per_sample)?;

        // Data sub-chunk: id plus payload size (patched at close).
        self.tag(file, b"data")?;
        self.u32_field(file, 0)?;

        self.chunk_size = self.header_bytes;
        Ok(())
    }

    /// Overwrite the total-size and payload-size fields with the final
    /// accumulated counts.
    pub fn patch_header<F: File>(&self, file: &mut F) -> Result<(), F::Error> {
        file.seek(TOTAL_SIZE_OFFSET)?;
        file.write(&self.chunk_size.to_le_bytes())?;
        file.seek(PAYLOAD_SIZE_OFFSET)?;
        file.write(&self.payload_bytes().to_le_bytes())?;
        Ok(())
    }

    fn tag<F: File>(&mut self, file: &mut F, tag: &[u8; 4]) -> Result<(), F::Error> {
        file.write(tag)?;
        self.header_bytes = self.header_bytes.saturating_add(4);
        Ok(())
    }

    fn u16_field<F: File>(&mut self, file: &mut F, value: u16) -> Result<(), F::Error> {
        file.write(&value.to_le_bytes())?;
        self.header_bytes = self.header_bytes.saturating_add(2);
        Ok(())
    }

    fn u32_field<F: File>(&mut self, file: &mut F, value: u32) -> Result<(), F::Error> {
        file.write(&value.to_le_bytes())?;
        self.header_bytes = self.header_bytes.saturating_add(4);
        Ok(())
    }
}
