// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! PCM format description and RIFF/WAVE framing.
//!
//! [`PcmFormat`] is an immutable value: changing a format means building a new
//! validated value and swapping it in. Audio providers store a canonical
//! 44-byte RIFF header followed by raw interleaved PCM, so every backing file
//! is a playable WAV file.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, Time, time::TICKS_PER_SECOND};

/// Size of the canonical header written by [`write_riff_header`].
pub const RIFF_HEADER_LEN: u64 = 44;

/// Largest PCM payload one RIFF/WAVE stream can describe.
pub const MAX_RIFF_DATA_LEN: u64 = (u32::MAX - 36) as u64;

const WAVE_FORMAT_PCM: u16 = 1;

/// Channel count, bit depth and sample rate of raw PCM audio.
///
/// # Examples
///
/// ```
/// use media_store::{PcmFormat, Time};
///
/// # fn main() -> Result<(), media_store::Error> {
/// let format = PcmFormat::new(1, 16, 44100)?;
/// assert_eq!(format.block_align(), 2);
/// assert_eq!(format.bytes_for(Time::from_secs(1)), 88200);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PcmFormatFields")]
pub struct PcmFormat {
    channels: u16,
    bit_depth: u16,
    sample_rate: u32,
}

/// Unvalidated serde mirror of [`PcmFormat`].
#[derive(Deserialize)]
struct PcmFormatFields {
    channels: u16,
    bit_depth: u16,
    sample_rate: u32,
}

impl TryFrom<PcmFormatFields> for PcmFormat {
    type Error = Error;

    fn try_from(value: PcmFormatFields) -> Result<Self> {
        PcmFormat::new(value.channels, value.bit_depth, value.sample_rate)
    }
}

impl Default for PcmFormat {
    /// Mono, 16 bit, 44.1 kHz.
    fn default() -> Self {
        Self {
            channels: 1,
            bit_depth: 16,
            sample_rate: 44100,
        }
    }
}

impl PcmFormat {
    /// Builds a validated format.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfBounds`] if any field is zero or the bit depth is not a
    /// whole number of bytes.
    pub fn new(channels: u16, bit_depth: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(Error::OutOfBounds(
                "channel count must be positive".to_string(),
            ));
        }
        if bit_depth == 0 || bit_depth % 8 != 0 {
            return Err(Error::OutOfBounds(format!(
                "bit depth must be a positive multiple of 8, got {bit_depth}"
            )));
        }
        if sample_rate == 0 {
            return Err(Error::OutOfBounds(
                "sample rate must be positive".to_string(),
            ));
        }
        Ok(Self {
            channels,
            bit_depth,
            sample_rate,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn with_channels(self, channels: u16) -> Result<Self> {
        Self::new(channels, self.bit_depth, self.sample_rate)
    }

    pub fn with_bit_depth(self, bit_depth: u16) -> Result<Self> {
        Self::new(self.channels, bit_depth, self.sample_rate)
    }

    pub fn with_sample_rate(self, sample_rate: u32) -> Result<Self> {
        Self::new(self.channels, self.bit_depth, sample_rate)
    }

    /// Bytes per sample frame (one sample for every channel).
    pub fn block_align(&self) -> u32 {
        u32::from(self.channels) * u32::from(self.bit_depth / 8)
    }

    /// Bytes per second of audio.
    pub fn byte_rate(&self) -> u64 {
        u64::from(self.block_align()) * u64::from(self.sample_rate)
    }

    /// Converts a non-negative time to a byte count, rounded to the nearest
    /// whole sample frame. Negative times map to zero.
    pub fn bytes_for(&self, time: Time) -> u64 {
        if time.is_negative() {
            return 0;
        }
        let per_second = TICKS_PER_SECOND as u128;
        let frames =
            (time.ticks() as u128 * u128::from(self.sample_rate) + per_second / 2) / per_second;
        (frames * u128::from(self.block_align())) as u64
    }

    /// Converts a byte count to a time, ignoring any trailing partial frame.
    ///
    /// `bytes_for(time_for(n))` equals `n` for every frame-aligned `n`.
    pub fn time_for(&self, bytes: u64) -> Time {
        let frames = u128::from(bytes / u64::from(self.block_align()));
        let rate = u128::from(self.sample_rate);
        let ticks = (frames * TICKS_PER_SECOND as u128 + rate / 2) / rate;
        Time::from_ticks(ticks as i64)
    }

    pub fn is_frame_aligned(&self, bytes: u64) -> bool {
        bytes % u64::from(self.block_align()) == 0
    }
}

impl std::fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ch / {} bit / {} Hz",
            self.channels, self.bit_depth, self.sample_rate
        )
    }
}

/// Location of the PCM payload inside a RIFF/WAVE stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RiffHeader {
    pub format: PcmFormat,
    /// Offset of the first PCM byte from the start of the stream.
    pub data_offset: u64,
    /// Length of the PCM payload in bytes.
    pub data_len: u64,
}

/// Writes the canonical 44-byte RIFF/WAVE header for `data_len` PCM bytes.
pub fn write_riff_header<W: Write>(
    writer: &mut W,
    format: &PcmFormat,
    data_len: u64,
) -> io::Result<()> {
    let data_len = u32::try_from(data_len)
        .ok()
        .filter(|len| u64::from(*len) <= MAX_RIFF_DATA_LEN)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{data_len} byte(s) do not fit in a RIFF chunk"),
            )
        })?;
    let mut header = Vec::with_capacity(RIFF_HEADER_LEN as usize);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36 + data_len).to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    header.extend_from_slice(&format.channels.to_le_bytes());
    header.extend_from_slice(&format.sample_rate.to_le_bytes());
    header.extend_from_slice(&(format.byte_rate() as u32).to_le_bytes());
    header.extend_from_slice(&(format.block_align() as u16).to_le_bytes());
    header.extend_from_slice(&format.bit_depth.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());
    writer.write_all(&header)
}

/// Reads a RIFF/WAVE header, leaving `reader` positioned at the first PCM byte.
///
/// Chunks other than `fmt ` and `data` are skipped.
pub fn read_riff_header<R: Read>(reader: &mut R) -> io::Result<RiffHeader> {
    let mut riff = [0u8; 12];
    reader.read_exact(&mut riff)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(invalid_data("missing RIFF/WAVE markers"));
    }
    let mut offset = 12u64;
    let mut format = None;
    loop {
        let mut chunk = [0u8; 8];
        reader.read_exact(&mut chunk)?;
        offset += 8;
        let size = u64::from(u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]));
        match &chunk[0..4] {
            b"fmt " => {
                if size < 16 {
                    return Err(invalid_data("fmt chunk is too short"));
                }
                let mut body = vec![0u8; size as usize];
                reader.read_exact(&mut body)?;
                offset += size;
                let tag = u16::from_le_bytes([body[0], body[1]]);
                if tag != WAVE_FORMAT_PCM {
                    return Err(invalid_data("audio is not linear PCM"));
                }
                let channels = u16::from_le_bytes([body[2], body[3]]);
                let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                let bit_depth = u16::from_le_bytes([body[14], body[15]]);
                format = Some(
                    PcmFormat::new(channels, bit_depth, sample_rate)
                        .map_err(|err| invalid_data(&err.to_string()))?,
                );
            }
            b"data" => {
                let format = format.ok_or_else(|| invalid_data("data chunk precedes fmt chunk"))?;
                return Ok(RiffHeader {
                    format,
                    data_offset: offset,
                    data_len: size,
                });
            }
            _ => {
                // Chunks are padded to an even length.
                let skip = size + (size & 1);
                let skipped = io::copy(&mut (&mut *reader).take(skip), &mut io::sink())?;
                if skipped != skip {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
                }
                offset += skip;
            }
        }
    }
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fields_are_out_of_bounds() {
        assert!(matches!(PcmFormat::new(0, 16, 44100), Err(Error::OutOfBounds(_))));
        assert!(matches!(PcmFormat::new(1, 0, 44100), Err(Error::OutOfBounds(_))));
        assert!(matches!(PcmFormat::new(1, 12, 44100), Err(Error::OutOfBounds(_))));
        assert!(matches!(PcmFormat::new(1, 16, 0), Err(Error::OutOfBounds(_))));
    }

    #[test]
    fn byte_and_time_conversions_are_inverse() {
        let format = PcmFormat::new(2, 24, 44100).unwrap();
        for frames in [0u64, 1, 7, 22050, 44100, 1_234_567] {
            let bytes = frames * u64::from(format.block_align());
            assert_eq!(format.bytes_for(format.time_for(bytes)), bytes);
        }
        assert_eq!(format.bytes_for(Time::from_millis(500)), 22050 * 6);
    }

    #[test]
    fn header_round_trips() {
        let format = PcmFormat::new(2, 16, 48000).unwrap();
        let mut buffer = Vec::new();
        write_riff_header(&mut buffer, &format, 1000).unwrap();
        assert_eq!(buffer.len() as u64, RIFF_HEADER_LEN);
        let header = read_riff_header(&mut buffer.as_slice()).unwrap();
        assert_eq!(header.format, format);
        assert_eq!(header.data_offset, RIFF_HEADER_LEN);
        assert_eq!(header.data_len, 1000);
    }

    #[test]
    fn garbage_is_rejected() {
        let bytes = vec![0u8; 64];
        let err = read_riff_header(&mut bytes.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn deserialization_validates_fields() {
        let format: PcmFormat =
            serde_json::from_str(r#"{"channels":2,"bit_depth":16,"sample_rate":48000}"#).unwrap();
        assert_eq!(format.channels(), 2);
        assert!(
            serde_json::from_str::<PcmFormat>(r#"{"channels":0,"bit_depth":16,"sample_rate":1}"#)
                .is_err()
        );
    }
}
