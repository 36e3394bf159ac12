// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sequential byte stream over a window of audio.

use std::{
    collections::VecDeque,
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
};

use crate::{DataProvider, Error, PcmFormat, Result, pcm::read_riff_header};

/// One contiguous byte range of a provider's PCM payload.
#[derive(Clone, Debug)]
pub(crate) struct Segment {
    pub(crate) provider: DataProvider,
    /// Offset into the PCM payload (after the RIFF header).
    pub(crate) begin: u64,
    pub(crate) len: u64,
}

/// PCM bytes of a time window, read lazily from the backing providers.
///
/// Returned by [`crate::AudioMediaData::read`]. Provider files are opened one at
/// a time as the stream advances; the stream holds no lock on the audio data,
/// so it stays valid as long as the providers it walks are not deleted.
///
/// # Examples
///
/// ```no_run
/// # use media_store::{AudioMediaData, Time};
/// # use std::io::Read;
/// # fn example(audio: &AudioMediaData) -> Result<(), media_store::Error> {
/// let mut stream = audio.read(Time::ZERO, Time::from_millis(250))?;
/// let mut chunk = vec![0u8; 4096];
/// while stream.read(&mut chunk).unwrap() > 0 {
///     // process PCM
/// }
/// # Ok(())
/// # }
/// ```
pub struct AudioStream {
    format: PcmFormat,
    segments: VecDeque<Segment>,
    current: Option<io::Take<BufReader<File>>>,
    len: u64,
}

impl AudioStream {
    pub(crate) fn new(format: PcmFormat, segments: Vec<Segment>) -> Self {
        let len = segments.iter().map(|segment| segment.len).sum();
        Self {
            format,
            segments: segments.into(),
            current: None,
            len,
        }
    }

    /// Total number of PCM bytes the stream yields.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pcm_format(&self) -> PcmFormat {
        self.format
    }

    /// Reads the remaining bytes into memory.
    pub fn read_to_vec(mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.len as usize);
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let read = self.next_chunk(&mut chunk)?;
            if read == 0 {
                return Ok(bytes);
            }
            bytes.extend_from_slice(&chunk[..read]);
        }
    }

    fn next_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if let Some(current) = self.current.as_mut() {
                let read = current.read(buf).map_err(Error::from)?;
                if read > 0 {
                    return Ok(read);
                }
                if current.limit() > 0 {
                    return Err(Error::Other(format!(
                        "data file ended {} byte(s) early",
                        current.limit()
                    )));
                }
                self.current = None;
            }
            match self.segments.pop_front() {
                Some(segment) => self.current = Some(self.open_segment(&segment)?),
                None => return Ok(0),
            }
        }
    }

    fn open_segment(&self, segment: &Segment) -> Result<io::Take<BufReader<File>>> {
        let path = segment.provider.path()?;
        let mut reader = BufReader::new(segment.provider.open_read()?);
        let header = read_riff_header(&mut reader).map_err(|err| Error::from_io(&path, err))?;
        if header.format != self.format {
            return Err(Error::FormatConflict(format!(
                "{} holds {} audio, expected {}",
                path.display(),
                header.format,
                self.format
            )));
        }
        if segment.begin + segment.len > header.data_len {
            return Err(Error::OutOfBounds(format!(
                "clip [{}, {}) exceeds the {} PCM byte(s) of {}",
                segment.begin,
                segment.begin + segment.len,
                header.data_len,
                path.display()
            )));
        }
        reader
            .seek(SeekFrom::Start(header.data_offset + segment.begin))
            .map_err(|err| Error::io(&path, err))?;
        Ok(reader.take(segment.len))
    }
}

impl Read for AudioStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.next_chunk(buf).map_err(io::Error::other)
    }
}
