// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Time-indexed PCM audio backed by data providers.

use std::{
    collections::HashSet,
    fmt,
    io::{self, BufWriter, Read, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use tracing::{debug, trace, warn};

use crate::{
    AudioStream, DataProvider, DataProviderRegistry, Error, MediaData, MediaDataRegistry,
    PcmFormat, Result, Time, Uid,
    media::{registry::MediaRegistryContext, stream::Segment},
    pcm::{MAX_RIFF_DATA_LEN, write_riff_header},
    provider::mime,
    uid::{Keyed, ObjectKey},
};

/// A byte window `[begin, end)` of one provider's PCM payload.
#[derive(Clone, Debug)]
pub(crate) struct PcmClip {
    pub(crate) provider: DataProvider,
    pub(crate) begin: u64,
    pub(crate) end: u64,
}

impl PcmClip {
    fn len(&self) -> u64 {
        self.end - self.begin
    }
}

struct AudioState {
    name: String,
    format: PcmFormat,
    /// Audio content in playback order.
    clips: Vec<PcmClip>,
}

impl AudioState {
    fn byte_len(&self) -> u64 {
        self.clips.iter().map(PcmClip::len).sum()
    }

    fn duration(&self) -> Time {
        self.format.time_for(self.byte_len())
    }

    /// Ensures a clip boundary at `offset` and returns the index of the clip
    /// starting there (`clips.len()` at the end).
    fn boundary_at(&mut self, offset: u64) -> usize {
        let mut start = 0;
        for index in 0..self.clips.len() {
            if start == offset {
                return index;
            }
            let len = self.clips[index].len();
            if offset < start + len {
                let cut = self.clips[index].begin + (offset - start);
                let mut tail = self.clips[index].clone();
                tail.begin = cut;
                self.clips[index].end = cut;
                self.clips.insert(index + 1, tail);
                return index + 1;
            }
            start += len;
        }
        self.clips.len()
    }

    /// Cuts `[begin, end)` out of the clip list and returns the removed clips.
    fn cut(&mut self, begin: u64, end: u64) -> Vec<PcmClip> {
        let first = self.boundary_at(begin);
        let last = self.boundary_at(end);
        self.clips.drain(first..last).collect()
    }

    /// Merges neighbouring clips that continue the same provider window.
    fn coalesce(&mut self) {
        let mut merged: Vec<PcmClip> = Vec::with_capacity(self.clips.len());
        for clip in self.clips.drain(..) {
            if clip.len() == 0 {
                continue;
            }
            match merged.last_mut() {
                Some(previous) if previous.provider == clip.provider && previous.end == clip.begin => {
                    previous.end = clip.end;
                }
                _ => merged.push(clip),
            }
        }
        self.clips = merged;
    }

    /// Providers of `removed` that no remaining clip references.
    fn orphans(&self, removed: &[PcmClip]) -> Vec<DataProvider> {
        let live: HashSet<&DataProvider> = self.clips.iter().map(|clip| &clip.provider).collect();
        let mut seen = HashSet::new();
        removed
            .iter()
            .map(|clip| &clip.provider)
            .filter(|provider| !live.contains(provider) && seen.insert(provider.key()))
            .cloned()
            .collect()
    }

    fn segments(&self, begin: u64, end: u64) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut start = 0;
        for clip in &self.clips {
            let clip_end = start + clip.len();
            let from = begin.max(start);
            let to = end.min(clip_end);
            if from < to {
                segments.push(Segment {
                    provider: clip.provider.clone(),
                    begin: clip.begin + (from - start),
                    len: to - from,
                });
            }
            if clip_end >= end {
                break;
            }
            start = clip_end;
        }
        segments
    }
}

/// PCM audio addressed by time.
///
/// Content is kept as an ordered list of byte windows over WAV-framed data
/// providers. Inserting writes the new bytes to a fresh provider and splices it
/// in; removing trims windows. Existing provider bytes are never rewritten, so
/// a mutation that fails (short input, I/O error) leaves the audio unchanged.
///
/// Time windows are half-open: `[begin, end)`. Times are converted to byte
/// offsets by rounding to the nearest whole sample frame.
///
/// Instances are created by a [`MediaDataRegistry`] and shared as
/// `Arc<AudioMediaData>`. Methods take `&self`; each operation is atomic with
/// respect to other operations on the same instance.
///
/// # Examples
///
/// ```no_run
/// use media_store::{Presentation, Time};
///
/// # fn main() -> Result<(), media_store::Error> {
/// let presentation = Presentation::new("/tmp/doc");
/// let audio = presentation.media_data_registry().create_audio()?;
///
/// // One second of 16 bit mono silence at 44.1 kHz.
/// let silence = vec![0u8; 88200];
/// audio.append(silence.as_slice(), Time::from_secs(1))?;
///
/// let tail = audio.split(Time::from_millis(500))?;
/// assert_eq!(audio.duration(), Time::from_millis(500));
/// assert_eq!(tail.duration(), Time::from_millis(500));
/// # Ok(())
/// # }
/// ```
pub struct AudioMediaData {
    key: ObjectKey,
    registry: Weak<MediaRegistryContext>,
    registry_id: uuid::Uuid,
    providers: DataProviderRegistry,
    state: Mutex<AudioState>,
}

impl AudioMediaData {
    pub(crate) fn new(
        registry: &Arc<MediaRegistryContext>,
        providers: DataProviderRegistry,
        format: PcmFormat,
    ) -> Self {
        Self {
            key: uuid::Uuid::new_v4(),
            registry: Arc::downgrade(registry),
            registry_id: registry.id,
            providers,
            state: Mutex::new(AudioState {
                name: String::new(),
                format,
                clips: Vec::new(),
            }),
        }
    }

    /// Rebuilds audio from persisted clips; used while loading a document.
    pub(crate) fn restore(
        registry: &Arc<MediaRegistryContext>,
        providers: DataProviderRegistry,
        name: String,
        format: PcmFormat,
        clips: Vec<PcmClip>,
    ) -> Self {
        let audio = Self::new(registry, providers, format);
        {
            let mut state = audio.lock();
            state.name = name;
            state.clips = clips;
            state.coalesce();
        }
        audio
    }

    fn lock(&self) -> MutexGuard<'_, AudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The registry this audio was created by.
    pub fn registry(&self) -> Result<MediaDataRegistry> {
        self.registry
            .upgrade()
            .map(MediaDataRegistry::from_context)
            .ok_or(Error::Detached)
    }

    /// The uid this audio is registered under.
    pub fn uid(&self) -> Result<Uid> {
        self.registry()?.uid_of_key(self.key)
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.lock().name = name.into();
    }

    pub fn pcm_format(&self) -> PcmFormat {
        self.lock().format
    }

    /// Replaces the PCM format.
    ///
    /// # Errors
    ///
    /// [`Error::FormatConflict`] if the audio already holds bytes in another
    /// format, or if the owning registry enforces a different single format.
    pub fn set_pcm_format(&self, format: PcmFormat) -> Result<()> {
        // Registry before audio: the registry inspects audio formats while
        // holding its own lock.
        let context = self.registry.upgrade();
        let registry_state = context.as_ref().map(|context| context.lock());
        if let Some(registry_state) = &registry_state {
            registry_state.check_member_format(self.key, &format)?;
        }
        let mut state = self.lock();
        if state.format == format {
            return Ok(());
        }
        let bytes = state.byte_len();
        if bytes > 0 {
            return Err(Error::FormatConflict(format!(
                "cannot change the format of audio holding {bytes} byte(s) from {} to {format}",
                state.format
            )));
        }
        debug!("Audio format changed from {} to {format}", state.format);
        state.format = format;
        Ok(())
    }

    /// Sets the channel count; zero is [`Error::OutOfBounds`].
    pub fn set_channels(&self, channels: u16) -> Result<()> {
        self.set_pcm_format(self.pcm_format().with_channels(channels)?)
    }

    /// Sets the bit depth; zero or non byte-aligned values are [`Error::OutOfBounds`].
    pub fn set_bit_depth(&self, bit_depth: u16) -> Result<()> {
        self.set_pcm_format(self.pcm_format().with_bit_depth(bit_depth)?)
    }

    /// Sets the sample rate; zero is [`Error::OutOfBounds`].
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<()> {
        self.set_pcm_format(self.pcm_format().with_sample_rate(sample_rate)?)
    }

    /// Number of stored PCM bytes.
    pub fn byte_len(&self) -> u64 {
        self.lock().byte_len()
    }

    /// Intrinsic duration, derived from the stored bytes and the PCM format.
    pub fn duration(&self) -> Time {
        self.lock().duration()
    }

    /// Providers referenced by the content, in playback order, without
    /// duplicates.
    pub fn used_providers(&self) -> Vec<DataProvider> {
        let state = self.lock();
        let mut seen = HashSet::new();
        state
            .clips
            .iter()
            .filter(|clip| seen.insert(clip.provider.key()))
            .map(|clip| clip.provider.clone())
            .collect()
    }

    pub(crate) fn clips(&self) -> Vec<PcmClip> {
        self.lock().clips.clone()
    }

    /// Returns the PCM bytes of `[begin, end)`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfBounds`] if `begin > end` or either lies outside
    /// `[0, duration]`.
    pub fn read(&self, begin: Time, end: Time) -> Result<AudioStream> {
        let state = self.lock();
        check_window(&state, begin, end)?;
        let total = state.byte_len();
        let from = state.format.bytes_for(begin).min(total);
        let to = state.format.bytes_for(end).min(total);
        Ok(AudioStream::new(state.format, state.segments(from, to)))
    }

    /// Returns the PCM bytes of `[begin, end)` collected into memory.
    pub fn read_bytes(&self, begin: Time, end: Time) -> Result<Vec<u8>> {
        self.read(begin, end)?.read_to_vec()
    }

    /// Returns every stored PCM byte.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.read(Time::ZERO, self.duration())?.read_to_vec()
    }

    /// Appends `duration` worth of PCM read from `source`.
    ///
    /// Same as [`Self::insert`] at the current duration.
    pub fn append<R: Read>(&self, source: R, duration: Time) -> Result<()> {
        let at = self.duration();
        self.insert(source, at, duration)
    }

    /// Splices `duration` worth of PCM read from `source` in at `at`, shifting
    /// later content.
    ///
    /// The byte window is `[bytes_for(at), bytes_for(at + duration))`, the same
    /// one [`Self::remove`] cuts for `[at, at + duration)`. Content larger than
    /// one RIFF data chunk is spread over several providers.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfBounds`] if `at` is outside `[0, duration]` or
    ///   `duration` is negative
    /// - [`Error::ShortInput`] if `source` ends before the declared duration;
    ///   the audio is left unchanged
    pub fn insert<R: Read>(&self, source: R, at: Time, duration: Time) -> Result<()> {
        let (format, offset, len) = {
            let state = self.lock();
            check_insert_point(&state, at, duration)?;
            let (offset, len) = byte_window(&state.format, at, duration);
            (state.format, offset, len)
        };
        if len == 0 {
            return Ok(());
        }
        let clips = self.write_clips(source, format, len)?;

        let mut state = self.lock();
        if state.format != format || offset > state.byte_len() {
            drop(state);
            self.discard_all(&clips);
            return Err(Error::OutOfBounds(
                "audio changed while the insert was being written".to_string(),
            ));
        }
        let index = state.boundary_at(offset);
        state.clips.splice(index..index, clips);
        state.coalesce();
        trace!("Inserted {len} byte(s) at byte {offset}");
        Ok(())
    }

    /// Overwrites `duration` worth of audio starting at `at` with PCM read from
    /// `source`.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfBounds`] if `at` is outside `[0, duration]`, `duration`
    ///   is negative or `at + duration` runs past the end of the audio
    /// - [`Error::ShortInput`] if `source` ends early; the audio is left unchanged
    pub fn replace<R: Read>(&self, source: R, at: Time, duration: Time) -> Result<()> {
        let (format, offset, len) = {
            let state = self.lock();
            check_insert_point(&state, at, duration)?;
            let (offset, len) = byte_window(&state.format, at, duration);
            if offset + len > state.byte_len() {
                return Err(Error::OutOfBounds(format!(
                    "replacing {duration} at {at} runs past the end ({})",
                    state.duration()
                )));
            }
            (state.format, offset, len)
        };
        if len == 0 {
            return Ok(());
        }
        let clips = self.write_clips(source, format, len)?;

        let orphans = {
            let mut state = self.lock();
            if state.format != format || offset + len > state.byte_len() {
                drop(state);
                self.discard_all(&clips);
                return Err(Error::OutOfBounds(
                    "audio changed while the replacement was being written".to_string(),
                ));
            }
            let removed = state.cut(offset, offset + len);
            let index = state.boundary_at(offset);
            state.clips.splice(index..index, clips);
            state.coalesce();
            state.orphans(&removed)
        };
        trace!("Replaced {len} byte(s) at byte {offset}");
        self.release(orphans);
        Ok(())
    }

    /// Removes `[begin, end)`, shifting later content earlier.
    ///
    /// Providers no longer referenced afterwards are deleted through the
    /// provider registry.
    pub fn remove(&self, begin: Time, end: Time) -> Result<()> {
        let orphans = {
            let mut state = self.lock();
            check_window(&state, begin, end)?;
            let total = state.byte_len();
            let from = state.format.bytes_for(begin).min(total);
            let to = state.format.bytes_for(end).min(total);
            let removed = state.cut(from, to);
            state.coalesce();
            trace!("Removed byte(s) [{from}, {to})");
            state.orphans(&removed)
        };
        self.release(orphans);
        Ok(())
    }

    /// Removes everything from `begin` to the end.
    pub fn remove_from(&self, begin: Time) -> Result<()> {
        let end = self.duration();
        self.remove(begin, end)
    }

    /// Moves `[at, duration)` into a new audio data of the same format,
    /// registered in the same registry, and truncates this one to `[0, at)`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfBounds`] if `at` is negative or beyond the duration.
    pub fn split(&self, at: Time) -> Result<Arc<AudioMediaData>> {
        let (format, name, end) = {
            let state = self.lock();
            let end = state.duration();
            if at.is_negative() || at > end {
                return Err(Error::OutOfBounds(format!(
                    "split point {at} is outside [0, {end}]"
                )));
            }
            (state.format, state.name.clone(), end)
        };
        let registry = self.registry()?;
        let tail = registry.create_audio_with_format(format)?;
        tail.set_name(name);
        let moved = self
            .read(at, end)
            .and_then(|stream| tail.append_stream(stream))
            .and_then(|()| self.remove(at, end));
        if let Err(err) = moved {
            if let Err(cleanup) = tail.delete() {
                warn!("Failed to discard split tail: {cleanup}");
            }
            return Err(err);
        }
        debug!("Split audio at {at}, tail holds {}", tail.duration());
        Ok(tail)
    }

    /// Deep copy registered in the same registry.
    pub fn copy(&self) -> Result<Arc<AudioMediaData>> {
        self.export(&self.registry()?)
    }

    /// Deep copy registered in `destination`, with fresh providers in that
    /// registry's provider registry.
    ///
    /// # Errors
    ///
    /// [`Error::FormatConflict`] if `destination` enforces a different format.
    pub fn export(&self, destination: &MediaDataRegistry) -> Result<Arc<AudioMediaData>> {
        let (format, name) = {
            let state = self.lock();
            (state.format, state.name.clone())
        };
        let copy = destination.create_audio_with_format(format)?;
        copy.set_name(name);
        let copied = self
            .read(Time::ZERO, self.duration())
            .and_then(|stream| copy.append_stream(stream));
        if let Err(err) = copied {
            if let Err(cleanup) = copy.delete() {
                warn!("Failed to discard partial copy: {cleanup}");
            }
            return Err(err);
        }
        Ok(copy)
    }

    /// Detaches from the registry and deletes every provider.
    ///
    /// Every provider is attempted. Clips over providers that could not be
    /// deleted stay in the content so a retry can release them; the first
    /// failure is returned.
    pub fn delete(&self) -> Result<()> {
        if let Some(context) = self.registry.upgrade() {
            MediaDataRegistry::from_context(context).detach(self.key);
        }
        let mut clips = std::mem::take(&mut self.lock().clips);
        let mut first_error = None;
        let mut kept = HashSet::new();
        let mut seen = HashSet::new();
        for clip in &clips {
            if !seen.insert(clip.provider.key()) {
                continue;
            }
            if let Err(err) = clip.provider.delete() {
                warn!("Failed to delete data provider of deleted audio: {err}");
                kept.insert(clip.provider.key());
                first_error.get_or_insert(err);
            }
        }
        clips.retain(|clip| kept.contains(&clip.provider.key()));
        if !clips.is_empty() {
            let mut state = self.lock();
            clips.append(&mut state.clips);
            state.clips = clips;
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn registry_id(&self) -> uuid::Uuid {
        self.registry_id
    }

    /// Appends the whole of `stream`, which must share this audio's format.
    fn append_stream(&self, stream: AudioStream) -> Result<()> {
        let len = stream.len();
        if len == 0 {
            return Ok(());
        }
        let format = self.pcm_format();
        if stream.pcm_format() != format {
            return Err(Error::FormatConflict(format!(
                "cannot append {} audio to {format} audio",
                stream.pcm_format()
            )));
        }
        let clips = self.write_clips(stream, format, len)?;
        let mut state = self.lock();
        state.clips.extend(clips);
        state.coalesce();
        Ok(())
    }

    /// Writes exactly `len` bytes of `source` to new WAV providers, one per
    /// RIFF-sized chunk. Nothing is kept if any chunk fails.
    fn write_clips<R: Read>(
        &self,
        mut source: R,
        format: PcmFormat,
        len: u64,
    ) -> Result<Vec<PcmClip>> {
        let mut clips = Vec::new();
        for chunk in chunk_lengths(len, &format) {
            match self.write_clip(&mut source, format, chunk) {
                Ok(clip) => clips.push(clip),
                Err(err) => {
                    self.discard_all(&clips);
                    return Err(err);
                }
            }
        }
        Ok(clips)
    }

    /// Writes exactly `len` bytes of `source` to a new WAV provider.
    fn write_clip<R: Read>(&self, source: &mut R, format: PcmFormat, len: u64) -> Result<PcmClip> {
        let provider = self.providers.create_provider(mime::AUDIO_WAV)?;
        match write_pcm(&provider, source, &format, len) {
            Ok(()) => Ok(PcmClip {
                provider,
                begin: 0,
                end: len,
            }),
            Err(err) => {
                self.discard(&provider);
                Err(err)
            }
        }
    }

    fn discard(&self, provider: &DataProvider) {
        if let Err(err) = provider.delete() {
            warn!("Failed to discard data provider: {err}");
        }
    }

    fn discard_all(&self, clips: &[PcmClip]) {
        for clip in clips {
            self.discard(&clip.provider);
        }
    }

    /// Deletes providers dropped by a mutation. Failures leave the provider
    /// registered, where [`DataProviderRegistry::collect_unused`] picks it up.
    fn release(&self, orphans: Vec<DataProvider>) {
        for provider in orphans {
            if let Err(err) = provider.delete() {
                warn!("Failed to release unused data provider: {err}");
            }
        }
    }
}

impl Keyed for AudioMediaData {
    fn key(&self) -> ObjectKey {
        self.key
    }
}

impl fmt::Debug for AudioMediaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("AudioMediaData")
            .field("name", &state.name)
            .field("format", &state.format)
            .field("bytes", &state.byte_len())
            .field("clips", &state.clips.len())
            .finish()
    }
}

impl From<&Arc<AudioMediaData>> for MediaData {
    fn from(audio: &Arc<AudioMediaData>) -> Self {
        MediaData::Audio(Arc::clone(audio))
    }
}

fn write_pcm<R: Read>(
    provider: &DataProvider,
    source: &mut R,
    format: &PcmFormat,
    len: u64,
) -> Result<()> {
    let path = provider.path()?;
    let mut writer = BufWriter::new(provider.open_write()?);
    write_riff_header(&mut writer, format, len).map_err(|err| Error::io(&path, err))?;
    let copied = io::copy(&mut source.take(len), &mut writer).map_err(|err| Error::io(&path, err))?;
    if copied < len {
        return Err(Error::ShortInput {
            expected: len,
            actual: copied,
        });
    }
    writer.flush().map_err(|err| Error::io(&path, err))?;
    Ok(())
}

/// Byte offset and length of the time window `[at, at + duration)`.
///
/// Both ends are rounded on their own so the same window always maps to the
/// same bytes, whether it is being inserted, replaced, read or removed.
fn byte_window(format: &PcmFormat, at: Time, duration: Time) -> (u64, u64) {
    let begin = format.bytes_for(at);
    let end = format.bytes_for(Time::from_ticks(at.ticks().saturating_add(duration.ticks())));
    (begin, end.saturating_sub(begin))
}

/// Splits `len` into pieces that each fit one RIFF data chunk, cut on frame
/// boundaries.
fn chunk_lengths(len: u64, format: &PcmFormat) -> Vec<u64> {
    chunk_lengths_with_limit(len, MAX_RIFF_DATA_LEN, u64::from(format.block_align()))
}

fn chunk_lengths_with_limit(len: u64, limit: u64, block_align: u64) -> Vec<u64> {
    let limit = (limit - limit % block_align).max(block_align);
    let mut chunks = Vec::new();
    let mut left = len;
    while left > 0 {
        let chunk = left.min(limit);
        chunks.push(chunk);
        left -= chunk;
    }
    chunks
}

fn check_window(state: &AudioState, begin: Time, end: Time) -> Result<()> {
    let duration = state.duration();
    if begin.is_negative() || begin > end || end > duration {
        return Err(Error::OutOfBounds(format!(
            "window [{begin}, {end}) is outside [0, {duration}]"
        )));
    }
    Ok(())
}

fn check_insert_point(state: &AudioState, at: Time, duration: Time) -> Result<()> {
    let end = state.duration();
    if at.is_negative() || at > end {
        return Err(Error::OutOfBounds(format!(
            "insert point {at} is outside [0, {end}]"
        )));
    }
    if duration.is_negative() {
        return Err(Error::OutOfBounds(format!(
            "duration {duration} is negative"
        )));
    }
    Ok(())
}
