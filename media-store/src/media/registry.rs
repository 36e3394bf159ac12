// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Registry of media data with optional single PCM format enforcement.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::{
    AudioMediaData, DataProvider, DataProviderRegistry, Error, MediaData, MediaDataKind,
    PcmFormat, Result, Uid,
    media::audio::PcmClip,
    uid::{Keyed, ObjectKey, UidMap},
};

const UID_PREFIX: &str = "MD";

/// Shared state of a [`MediaDataRegistry`]. Media data keep a weak reference.
pub(crate) struct MediaRegistryContext {
    pub(crate) id: uuid::Uuid,
    providers: DataProviderRegistry,
    state: Mutex<MediaRegistryState>,
}

pub(crate) struct MediaRegistryState {
    media: UidMap<MediaData>,
    default_format: PcmFormat,
    enforce_single_format: bool,
}

impl MediaRegistryContext {
    /// Locks the registry state.
    ///
    /// Lock order: the registry lock is always taken before any audio lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, MediaRegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MediaRegistryState {
    /// Fails if `key` is managed here and `format` breaks the enforced format.
    pub(crate) fn check_member_format(&self, key: ObjectKey, format: &PcmFormat) -> Result<()> {
        if self.enforce_single_format
            && self.media.contains_key(key)
            && *format != self.default_format
        {
            return Err(Error::FormatConflict(format!(
                "{format} differs from the enforced format {}",
                self.default_format
            )));
        }
        Ok(())
    }

    fn check_new_format(&self, format: &PcmFormat) -> Result<()> {
        if self.enforce_single_format && *format != self.default_format {
            return Err(Error::FormatConflict(format!(
                "{format} differs from the enforced format {}",
                self.default_format
            )));
        }
        Ok(())
    }

    /// First managed audio whose format differs from `format`.
    fn first_mismatch(&self, format: &PcmFormat) -> Option<(Uid, PcmFormat)> {
        self.media.iter().find_map(|(uid, data)| {
            data.pcm_format()
                .filter(|own| own != format)
                .map(|own| (uid.clone(), own))
        })
    }
}

/// Assigns uids to [`MediaData`] and optionally enforces one PCM format for
/// all managed audio.
///
/// The registry is bound at construction to the [`DataProviderRegistry`] its
/// audio stores bytes in. Handles are cheaply cloneable and `Send + Sync`.
///
/// When enforcement is on, every operation that would leave a managed audio
/// data with a format other than the default fails with
/// [`Error::FormatConflict`] and changes nothing.
///
/// # Examples
///
/// ```no_run
/// use media_store::{DataProviderRegistry, MediaDataRegistry, PcmFormat};
///
/// # fn main() -> Result<(), media_store::Error> {
/// let providers = DataProviderRegistry::new("/tmp/doc", "Data");
/// let registry = MediaDataRegistry::new(providers, PcmFormat::new(2, 16, 48000)?);
/// registry.set_enforce_single_pcm_format(true)?;
///
/// let audio = registry.create_audio()?;
/// assert!(audio.set_sample_rate(44100).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MediaDataRegistry {
    context: Arc<MediaRegistryContext>,
}

impl MediaDataRegistry {
    /// Creates an empty registry storing audio bytes in `providers`.
    pub fn new(providers: DataProviderRegistry, default_format: PcmFormat) -> Self {
        Self {
            context: Arc::new(MediaRegistryContext {
                id: uuid::Uuid::new_v4(),
                providers,
                state: Mutex::new(MediaRegistryState {
                    media: UidMap::new(UID_PREFIX),
                    default_format,
                    enforce_single_format: false,
                }),
            }),
        }
    }

    pub(crate) fn from_context(context: Arc<MediaRegistryContext>) -> Self {
        Self { context }
    }

    /// The provider registry backing this registry's audio.
    pub fn data_provider_registry(&self) -> &DataProviderRegistry {
        &self.context.providers
    }

    /// Creates and registers a new, empty media data of `kind`.
    pub fn create(&self, kind: MediaDataKind) -> Result<MediaData> {
        match kind {
            MediaDataKind::Audio => self.create_audio().map(MediaData::Audio),
        }
    }

    /// Creates and registers empty audio in the default format.
    pub fn create_audio(&self) -> Result<Arc<AudioMediaData>> {
        let format = self.default_pcm_format();
        self.create_audio_with_format(format)
    }

    /// Creates and registers empty audio in `format`.
    ///
    /// # Errors
    ///
    /// [`Error::FormatConflict`] if enforcement is on and `format` is not the
    /// default format.
    pub fn create_audio_with_format(&self, format: PcmFormat) -> Result<Arc<AudioMediaData>> {
        let audio = Arc::new(AudioMediaData::new(
            &self.context,
            self.context.providers.clone(),
            format,
        ));
        let mut state = self.context.lock();
        state.check_new_format(&format)?;
        let uid = state.media.insert_new(MediaData::Audio(Arc::clone(&audio)))?;
        debug!("Created audio media data {uid} ({format})");
        Ok(audio)
    }

    /// Registers `data` under `uid`, or under a fresh uid when `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOwner`] if `data` was created by another registry
    /// - [`Error::AlreadyManaged`] if `data` or `uid` is already present
    /// - [`Error::FormatConflict`] if enforcement is on and `data` is audio in
    ///   another format; `data` is not registered
    pub fn add(&self, data: &MediaData, uid: Option<Uid>) -> Result<Uid> {
        if data.registry_id() != self.context.id {
            return Err(Error::NotOwner(
                "media data belongs to another registry".to_string(),
            ));
        }
        let mut state = self.context.lock();
        if let Some(format) = data.pcm_format() {
            state.check_new_format(&format)?;
        }
        match uid {
            Some(uid) => {
                state.media.insert(uid.clone(), data.clone())?;
                Ok(uid)
            }
            None => state.media.insert_new(data.clone()),
        }
    }

    /// Returns the media data registered under `uid`.
    pub fn lookup(&self, uid: &Uid) -> Result<MediaData> {
        self.context
            .lock()
            .media
            .get(uid)
            .cloned()
            .ok_or_else(|| Error::UnknownId(uid.clone()))
    }

    /// Returns the audio registered under `uid`.
    pub fn lookup_audio(&self, uid: &Uid) -> Result<Arc<AudioMediaData>> {
        self.lookup(uid)?
            .as_audio()
            .cloned()
            .ok_or_else(|| Error::UnknownId(uid.clone()))
    }

    /// Returns the uid `data` is registered under.
    pub fn uid_of(&self, data: &MediaData) -> Result<Uid> {
        self.uid_of_key(data.key())
    }

    pub(crate) fn uid_of_key(&self, key: ObjectKey) -> Result<Uid> {
        self.context
            .lock()
            .media
            .uid_of(key)
            .cloned()
            .ok_or_else(|| Error::NotManagerOf("media data is not registered".to_string()))
    }

    /// Detaches the media data registered under `uid` without touching its
    /// providers. Use [`MediaData::delete`] to release them as well.
    pub fn remove(&self, uid: &Uid) -> Result<MediaData> {
        let removed = self
            .context
            .lock()
            .media
            .remove(uid)
            .ok_or_else(|| Error::UnknownId(uid.clone()))?;
        debug!("Removed media data {uid}");
        Ok(removed)
    }

    /// Deep copy of the media data registered under `uid`.
    pub fn copy(&self, uid: &Uid) -> Result<MediaData> {
        self.lookup(uid)?.copy()
    }

    pub(crate) fn detach(&self, key: ObjectKey) -> Option<Uid> {
        let removed = self.context.lock().media.remove_key(key).map(|(uid, _)| uid);
        if let Some(uid) = &removed {
            debug!("Detached media data {uid}");
        }
        removed
    }

    /// All managed media data, ordered by uid.
    pub fn media_data(&self) -> Vec<MediaData> {
        self.context.lock().media.values().cloned().collect()
    }

    /// All `(uid, media data)` pairs, ordered by uid.
    pub fn entries(&self) -> Vec<(Uid, MediaData)> {
        self.context
            .lock()
            .media
            .iter()
            .map(|(uid, data)| (uid.clone(), data.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.context.lock().media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every provider referenced by managed media data.
    pub fn used_providers(&self) -> Vec<DataProvider> {
        self.media_data()
            .iter()
            .flat_map(MediaData::used_providers)
            .collect()
    }

    pub fn default_pcm_format(&self) -> PcmFormat {
        self.context.lock().default_format
    }

    /// Replaces the default format.
    ///
    /// # Errors
    ///
    /// [`Error::FormatConflict`] if enforcement is on and some managed audio
    /// is in another format; the default is left unchanged.
    pub fn set_default_pcm_format(&self, format: PcmFormat) -> Result<()> {
        let mut state = self.context.lock();
        if state.enforce_single_format {
            if let Some((uid, own)) = state.first_mismatch(&format) {
                return Err(Error::FormatConflict(format!(
                    "media data {uid} is {own}, cannot enforce {format}"
                )));
            }
        }
        state.default_format = format;
        info!("Default PCM format set to {format}");
        Ok(())
    }

    pub fn enforces_single_pcm_format(&self) -> bool {
        self.context.lock().enforce_single_format
    }

    /// Turns single-format enforcement on or off.
    ///
    /// # Errors
    ///
    /// [`Error::FormatConflict`] when enabling while some managed audio differs
    /// from the default format; enforcement stays off.
    pub fn set_enforce_single_pcm_format(&self, enforce: bool) -> Result<()> {
        let mut state = self.context.lock();
        if enforce && !state.enforce_single_format {
            let default = state.default_format;
            if let Some((uid, own)) = state.first_mismatch(&default) {
                return Err(Error::FormatConflict(format!(
                    "media data {uid} is {own}, cannot enforce {default}"
                )));
            }
        }
        state.enforce_single_format = enforce;
        Ok(())
    }

    /// Registers audio rebuilt from a persisted document.
    pub(crate) fn restore_audio(
        &self,
        uid: Uid,
        name: String,
        format: PcmFormat,
        clips: Vec<PcmClip>,
    ) -> Result<Arc<AudioMediaData>> {
        let audio = Arc::new(AudioMediaData::restore(
            &self.context,
            self.context.providers.clone(),
            name,
            format,
            clips,
        ));
        let mut state = self.context.lock();
        state.check_new_format(&format)?;
        state.media.insert(uid, MediaData::Audio(Arc::clone(&audio)))?;
        Ok(audio)
    }
}
