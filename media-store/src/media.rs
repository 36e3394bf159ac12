// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Stored media content.
//!
//! [`MediaData`] is the registry-facing view of a content object: a tagged
//! handle over the concrete kinds. The only kind stored today is PCM audio
//! ([`AudioMediaData`]), whose raw bytes live in data providers.
//!
//! # Key Types
//!
//! - [`MediaData`]: Handle to any registered content object
//! - [`AudioMediaData`]: Time-indexed PCM audio
//! - [`AudioStream`]: Byte stream over a time window of audio
//! - [`MediaDataRegistry`]: Assigns uids and enforces the single PCM format rule

pub mod audio;
pub mod registry;
pub mod stream;

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    AudioMediaData, DataProvider, Error, PcmFormat, Result, Uid,
    uid::{Keyed, ObjectKey},
};
pub use registry::MediaDataRegistry;

/// Kind of content a [`MediaData`] holds, used by [`MediaDataRegistry::create`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaDataKind {
    /// Raw PCM audio.
    #[serde(rename = "audio")]
    Audio,
}

impl fmt::Display for MediaDataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaDataKind::Audio => f.write_str("audio"),
        }
    }
}

impl FromStr for MediaDataKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "audio" => Ok(Self::Audio),
            other => Err(Error::Parse(format!("unknown media data kind \"{other}\""))),
        }
    }
}

/// Handle to a content object managed by a [`MediaDataRegistry`].
///
/// Cloning the handle does not copy the content; use [`Self::copy`] for that.
#[derive(Clone, Debug)]
pub enum MediaData {
    Audio(Arc<AudioMediaData>),
}

impl MediaData {
    pub fn kind(&self) -> MediaDataKind {
        match self {
            MediaData::Audio(_) => MediaDataKind::Audio,
        }
    }

    pub fn as_audio(&self) -> Option<&Arc<AudioMediaData>> {
        match self {
            MediaData::Audio(audio) => Some(audio),
        }
    }

    pub fn name(&self) -> String {
        match self {
            MediaData::Audio(audio) => audio.name(),
        }
    }

    /// PCM format of audio content, `None` for other kinds.
    pub fn pcm_format(&self) -> Option<PcmFormat> {
        match self {
            MediaData::Audio(audio) => Some(audio.pcm_format()),
        }
    }

    /// The uid this object is registered under.
    pub fn uid(&self) -> Result<Uid> {
        match self {
            MediaData::Audio(audio) => audio.uid(),
        }
    }

    /// Providers holding this object's bytes, without duplicates.
    pub fn used_providers(&self) -> Vec<DataProvider> {
        match self {
            MediaData::Audio(audio) => audio.used_providers(),
        }
    }

    /// Deep copy registered in the same registry.
    pub fn copy(&self) -> Result<MediaData> {
        match self {
            MediaData::Audio(audio) => audio.copy().map(MediaData::Audio),
        }
    }

    /// Deep copy registered in `destination`.
    pub fn export(&self, destination: &MediaDataRegistry) -> Result<MediaData> {
        match self {
            MediaData::Audio(audio) => audio.export(destination).map(MediaData::Audio),
        }
    }

    /// Detaches from the registry and releases all providers.
    pub fn delete(&self) -> Result<()> {
        match self {
            MediaData::Audio(audio) => audio.delete(),
        }
    }

    pub(crate) fn registry_id(&self) -> uuid::Uuid {
        match self {
            MediaData::Audio(audio) => audio.registry_id(),
        }
    }
}

impl From<Arc<AudioMediaData>> for MediaData {
    fn from(audio: Arc<AudioMediaData>) -> Self {
        MediaData::Audio(audio)
    }
}

impl Keyed for MediaData {
    fn key(&self) -> ObjectKey {
        match self {
            MediaData::Audio(audio) => audio.key(),
        }
    }
}

impl PartialEq for MediaData {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MediaData {}
