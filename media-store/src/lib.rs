// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # Media Store
//!
//! Persistent, file-backed storage for the media of a document model, with
//! non-destructive, time-based editing of PCM audio.
//!
//! ## Overview
//!
//! Media bytes live in files under a per-presentation data directory. Every
//! file is owned by a [`DataProvider`]; audio content is an ordered list of
//! byte windows over such providers, so edits splice windows rather than
//! rewrite payloads.
//!
//! ### Key Concepts
//!
//! - **Presentation**: The owning context fixing the root directory ([`Presentation`])
//! - **Data provider**: One data file, addressed by a path relative to the data directory ([`DataProvider`])
//! - **Media data**: A media object whose content is stored in providers ([`MediaData`], [`AudioMediaData`])
//! - **Uid**: Registry-scoped identifier of a provider or media data ([`Uid`])
//! - **Time**: Signed duration in 100 ns ticks used to address audio ([`Time`])
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ Presentation │  (root directory, XML document)
//! └──────┬───────┘
//!        │
//!        ├─► DataProviderRegistry ──► DataProvider    (one RIFF/WAV file each)
//!        │              ▲
//!        └─► MediaDataRegistry ──► AudioMediaData ──► AudioStream
//!                                  (clips over providers)
//! ```
//!
//! ## Examples
//!
//! ### Recording and splitting audio
//!
//! ```no_run
//! use media_store::{Presentation, Time};
//!
//! # fn main() -> Result<(), media_store::Error> {
//! let presentation = Presentation::new("/tmp/book");
//! let registry = presentation.media_data_registry();
//!
//! // One second of 16-bit mono silence at 44.1 kHz
//! let audio = registry.create_audio()?;
//! audio.append(vec![0u8; 88200].as_slice(), Time::from_secs(1))?;
//!
//! let tail = audio.split(Time::from_millis(400))?;
//! assert_eq!(audio.duration(), Time::from_millis(400));
//! assert_eq!(tail.duration(), Time::from_millis(600));
//!
//! presentation.save("book.xml")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Moving the data directory
//!
//! ```no_run
//! use media_store::Presentation;
//!
//! # fn main() -> Result<(), media_store::Error> {
//! let presentation = Presentation::open("/tmp/book/book.xml")?;
//! presentation
//!     .data_provider_registry()
//!     .relocate("Media", true, false)?;
//! presentation.collect_unused_providers(true)?;
//! presentation.save("book.xml")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - Registries, providers and media data are `Send + Sync` and cheap to clone
//! - Each registry and each audio object serialises its own mutations
//! - An [`AudioStream`] is `Send` but reads provider files lazily; keep the
//!   providers alive while it is consumed

mod error;
mod media;
mod persist;
mod presentation;
mod provider;
mod time;
mod uid;

pub mod config;
pub mod pcm;

pub use config::PresentationConfig;
pub use error::{Error, Result};
pub use media::{
    MediaData, MediaDataKind, MediaDataRegistry, audio::AudioMediaData, stream::AudioStream,
};
pub use pcm::PcmFormat;
pub use presentation::Presentation;
pub use provider::{DataProvider, DataProviderRegistry, extension_for_mime_type, mime};
pub use time::{TICKS_PER_SECOND, Time};
pub use uid::Uid;
