// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The owning context of both registries.
//!
//! A [`Presentation`] fixes the base location all relative storage paths are
//! resolved against and builds its registries already bound to it, so a
//! registry can never be used before it knows where its files live.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    DataProviderRegistry, Error, MediaDataRegistry, Result, Uid, config::PresentationConfig,
    persist,
};

/// Storage context holding a [`DataProviderRegistry`] and a
/// [`MediaDataRegistry`] rooted at one directory.
///
/// # Examples
///
/// ```no_run
/// use media_store::{Presentation, Time};
///
/// # fn main() -> Result<(), media_store::Error> {
/// let presentation = Presentation::new("/tmp/doc");
/// let audio = presentation.media_data_registry().create_audio()?;
/// audio.append(vec![0u8; 8820].as_slice(), Time::from_millis(100))?;
///
/// let document = presentation.save("project.xml")?;
/// let reopened = Presentation::open(&document)?;
/// assert_eq!(reopened.media_data_registry().len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Presentation {
    root: PathBuf,
    providers: DataProviderRegistry,
    media: MediaDataRegistry,
}

impl Presentation {
    /// Creates an empty presentation rooted at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let config = PresentationConfig::default();
        let providers = DataProviderRegistry::new(root.clone(), config.data_directory);
        let media = MediaDataRegistry::new(providers.clone(), config.default_pcm_format);
        Self {
            root,
            providers,
            media,
        }
    }

    /// Creates an empty presentation rooted at `root` using `config`.
    pub fn with_config(root: impl Into<PathBuf>, config: &PresentationConfig) -> Result<Self> {
        let root = root.into();
        let providers = DataProviderRegistry::new(root.clone(), &config.data_directory);
        let media = MediaDataRegistry::new(providers.clone(), config.default_pcm_format);
        media.set_enforce_single_pcm_format(config.enforce_single_pcm_format)?;
        Ok(Self {
            root,
            providers,
            media,
        })
    }

    pub(crate) fn from_parts(
        root: PathBuf,
        providers: DataProviderRegistry,
        media: MediaDataRegistry,
    ) -> Self {
        Self {
            root,
            providers,
            media,
        }
    }

    /// Base location of the presentation.
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn data_provider_registry(&self) -> &DataProviderRegistry {
        &self.providers
    }

    pub fn media_data_registry(&self) -> &MediaDataRegistry {
        &self.media
    }

    /// Removes every provider not referenced by some managed media data.
    pub fn collect_unused_providers(&self, delete: bool) -> Result<Vec<Uid>> {
        let used = self.media.used_providers();
        self.providers.collect_unused(&used, delete)
    }

    /// Writes the presentation document to `file_name` inside the root
    /// directory and returns its path.
    ///
    /// The document is written to a temporary file first and renamed into
    /// place, so a failed save never leaves a truncated document behind.
    pub fn save(&self, file_name: impl AsRef<Path>) -> Result<PathBuf> {
        let file_name = file_name.as_ref();
        if file_name.components().count() != 1 {
            return Err(Error::OutOfBounds(format!(
                "document name {} must be a plain file name",
                file_name.display()
            )));
        }
        let document = self.root.join(file_name);
        let temp = self
            .root
            .join(format!(".{}.{}.tmp", file_name.display(), uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&self.root).map_err(|err| Error::io(&self.root, err))?;

        let written = fs::File::create(&temp)
            .map_err(|err| Error::io(&temp, err))
            .and_then(|file| {
                let mut writer = std::io::BufWriter::new(file);
                persist::write_document(self, &mut writer)?;
                writer.flush().map_err(|err| Error::io(&temp, err))?;
                Ok(())
            })
            .and_then(|()| fs::rename(&temp, &document).map_err(|err| Error::io(&document, err)));
        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_file(&temp) {
                warn!("Failed to remove {}: {cleanup}", temp.display());
            }
            return Err(err);
        }
        info!("Saved presentation to {}", document.display());
        Ok(document)
    }

    /// Loads a presentation document; its directory becomes the root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file = fs::File::open(path).map_err(|err| Error::from_io(path, err))?;
        let presentation = persist::read_document(root, std::io::BufReader::new(file))?;
        info!(
            "Opened presentation {} ({} provider(s), {} media data)",
            path.display(),
            presentation.providers.len(),
            presentation.media.len()
        );
        Ok(presentation)
    }
}
