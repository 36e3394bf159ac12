// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Byte-addressable storage resources.
//!
//! A [`DataProvider`] is a handle to one file inside the data directory of the
//! [`DataProviderRegistry`] that created it. Handles are cheap to clone; all
//! clones refer to the same resource. The registry is the only place where
//! providers are created, so every provider carries a back-reference to it.
//!
//! # Key Types
//!
//! - [`DataProvider`]: Handle to one backing file
//! - [`DataProviderRegistry`]: Owns the data directory and the uid assignments

pub mod registry;

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{debug, trace};

use crate::{
    Error, Result, Uid,
    uid::{Keyed, ObjectKey},
};
use registry::RegistryContext;
pub use registry::DataProviderRegistry;

/// Well-known MIME types.
pub mod mime {
    pub const AUDIO_WAV: &str = "audio/x-wav";
    pub const AUDIO_MP3: &str = "audio/mpeg";
    pub const IMAGE_JPEG: &str = "image/jpeg";
    pub const IMAGE_PNG: &str = "image/png";
    pub const TEXT_XML: &str = "text/xml";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    (mime::AUDIO_WAV, ".wav"),
    ("audio/wav", ".wav"),
    (mime::AUDIO_MP3, ".mp3"),
    (mime::IMAGE_JPEG, ".jpg"),
    (mime::IMAGE_PNG, ".png"),
    (mime::TEXT_XML, ".xml"),
    ("application/xml", ".xml"),
];

/// Returns the file extension (with leading dot) used for `mime_type`.
///
/// Unknown types get `.bin`.
pub fn extension_for_mime_type(mime_type: &str) -> &'static str {
    MIME_EXTENSIONS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(mime_type))
        .map(|(_, extension)| *extension)
        .unwrap_or(".bin")
}

struct ProviderInner {
    key: ObjectKey,
    registry: Weak<RegistryContext>,
    registry_id: uuid::Uuid,
    relative_path: PathBuf,
    mime_type: String,
    /// Set once the backing file has been created; a missing file after that
    /// point is an error rather than a fresh start.
    initialized: AtomicBool,
}

/// Handle to one file-backed storage resource.
///
/// # Thread Safety
///
/// Handles are `Send + Sync`, but the streams they open are not coordinated:
/// callers must finish writing a provider before another stream is opened on
/// it.
///
/// # Examples
///
/// ```no_run
/// use std::io::{Read, Write};
/// use media_store::{DataProviderRegistry, mime};
///
/// # fn main() -> Result<(), media_store::Error> {
/// let registry = DataProviderRegistry::new("/tmp/doc", "Data");
/// let provider = registry.create_provider(mime::OCTET_STREAM)?;
/// provider.open_write()?.write_all(b"hello").unwrap();
///
/// let mut text = String::new();
/// provider.open_read()?.read_to_string(&mut text).unwrap();
/// assert_eq!(text, "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DataProvider {
    inner: Arc<ProviderInner>,
}

impl DataProvider {
    pub(crate) fn new(
        registry: &Arc<RegistryContext>,
        relative_path: PathBuf,
        mime_type: &str,
        initialized: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                key: uuid::Uuid::new_v4(),
                registry: Arc::downgrade(registry),
                registry_id: registry.id,
                relative_path,
                mime_type: mime_type.to_string(),
                initialized: AtomicBool::new(initialized),
            }),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.inner.mime_type
    }

    /// Path of the backing file relative to the registry's data directory.
    pub fn relative_path(&self) -> &Path {
        &self.inner.relative_path
    }

    /// The registry that created this provider.
    ///
    /// # Errors
    ///
    /// [`Error::Detached`] if the registry has been dropped.
    pub fn registry(&self) -> Result<DataProviderRegistry> {
        self.inner
            .registry
            .upgrade()
            .map(DataProviderRegistry::from_context)
            .ok_or(Error::Detached)
    }

    /// The uid this provider is registered under.
    pub fn uid(&self) -> Result<Uid> {
        self.registry()?.uid_of(self)
    }

    /// Absolute path of the backing file.
    pub fn path(&self) -> Result<PathBuf> {
        let registry = self.registry()?;
        Ok(registry.data_directory_path().join(&self.inner.relative_path))
    }

    /// Whether the backing file has been created.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Size of the backing file, zero if it was never created.
    pub fn len(&self) -> Result<u64> {
        let path = self.path()?;
        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.len()),
            Err(err) if err.kind() == io::ErrorKind::NotFound && !self.is_initialized() => Ok(0),
            Err(err) => Err(Error::from_io(path, err)),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Opens the backing file for reading.
    ///
    /// A provider that has never been written reads as empty.
    ///
    /// # Errors
    ///
    /// - [`Error::ResourceMissing`] if the file was created earlier but is gone
    /// - [`Error::Io`] for any other filesystem failure
    pub fn open_read(&self) -> Result<File> {
        let path = self.path()?;
        match File::open(&path) {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if self.is_initialized() {
                    return Err(Error::ResourceMissing { path });
                }
                self.create_empty(&path)?;
                File::open(&path).map_err(|err| Error::from_io(path, err))
            }
            Err(err) => Err(Error::io(path, err)),
        }
    }

    /// Opens the backing file for writing, creating it on first use.
    ///
    /// The stream starts at offset 0 and overwrites in place; it does not
    /// truncate existing content.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be created or opened.
    pub fn open_write(&self) -> Result<File> {
        let path = self.path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| Error::io(&path, err))?;
        self.inner.initialized.store(true, Ordering::Release);
        Ok(file)
    }

    /// Creates a new provider of the same MIME type in the same registry and
    /// copies every byte of this provider into it.
    pub fn duplicate(&self) -> Result<DataProvider> {
        let registry = self.registry()?;
        let copy = registry.create_provider(self.mime_type())?;
        if let Err(err) = self.copy_into(&copy) {
            if let Err(cleanup) = copy.delete() {
                tracing::error!("Failed to discard partial duplicate: {cleanup}");
            }
            return Err(err);
        }
        trace!(
            "Duplicated {} into {}",
            self.relative_path().display(),
            copy.relative_path().display()
        );
        Ok(copy)
    }

    /// Removes the backing file and detaches this provider from its registry.
    ///
    /// The handle must not be used afterwards.
    pub fn delete(&self) -> Result<()> {
        match self.inner.registry.upgrade() {
            Some(context) => DataProviderRegistry::from_context(context).delete_provider(self),
            None => self.delete_storage_at(None),
        }
    }

    /// Copies this provider's bytes into `target` from the current read
    /// position to the end of the stream.
    fn copy_into(&self, target: &DataProvider) -> Result<u64> {
        let path = self.path()?;
        let mut source = self.open_read()?;
        let mut sink = target.open_write()?;
        io::copy(&mut source, &mut sink).map_err(|err| Error::io(path, err))
    }

    fn create_empty(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }
        File::create(path).map_err(|err| Error::io(path, err))?;
        self.inner.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Removes the backing file from `data_dir` (or from the registry's current
    /// directory when `None`). A file that was never created is not an error.
    pub(crate) fn delete_storage_at(&self, data_dir: Option<&Path>) -> Result<()> {
        let path = match data_dir {
            Some(dir) => dir.join(&self.inner.relative_path),
            None => self.path()?,
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted data file {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(path, err)),
        }
    }

    pub(crate) fn registry_id(&self) -> uuid::Uuid {
        self.inner.registry_id
    }
}

impl Keyed for DataProvider {
    fn key(&self) -> ObjectKey {
        self.inner.key
    }
}

impl PartialEq for DataProvider {
    fn eq(&self, other: &Self) -> bool {
        self.inner.key == other.inner.key
    }
}

impl Eq for DataProvider {}

impl std::hash::Hash for DataProvider {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.key.hash(state);
    }
}

impl fmt::Debug for DataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProvider")
            .field("relative_path", &self.inner.relative_path)
            .field("mime_type", &self.inner.mime_type)
            .finish()
    }
}
