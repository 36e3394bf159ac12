// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Registry of data providers bound to one data directory.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, info, warn};

use crate::{
    DataProvider, Error, Result, Uid,
    provider::extension_for_mime_type,
    uid::{Keyed, ObjectKey, UidMap},
};

const UID_PREFIX: &str = "DP";

/// Shared state of a [`DataProviderRegistry`].
///
/// Providers keep a weak reference to it, so dropping the last registry
/// handle does not leak through the provider map.
pub(crate) struct RegistryContext {
    pub(crate) id: uuid::Uuid,
    base_dir: PathBuf,
    state: Mutex<RegistryState>,
}

struct RegistryState {
    /// Data directory, relative to `base_dir`.
    data_dir: PathBuf,
    providers: UidMap<DataProvider>,
}

impl RegistryContext {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Assigns uids to [`DataProvider`]s and owns the directory holding their files.
///
/// The registry is bound to a base location at construction; the data
/// directory is resolved relative to it and can later be moved with
/// [`Self::relocate`]. Handles are cheaply cloneable and `Send + Sync`.
///
/// Uid allocation is one critical section (generate, check, insert), so
/// concurrent [`Self::create_provider`] calls never collide. Structural changes
/// concurrent with [`Self::relocate`] or [`Self::collect_unused`] are
/// serialised by the same lock.
///
/// # Examples
///
/// ```no_run
/// use media_store::{DataProviderRegistry, mime};
///
/// # fn main() -> Result<(), media_store::Error> {
/// let registry = DataProviderRegistry::new("/tmp/doc", "Data");
/// let provider = registry.create_provider(mime::AUDIO_WAV)?;
/// let uid = registry.uid_of(&provider)?;
/// assert_eq!(registry.lookup(&uid)?, provider);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DataProviderRegistry {
    context: Arc<RegistryContext>,
}

impl DataProviderRegistry {
    /// Creates a registry storing its files in `base_dir/data_dir`.
    ///
    /// Nothing is created on disk until the first provider is.
    pub fn new(base_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            context: Arc::new(RegistryContext {
                id: uuid::Uuid::new_v4(),
                base_dir: base_dir.into(),
                state: Mutex::new(RegistryState {
                    data_dir: data_dir.into(),
                    providers: UidMap::new(UID_PREFIX),
                }),
            }),
        }
    }

    pub(crate) fn from_context(context: Arc<RegistryContext>) -> Self {
        Self { context }
    }

    /// Base location the data directory is resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.context.base_dir
    }

    /// Data directory relative to [`Self::base_dir`].
    pub fn data_directory(&self) -> PathBuf {
        self.context.lock().data_dir.clone()
    }

    /// Absolute data directory.
    pub fn data_directory_path(&self) -> PathBuf {
        self.context.base_dir.join(&self.context.lock().data_dir)
    }

    /// Creates an empty provider with a fresh uid and a fresh file.
    ///
    /// The file name is random and carries the extension registered for
    /// `mime_type` (see [`crate::provider::extension_for_mime_type`]).
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the empty file cannot be created; the registry is left
    /// unchanged in that case.
    pub fn create_provider(&self, mime_type: &str) -> Result<DataProvider> {
        let extension = extension_for_mime_type(mime_type);
        let mut state = self.context.lock();
        let data_dir = self.context.base_dir.join(&state.data_dir);
        let relative_path = loop {
            let candidate = PathBuf::from(format!("{}{}", uuid::Uuid::new_v4().simple(), extension));
            let taken = state
                .providers
                .values()
                .any(|provider| provider.relative_path() == candidate);
            if !taken && !data_dir.join(&candidate).exists() {
                break candidate;
            }
        };
        let path = data_dir.join(&relative_path);
        fs::create_dir_all(&data_dir).map_err(|err| Error::io(&data_dir, err))?;
        fs::File::create(&path).map_err(|err| Error::io(&path, err))?;

        let provider = DataProvider::new(&self.context, relative_path, mime_type, true);
        let uid = match state.providers.insert_new(provider.clone()) {
            Ok(uid) => uid,
            Err(err) => {
                drop(state);
                if let Err(cleanup) = fs::remove_file(&path) {
                    warn!("Failed to remove {}: {cleanup}", path.display());
                }
                return Err(err);
            }
        };
        debug!("Created data provider {uid} at {}", path.display());
        Ok(provider)
    }

    /// Registers `provider` under `uid`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOwner`] if the provider was created by another registry
    /// - [`Error::AlreadyManaged`] if the provider or the uid is already present
    pub fn register(&self, provider: &DataProvider, uid: Uid) -> Result<()> {
        self.check_owner(provider)?;
        self.context.lock().providers.insert(uid, provider.clone())
    }

    /// Returns the provider registered under `uid`.
    pub fn lookup(&self, uid: &Uid) -> Result<DataProvider> {
        self.context
            .lock()
            .providers
            .get(uid)
            .cloned()
            .ok_or_else(|| Error::UnknownId(uid.clone()))
    }

    /// Returns the uid `provider` is registered under.
    pub fn uid_of(&self, provider: &DataProvider) -> Result<Uid> {
        self.context
            .lock()
            .providers
            .uid_of(provider.key())
            .cloned()
            .ok_or_else(|| {
                Error::NotManagerOf(format!(
                    "data provider {} is not registered",
                    provider.relative_path().display()
                ))
            })
    }

    pub fn contains(&self, provider: &DataProvider) -> bool {
        self.context.lock().providers.contains_key(provider.key())
    }

    /// Detaches the provider registered under `uid`, deleting its file when
    /// `delete` is set.
    ///
    /// If the file cannot be deleted the provider stays registered.
    pub fn remove(&self, uid: &Uid, delete: bool) -> Result<DataProvider> {
        let mut state = self.context.lock();
        let provider = state
            .providers
            .get(uid)
            .cloned()
            .ok_or_else(|| Error::UnknownId(uid.clone()))?;
        if delete {
            let data_dir = self.context.base_dir.join(&state.data_dir);
            provider.delete_storage_at(Some(&data_dir))?;
        }
        state.providers.remove(uid);
        debug!("Removed data provider {uid} (delete: {delete})");
        Ok(provider)
    }

    /// Deletes the file of `provider` and detaches it, if it is still managed.
    pub(crate) fn delete_provider(&self, provider: &DataProvider) -> Result<()> {
        let mut state = self.context.lock();
        let data_dir = self.context.base_dir.join(&state.data_dir);
        provider.delete_storage_at(Some(&data_dir))?;
        if let Some((uid, _)) = state.providers.remove_key(provider.key()) {
            debug!("Deleted data provider {uid}");
        }
        Ok(())
    }

    /// All managed providers, ordered by uid.
    pub fn providers(&self) -> Vec<DataProvider> {
        self.context.lock().providers.values().cloned().collect()
    }

    /// All `(uid, provider)` pairs, ordered by uid.
    pub fn entries(&self) -> Vec<(Uid, DataProvider)> {
        self.context
            .lock()
            .providers
            .iter()
            .map(|(uid, provider)| (uid.clone(), provider.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.context.lock().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves the data directory to `new_dir` (relative to the base location).
    ///
    /// Every provider's file is copied into a staging directory next to the
    /// destination; only when all copies succeed is the staging directory moved
    /// into place and the registry switched over. On failure the staging
    /// directory is removed and the registry keeps its old directory.
    ///
    /// # Errors
    ///
    /// - [`Error::DirectoryConflict`] if the destination exists and
    ///   `overwrite_destination` is not set, or if the two directories nest
    /// - [`Error::ResourceMissing`] if a provider's file is absent (every
    ///   provider is attempted; each failure is logged and the first reported)
    /// - [`Error::Io`] for any other filesystem failure
    ///
    /// A failure to remove the old directory is reported after the relocation
    /// itself has taken effect.
    pub fn relocate(
        &self,
        new_dir: impl Into<PathBuf>,
        delete_source: bool,
        overwrite_destination: bool,
    ) -> Result<()> {
        let new_dir = new_dir.into();
        let mut state = self.context.lock();
        let source = self.context.base_dir.join(&state.data_dir);
        let destination = self.context.base_dir.join(&new_dir);
        if source == destination {
            return Ok(());
        }
        if source.starts_with(&destination) || destination.starts_with(&source) {
            return Err(Error::DirectoryConflict { path: destination });
        }
        if destination.exists() && !overwrite_destination {
            return Err(Error::DirectoryConflict { path: destination });
        }

        let staging = staging_dir_for(&destination);
        fs::create_dir_all(&staging).map_err(|err| Error::io(&staging, err))?;
        let mut failures = Vec::new();
        for (uid, provider) in state.providers.iter() {
            let from = source.join(provider.relative_path());
            let to = staging.join(provider.relative_path());
            if !from.exists() {
                if provider.is_initialized() {
                    warn!("Data file of provider {uid} is missing: {}", from.display());
                    failures.push(Error::ResourceMissing { path: from });
                }
                continue;
            }
            if let Err(err) = copy_file(&from, &to) {
                warn!("Failed to copy data file of provider {uid}: {err}");
                failures.push(err);
            }
        }

        if let Some(first) = failures.into_iter().next() {
            remove_dir_logged(&staging);
            return Err(first);
        }

        if destination.exists() {
            if let Err(err) = fs::remove_dir_all(&destination) {
                remove_dir_logged(&staging);
                return Err(Error::io(&destination, err));
            }
        }
        if let Err(err) = fs::rename(&staging, &destination) {
            remove_dir_logged(&staging);
            return Err(Error::io(&destination, err));
        }

        let old_dir = std::mem::replace(&mut state.data_dir, new_dir);
        drop(state);
        info!(
            "Relocated data directory from {} to {}",
            old_dir.display(),
            destination.display()
        );

        if delete_source && source.exists() {
            fs::remove_dir_all(&source).map_err(|err| Error::io(&source, err))?;
        }
        Ok(())
    }

    /// Removes every provider that is not in `referenced`, deleting its file
    /// when `delete` is set. Returns the uids that were removed.
    ///
    /// # Errors
    ///
    /// Every unused provider is attempted. One whose file cannot be deleted
    /// stays registered, and the first such failure is returned after the
    /// others have been collected.
    pub fn collect_unused<'a>(
        &self,
        referenced: impl IntoIterator<Item = &'a DataProvider>,
        delete: bool,
    ) -> Result<Vec<Uid>> {
        let keep: HashSet<ObjectKey> = referenced.into_iter().map(Keyed::key).collect();
        let mut state = self.context.lock();
        let unused: Vec<Uid> = state
            .providers
            .iter()
            .filter(|(_, provider)| !keep.contains(&provider.key()))
            .map(|(uid, _)| uid.clone())
            .collect();
        let data_dir = self.context.base_dir.join(&state.data_dir);
        let mut collected = Vec::with_capacity(unused.len());
        let mut first_error = None;
        for uid in unused {
            if delete {
                if let Some(provider) = state.providers.get(&uid) {
                    if let Err(err) = provider.delete_storage_at(Some(&data_dir)) {
                        warn!("Keeping unused data provider {uid}: {err}");
                        first_error.get_or_insert(err);
                        continue;
                    }
                }
            }
            state.providers.remove(&uid);
            collected.push(uid);
        }
        if !collected.is_empty() {
            info!("Collected {} unused data provider(s)", collected.len());
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(collected),
        }
    }

    /// Recreates a provider read from a persisted document.
    pub(crate) fn restore_provider(
        &self,
        uid: Uid,
        relative_path: PathBuf,
        mime_type: &str,
    ) -> Result<DataProvider> {
        let initialized = self.data_directory_path().join(&relative_path).exists();
        let provider = DataProvider::new(&self.context, relative_path, mime_type, initialized);
        self.context.lock().providers.insert(uid, provider.clone())?;
        Ok(provider)
    }

    fn check_owner(&self, provider: &DataProvider) -> Result<()> {
        if provider.registry_id() != self.context.id {
            return Err(Error::NotOwner(format!(
                "data provider {} belongs to another registry",
                provider.relative_path().display()
            )));
        }
        Ok(())
    }
}

fn staging_dir_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = destination.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!(".{name}.relocating-{}", uuid::Uuid::new_v4().simple()))
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
    }
    fs::copy(from, to).map_err(|err| Error::from_io(from, err))?;
    Ok(())
}

fn remove_dir_logged(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        tracing::error!("Failed to remove {}: {err}", path.display());
    }
}
