// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for media storage operations.
//!
//! Every fallible operation in this crate returns [`Result`]. Filesystem
//! failures keep the path that caused them and the original [`std::io::Error`]
//! as their source, so callers can report which resource broke.

use std::path::PathBuf;

use crate::uid::Uid;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when managing providers and media data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No object is registered under the given identifier.
    #[error("Unknown id: {0}")]
    UnknownId(Uid),

    /// The object or the identifier is already present in the registry.
    #[error("Already managed: {0}")]
    AlreadyManaged(String),

    /// The object was created by a different registry than the one invoked.
    #[error("Not owner: {0}")]
    NotOwner(String),

    /// The object is not registered in the registry invoked.
    #[error("Not manager of: {0}")]
    NotManagerOf(String),

    /// A time, index or numeric argument violates its allowed range.
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// A PCM format does not satisfy the single-format rule or the format of
    /// the data it is applied to.
    #[error("PCM format conflict: {0}")]
    FormatConflict(String),

    /// Backing storage that was expected to exist is absent.
    #[error("Resource missing: {}", path.display())]
    ResourceMissing {
        /// Path of the missing resource.
        path: PathBuf,
    },

    /// Backing storage exists but could not be accessed.
    #[error("IO failure on {}: {source}", path.display())]
    Io {
        /// Path of the resource being accessed.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// The source stream ended before the declared number of bytes was read.
    #[error("Short input: expected {expected} byte(s), got {actual}")]
    ShortInput {
        /// Byte count implied by the declared duration.
        expected: u64,
        /// Byte count actually available from the source.
        actual: u64,
    },

    /// The relocation destination exists and overwriting was not requested.
    #[error("Directory conflict: {}", path.display())]
    DirectoryConflict {
        /// Destination directory.
        path: PathBuf,
    },

    /// The registry owning this object has been dropped.
    #[error("Owning registry is gone")]
    Detached,

    /// Malformed XML in a persisted document.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed XML attribute in a persisted document.
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// A persisted value could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration document.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// A generic error for failures not covered by the variants above.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Wraps a filesystem error, mapping `NotFound` to [`Error::ResourceMissing`].
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::ResourceMissing { path }
        } else {
            Error::Io { path, source }
        }
    }

    /// Wraps a filesystem error as [`Error::Io`] regardless of its kind.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for Error {
    /// Stream errors that carry no path (e.g. XML writer output).
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
