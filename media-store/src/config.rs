// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Presentation configuration.
//!
//! A [`PresentationConfig`] describes how a fresh [`crate::Presentation`] lays
//! out its storage. It is usually read from a small JSON document; every field
//! is optional and falls back to its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, PcmFormat, Result};

/// Default name of the data directory, relative to the presentation root.
pub const DEFAULT_DATA_DIRECTORY: &str = "Data";

/// Storage settings for a presentation.
///
/// # Examples
///
/// ```
/// use media_store::config::PresentationConfig;
///
/// let config = PresentationConfig::from_json_str(
///     r#"{
///         "data_directory": "Audio",
///         "default_pcm_format": {"channels": 2, "bit_depth": 16, "sample_rate": 48000},
///         "enforce_single_pcm_format": true
///     }"#,
/// )
/// .unwrap();
/// assert_eq!(config.data_directory, "Audio");
/// assert_eq!(config.default_pcm_format.sample_rate(), 48000);
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PresentationConfig {
    /// Data directory, relative to the presentation root.
    pub data_directory: String,
    /// Format given to new audio and enforced when enforcement is on.
    pub default_pcm_format: PcmFormat,
    /// Whether all audio must share `default_pcm_format`.
    pub enforce_single_pcm_format: bool,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            data_directory: DEFAULT_DATA_DIRECTORY.to_string(),
            default_pcm_format: PcmFormat::default(),
            enforce_single_pcm_format: false,
        }
    }
}

impl PresentationConfig {
    /// Parses a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| Error::from_io(path, err))?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        let dir = Path::new(&self.data_directory);
        if self.data_directory.is_empty() || dir.is_absolute() {
            return Err(Error::OutOfBounds(format!(
                "data directory \"{}\" must be a non-empty relative path",
                self.data_directory
            )));
        }
        Ok(())
    }
}
