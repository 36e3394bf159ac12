// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use media_store::{PcmFormat, Presentation, Time};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// RAII guard for test directories.
///
/// Creates a unique directory under the system temp dir and removes it when
/// dropped.
pub struct TestDirGuard {
    dir: PathBuf,
}

impl TestDirGuard {
    /// Creates a new test directory with a unique UUID suffix.
    pub fn new(test: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "media_store_tests_{}_{}",
            test,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(dir.as_path()).unwrap_or_else(|_| {
            panic!("Failed to create test directory \"{}\".", dir.display())
        });
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for TestDirGuard {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_dir_all(self.dir.as_path()) {
            tracing::warn!(
                "Failed to remove test directory \"{}\": {error}",
                self.dir.display()
            );
        }
    }
}

pub fn init_logging() {
    // Respects RUST_LOG
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}

/// Initializes logging and creates an empty presentation in a fresh directory.
pub fn setup_test(test: &str) -> (Presentation, TestDirGuard) {
    init_logging();
    let guard = TestDirGuard::new(test);
    (Presentation::new(guard.path()), guard)
}

/// 16 bit mono at 44.1 kHz: 88200 bytes per second.
pub fn default_format() -> PcmFormat {
    PcmFormat::default()
}

/// `len` bytes of a recognisable, non-repeating-within-a-frame pattern.
pub fn pcm_pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i % 251) as u8).wrapping_add(seed))
        .collect()
}

/// Bytes of `duration` in the default format.
pub fn bytes_for(duration: Time) -> usize {
    default_format().bytes_for(duration) as usize
}
