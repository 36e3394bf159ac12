// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Records a test tone into a new presentation, splits it and saves the
//! document.
//!
//! ```text
//! cargo run --example split_audio -- --root /tmp/demo --length-ms 1000 --split-ms 400
//! ```

mod common;

use std::path::PathBuf;

use clap::Parser;
use media_store::{PcmFormat, Presentation, PresentationConfig, Time};
use tracing::info;

#[derive(Parser)]
#[command(version, about = "Split a generated tone into two audio media data")]
struct Args {
    /// Presentation root directory.
    #[arg(long)]
    root: PathBuf,

    /// Optional JSON configuration for the new presentation.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Length of the generated tone in milliseconds.
    #[arg(long, default_value_t = 1000)]
    length_ms: i64,

    /// Split point in milliseconds.
    #[arg(long, default_value_t = 400)]
    split_ms: i64,

    /// Tone frequency in Hz.
    #[arg(long, default_value_t = 440.0)]
    frequency: f64,

    /// Name of the saved document.
    #[arg(long, default_value = "presentation.xml")]
    document: String,
}

/// Interleaved little-endian sine samples at half scale.
fn tone(format: &PcmFormat, length: Time, frequency: f64) -> Vec<u8> {
    let frame_len = format.block_align() as usize;
    let frames = format.bytes_for(length) as usize / frame_len;
    let bytes_per_sample = usize::from(format.bit_depth() / 8);
    let mut pcm = Vec::with_capacity(frames * frame_len);
    for frame in 0..frames {
        let phase =
            frame as f64 * frequency * std::f64::consts::TAU / f64::from(format.sample_rate());
        let [low, high] = ((phase.sin() * f64::from(i16::MAX) * 0.5) as i16).to_le_bytes();
        for _ in 0..format.channels() {
            if bytes_per_sample == 1 {
                // 8 bit PCM is unsigned
                pcm.push(high ^ 0x80);
            } else {
                pcm.extend(std::iter::repeat_n(0, bytes_per_sample - 2));
                pcm.extend([low, high]);
            }
        }
    }
    pcm
}

fn main() -> Result<(), media_store::Error> {
    common::setup_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PresentationConfig::from_file(path)?,
        None => PresentationConfig::default(),
    };
    let presentation = Presentation::with_config(&args.root, &config)?;
    let registry = presentation.media_data_registry();

    let audio = registry.create_audio()?;
    audio.set_name("tone");
    let length = Time::from_millis(args.length_ms);
    let pcm = tone(&audio.pcm_format(), length, args.frequency);
    audio.append(pcm.as_slice(), length)?;
    info!("Recorded {} of {}", audio.duration(), audio.pcm_format());

    let tail = audio.split(Time::from_millis(args.split_ms))?;
    tail.set_name("tone (tail)");
    info!(
        "Split into {} ({}) and {} ({})",
        audio.uid()?,
        audio.duration(),
        tail.uid()?,
        tail.duration()
    );

    let document = presentation.save(&args.document)?;
    info!(
        "Saved {} with {} data file(s) in {}",
        document.display(),
        presentation.data_provider_registry().len(),
        presentation.data_provider_registry().data_directory_path().display()
    );
    Ok(())
}
