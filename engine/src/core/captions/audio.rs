//! Alignment Audio Preparation
//!
//! Converts narration audio into the 16kHz mono PCM WAV that forced
//! alignment models expect, and reads it back as normalized samples.

use std::path::Path;
use std::process::Command;
use thiserror::Error;

use crate::core::process::configure_std_command;
use crate::core::TimeSec;

/// Sample rate required by the alignment models
pub const ALIGNMENT_SAMPLE_RATE: u32 = 16_000;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while preparing alignment audio
#[derive(Error, Debug)]
pub enum AudioPrepError {
    /// FFmpeg exited with a non-zero status
    #[error("FFmpeg audio conversion failed: {0}")]
    ConversionFailed(String),

    /// Input file not found
    #[error("Audio file not found: {0}")]
    InputNotFound(String),

    /// WAV header or sample data could not be read
    #[error("Failed to read WAV: {0}")]
    InvalidWav(String),

    /// WAV layout differs from 16kHz mono
    #[error("Unexpected WAV layout: {0}")]
    UnexpectedLayout(String),

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audio preparation
pub type AudioResult<T> = Result<T, AudioPrepError>;

// =============================================================================
// Conversion
// =============================================================================

/// Converts any audio (or video) file FFmpeg understands into 16kHz mono
/// 16-bit WAV at `output_path`.
pub fn prepare_alignment_audio(
    input_path: &Path,
    output_path: &Path,
    ffmpeg_path: &Path,
) -> AudioResult<()> {
    if !input_path.exists() {
        return Err(AudioPrepError::InputNotFound(
            input_path.to_string_lossy().to_string(),
        ));
    }

    let mut cmd = Command::new(ffmpeg_path);
    configure_std_command(&mut cmd);
    let output = cmd
        .arg("-y")
        .arg("-i")
        .arg(input_path)
        .args([
            "-vn",
            "-ar",
            "16000",
            "-ac",
            "1",
            "-c:a",
            "pcm_s16le",
        ])
        .arg(output_path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AudioPrepError::ConversionFailed(stderr.trim().to_string()));
    }

    Ok(())
}

// =============================================================================
// WAV Reading
// =============================================================================

/// Loads 16kHz mono WAV samples normalized to [-1.0, 1.0]
pub fn load_mono_samples(wav_path: &Path) -> AudioResult<Vec<f32>> {
    let reader =
        hound::WavReader::open(wav_path).map_err(|e| AudioPrepError::InvalidWav(e.to_string()))?;
    let spec = reader.spec();

    if spec.sample_rate != ALIGNMENT_SAMPLE_RATE {
        return Err(AudioPrepError::UnexpectedLayout(format!(
            "expected 16kHz sample rate, got {} Hz",
            spec.sample_rate
        )));
    }
    if spec.channels != 1 {
        return Err(AudioPrepError::UnexpectedLayout(format!(
            "expected mono audio, got {} channels",
            spec.channels
        )));
    }

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<_, _>>()
            .map_err(|e| AudioPrepError::InvalidWav(e.to_string()))?,
        (hound::SampleFormat::Int, 32) => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<Result<_, _>>()
            .map_err(|e| AudioPrepError::InvalidWav(e.to_string()))?,
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioPrepError::InvalidWav(e.to_string()))?,
        (format, bits) => {
            return Err(AudioPrepError::UnexpectedLayout(format!(
                "unsupported sample format {:?} at {} bits",
                format, bits
            )));
        }
    };

    Ok(samples)
}

/// Duration of any PCM WAV file, read from its header
pub fn wav_duration(wav_path: &Path) -> AudioResult<TimeSec> {
    let reader =
        hound::WavReader::open(wav_path).map_err(|e| AudioPrepError::InvalidWav(e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(AudioPrepError::InvalidWav("zero sample rate".to_string()));
    }
    // `duration()` counts frames, i.e. samples per channel.
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

// =============================================================================
// Tests
// =============================================================================
