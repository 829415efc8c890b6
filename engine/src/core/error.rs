//! CaptionForge Error Definitions
//!
//! Defines the crate-wide error type. Module-level errors convert into it.

use thiserror::Error;

use super::captions::ParseError;
use super::ffmpeg::FFmpegError;
use super::render::RenderError;
use super::settings::SettingsError;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CaptionError {
    // =========================================================================
    // Input Errors
    // =========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid title: {0}")]
    InvalidTitle(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    // =========================================================================
    // Subsystem Errors
    // =========================================================================
    #[error("Subtitle parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    FFmpeg(#[from] FFmpegError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations
pub type CaptionResult<T> = Result<T, CaptionError>;
