//! Caption Burn-in Module
//!
//! Burns caption segments into a video with FFmpeg, either as batched
//! drawtext overlays or in one pass through the subtitles filter.

mod burn_in;
mod drawtext;

pub use burn_in::{
    CaptionRenderer, EncoderOptions, OverlayEngine, OverlayPass, RenderOptions, RenderSummary,
    VideoFilter,
};
pub use drawtext::{
    build_drawtext_filter, build_filter_chain, build_subtitles_filter, escape_filter_value,
    force_style, quote_filter_value, wrap_caption_text,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ffmpeg::FFmpegError;

/// How captions are burned into the video
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// One drawtext overlay per caption, in chained batches
    #[default]
    Overlay,
    /// Single pass through the subtitles filter from a temporary SRT file
    SubtitleFilter,
}

impl std::str::FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "overlay" | "drawtext" => Ok(RenderMode::Overlay),
            "subtitle_filter" | "subtitles" => Ok(RenderMode::SubtitleFilter),
            other => Err(format!("Unknown render mode: {}", other)),
        }
    }
}

/// Errors that abort a render. No output file is left behind.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Input video not found: {0}")]
    MissingInput(String),

    #[error("Render batch {batch}/{total} failed: {reason}")]
    BatchFailed {
        batch: usize,
        total: usize,
        reason: String,
    },

    #[error("Render IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    FFmpeg(#[from] FFmpegError),
}
