//! CaptionForge Core Engine
//!
//! Handles caption segmentation, timing, subtitle interchange, settings and
//! FFmpeg-backed rendering.

pub mod captions;
pub mod ffmpeg;
pub mod process;
pub mod render;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests_pipeline;
