//! Caption Generation Module
//!
//! Turns narration text into timed, styled caption segments.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────┐   ┌──────────────────┐   ┌───────────┐
//! │ raw text   │──▶│ TextSegmenter │──▶│ TimestampAligner │──▶│ optimize  │
//! └────────────┘   │ (GlyphMetrics)│   │ forced/provider/ │   └─────┬─────┘
//!                  └───────────────┘   │ proportional     │         │
//!                                      └──────────────────┘         ▼
//!                                                  ┌──────────────────────────┐
//!                                                  │ CaptionFormatter (files) │
//!                                                  │ CaptionRenderer (video)  │
//!                                                  └──────────────────────────┘
//! ```
//!
//! [`CaptionPipeline`] wires the first three stages together.

pub mod aligner;
pub mod audio;
pub mod formats;
pub mod metrics;
pub mod models;
pub mod optimizer;
pub mod pipeline;
pub mod segmenter;
pub mod whisper;

pub use aligner::{
    AlignerConfig, AlignmentError, AlignmentMethod, AlignmentResult, ForcedAligner,
    TimestampAligner,
};
pub use formats::{parse_captions, CaptionFormatter, FormatVariant, ParseError};
pub use metrics::{default_font_candidates, GlyphMetrics, MeasureGlyph};
pub use models::{
    BackgroundSpec, CaptionSegment, Color, FadeSpec, HorizontalAlign, Position, StyleBook,
    StyleProfile, TextLine, TimestampHint, WordTimestamp,
};
pub use optimizer::{optimize, validate_timing, TimingViolation};
pub use pipeline::{
    title_caption, CaptionOutcome, CaptionPipeline, CaptionRequest, CaptionStats,
    MAX_TITLE_CHARS,
};
pub use segmenter::{LineLimits, TextSegmenter};
pub use whisper::{WhisperAligner, WhisperAlignerOptions, WhisperModel};
