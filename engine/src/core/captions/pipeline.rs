//! Caption Pipeline
//!
//! Orchestrates segment → align → style → optimize for one narration and
//! reports how the timing was obtained.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::aligner::{AlignmentError, AlignmentMethod, ForcedAligner, TimestampAligner};
use super::metrics::GlyphMetrics;
use super::models::{CaptionSegment, Position, StyleBook, StyleProfile, TimestampHint};
use super::optimizer::optimize;
use super::segmenter::{LineLimits, TextSegmenter};
use crate::core::settings::CaptionSettings;
use crate::core::{CaptionError, CaptionResult, LanguageCode, StyleId, TimeSec};

/// Longest accepted title, in characters
pub const MAX_TITLE_CHARS: usize = 8;

// =============================================================================
// Request / Outcome
// =============================================================================

/// Input for one caption run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionRequest {
    pub text: String,
    /// Narration length in seconds
    pub total_duration: TimeSec,
    #[serde(default)]
    pub language: LanguageCode,
    #[serde(default)]
    pub audio_file: Option<PathBuf>,
    #[serde(default)]
    pub provider_timestamps: Option<Vec<TimestampHint>>,
    #[serde(default)]
    pub style_id: StyleId,
}

impl CaptionRequest {
    pub fn new(text: impl Into<String>, total_duration: TimeSec) -> Self {
        Self {
            text: text.into(),
            total_duration,
            language: LanguageCode::default(),
            audio_file: None,
            provider_timestamps: None,
            style_id: StyleId::main(),
        }
    }

    pub fn with_language(mut self, language: LanguageCode) -> Self {
        self.language = language;
        self
    }

    pub fn with_audio(mut self, audio_file: impl Into<PathBuf>) -> Self {
        self.audio_file = Some(audio_file.into());
        self
    }

    pub fn with_provider_timestamps(mut self, hints: Vec<TimestampHint>) -> Self {
        self.provider_timestamps = Some(hints);
        self
    }

    pub fn with_style(mut self, style_id: impl Into<StyleId>) -> Self {
        self.style_id = style_id.into();
        self
    }
}

/// Summary figures for a segment list
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionStats {
    pub segment_count: usize,
    pub total_characters: usize,
    /// Sum of segment durations
    pub total_duration: TimeSec,
    pub avg_chars_per_segment: f64,
    pub avg_duration: TimeSec,
    pub chars_per_second: f64,
    pub avg_confidence: f64,
}

impl CaptionStats {
    pub fn from_segments(segments: &[CaptionSegment]) -> Self {
        if segments.is_empty() {
            return Self::default();
        }

        let count = segments.len();
        let total_characters: usize = segments.iter().map(CaptionSegment::char_count).sum();
        let total_duration: TimeSec = segments.iter().map(|s| s.duration).sum();
        let total_confidence: f64 = segments.iter().map(|s| s.confidence).sum();

        Self {
            segment_count: count,
            total_characters,
            total_duration,
            avg_chars_per_segment: total_characters as f64 / count as f64,
            avg_duration: total_duration / count as f64,
            chars_per_second: if total_duration > 0.0 {
                total_characters as f64 / total_duration
            } else {
                0.0
            },
            avg_confidence: total_confidence / count as f64,
        }
    }
}

/// Result of [`CaptionPipeline::process`]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionOutcome {
    pub segments: Vec<CaptionSegment>,
    pub method: AlignmentMethod,
    pub confidence_score: f64,
    pub processing_time_ms: u64,
    /// RFC 3339 completion time
    pub generated_at: String,
    pub stats: CaptionStats,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs one narration at a time through segmentation, alignment and timing repair
pub struct CaptionPipeline {
    segmenter: TextSegmenter,
    aligner: TimestampAligner,
    limits: LineLimits,
    min_gap: TimeSec,
    styles: StyleBook,
}

impl CaptionPipeline {
    pub fn new(
        segmenter: TextSegmenter,
        aligner: TimestampAligner,
        limits: LineLimits,
        min_gap: TimeSec,
        styles: StyleBook,
    ) -> Self {
        Self {
            segmenter,
            aligner,
            limits,
            min_gap,
            styles,
        }
    }

    /// Builds a pipeline with its own glyph metrics cache
    pub fn from_settings(settings: &CaptionSettings) -> Self {
        let metrics = Arc::new(GlyphMetrics::new(
            settings.fonts.candidates.clone(),
            settings.fonts.outline_width_px,
        ));
        Self::with_metrics(settings, metrics)
    }

    /// Builds a pipeline that shares `metrics` with other pipelines
    pub fn with_metrics(settings: &CaptionSettings, metrics: Arc<GlyphMetrics>) -> Self {
        Self::new(
            TextSegmenter::new(metrics),
            TimestampAligner::new(settings.aligner_config()),
            settings.line_limits(),
            settings.timing.min_gap,
            settings.style_book(),
        )
    }

    /// Attaches a forced-alignment backend
    pub fn with_forced_aligner(mut self, aligner: Box<dyn ForcedAligner>) -> Self {
        self.aligner = self.aligner.with_forced_aligner(aligner);
        self
    }

    pub fn styles(&self) -> &StyleBook {
        &self.styles
    }

    pub fn limits(&self) -> LineLimits {
        self.limits
    }

    pub fn load_models(&mut self) -> Result<(), AlignmentError> {
        self.aligner.load_models()
    }

    pub fn cleanup_models(&mut self) {
        self.aligner.cleanup_models();
    }

    /// Produces final, timing-valid captions for `request`
    pub fn process(&mut self, request: &CaptionRequest) -> CaptionResult<CaptionOutcome> {
        if !request.total_duration.is_finite() || request.total_duration <= 0.0 {
            return Err(CaptionError::InvalidInput(format!(
                "total duration must be positive, got {}",
                request.total_duration
            )));
        }

        let started = Instant::now();

        let lines = self
            .segmenter
            .segment(&request.text, request.language, self.limits);

        let alignment = self.aligner.align(
            &lines,
            request.total_duration,
            request.audio_file.as_deref(),
            request.provider_timestamps.as_deref(),
            request.language,
        );

        let style = self.styles.get(&request.style_id);
        let styled: Vec<CaptionSegment> = alignment
            .segments
            .into_iter()
            .map(|segment| segment.with_style(style))
            .collect();

        let min_duration = self.aligner.config().min_duration;
        let segments = optimize(styled, min_duration, self.min_gap);
        let stats = CaptionStats::from_segments(&segments);
        let processing_time_ms = started.elapsed().as_millis() as u64;

        info!(
            segments = segments.len(),
            method = %alignment.method,
            confidence = alignment.confidence_score,
            elapsed_ms = processing_time_ms,
            "Generated captions"
        );

        Ok(CaptionOutcome {
            segments,
            method: alignment.method,
            confidence_score: alignment.confidence_score,
            processing_time_ms,
            generated_at: chrono::Utc::now().to_rfc3339(),
            stats,
        })
    }

    /// Title caption in this pipeline's `title` style
    pub fn title_caption(
        &self,
        title: &str,
        start: TimeSec,
        duration: TimeSec,
    ) -> CaptionResult<CaptionSegment> {
        build_title(title, start, duration, self.styles.get(&StyleId::title()))
    }
}

impl std::fmt::Debug for CaptionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionPipeline")
            .field("aligner", &self.aligner)
            .field("limits", &self.limits)
            .field("min_gap", &self.min_gap)
            .finish()
    }
}

// =============================================================================
// Title Captions
// =============================================================================

/// Single centered caption in the built-in `title` style
pub fn title_caption(title: &str, start: TimeSec, duration: TimeSec) -> CaptionResult<CaptionSegment> {
    build_title(title, start, duration, &StyleProfile::title())
}

fn build_title(
    title: &str,
    start: TimeSec,
    duration: TimeSec,
    style: &StyleProfile,
) -> CaptionResult<CaptionSegment> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CaptionError::InvalidTitle("title is empty".to_string()));
    }
    let chars = title.chars().count();
    if chars > MAX_TITLE_CHARS {
        return Err(CaptionError::InvalidTitle(format!(
            "'{}' has {} characters, at most {} allowed",
            title, chars, MAX_TITLE_CHARS
        )));
    }
    if !start.is_finite() || start < 0.0 || !duration.is_finite() || duration <= 0.0 {
        return Err(CaptionError::InvalidInput(format!(
            "invalid title window {}+{}s",
            start, duration
        )));
    }

    let mut segment = CaptionSegment::new(title, start, start + duration).with_style(style);
    segment.position = Position::Center;
    Ok(segment)
}
