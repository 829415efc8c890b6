//! End-to-end caption pipeline tests
//!
//! Segment → align → optimize → format → parse across modules, without
//! touching FFmpeg.

use std::sync::Arc;

use tempfile::TempDir;

use super::captions::{
    parse_captions, validate_timing, AlignmentMethod, CaptionFormatter, CaptionPipeline,
    CaptionRequest, FormatVariant, GlyphMetrics, LineLimits, TextSegmenter, TimestampHint,
};
use super::settings::CaptionSettings;
use super::LanguageCode;

const NARRATION: &str = "你好。这是一个很长很长很长很长很长很长的句子，用于测试强制分割。";

fn pipeline(settings: &CaptionSettings) -> CaptionPipeline {
    CaptionPipeline::with_metrics(settings, Arc::new(GlyphMetrics::estimate_only(3)))
}

fn char_only_settings() -> CaptionSettings {
    let mut settings = CaptionSettings::default();
    settings.segmentation.enable_pixel_validation = false;
    settings
}

// =============================================================================
// Segmentation Properties
// =============================================================================

#[test]
fn test_segmentation_scenario_line_limits_and_concatenation() {
    let segmenter = TextSegmenter::new(Arc::new(GlyphMetrics::estimate_only(3)));
    let lines = segmenter.segment(NARRATION, LanguageCode::Zh, LineLimits::chars_only(10));

    assert!(lines.len() >= 4);
    assert!(lines.iter().all(|l| l.char_len() <= 10));
    let joined: String = lines.iter().map(|l| l.text()).collect();
    assert_eq!(joined, NARRATION);
}

#[test]
fn test_pixel_validation_tightens_lines() {
    // 0.8 * 48px per char + 6px outline; 10 chars would be 390px.
    let segmenter = TextSegmenter::new(Arc::new(GlyphMetrics::estimate_only(3)));
    let limits = LineLimits::new(10, 200, 48, true);
    let lines = segmenter.segment(NARRATION, LanguageCode::Zh, limits);

    let metrics = GlyphMetrics::estimate_only(3);
    assert!(lines
        .iter()
        .all(|l| l.char_len() == 1 || metrics.estimate(l.text(), 48) <= 200));
    let joined: String = lines.iter().map(|l| l.text()).collect();
    assert_eq!(joined, NARRATION);
}

// =============================================================================
// Full Chain
// =============================================================================

#[test]
fn test_full_chain_estimate_to_every_format() {
    let settings = char_only_settings();
    let mut pipeline = pipeline(&settings);
    let outcome = pipeline
        .process(&CaptionRequest::new(NARRATION, 9.0))
        .unwrap();

    assert_eq!(outcome.method, AlignmentMethod::ProportionalEstimate);
    assert!(outcome.segments.len() >= 4);
    validate_timing(
        &outcome.segments,
        settings.timing.min_duration,
        settings.timing.min_gap,
    )
    .unwrap();

    let formatter = CaptionFormatter::new(settings.style_book());
    for variant in [FormatVariant::Srt, FormatVariant::Vtt, FormatVariant::Ass] {
        let text = formatter.format(&outcome.segments, variant);
        let parsed = parse_captions(&text, variant).unwrap();
        assert_eq!(parsed.len(), outcome.segments.len(), "{}", variant);

        let tolerance = if variant == FormatVariant::Ass { 0.0051 } else { 0.00051 };
        for (original, back) in outcome.segments.iter().zip(&parsed) {
            assert_eq!(original.text, back.text);
            assert!((original.start_time - back.start_time).abs() <= tolerance);
            assert!((original.end_time - back.end_time).abs() <= tolerance);
        }
    }
}

#[test]
fn test_provider_count_mismatch_falls_back_to_estimate() {
    let settings = char_only_settings();
    let mut pipeline = pipeline(&settings);
    let request = CaptionRequest::new("一。二。三。", 6.0).with_provider_timestamps(vec![
        TimestampHint::new("一。", 0.0, 1.0),
        TimestampHint::new("二。三。", 1.0, 6.0),
    ]);

    let outcome = pipeline.process(&request).unwrap();
    assert_eq!(outcome.segments.len(), 3);
    assert_eq!(outcome.method, AlignmentMethod::ProportionalEstimate);
}

#[test]
fn test_dense_hints_are_repaired_forward() {
    let settings = char_only_settings();
    let mut pipeline = pipeline(&settings);
    let request = CaptionRequest::new("一。二。三。", 1.0).with_provider_timestamps(vec![
        TimestampHint::new("一。", 0.0, 0.2),
        TimestampHint::new("二。", 0.2, 0.4),
        TimestampHint::new("三。", 0.4, 0.6),
    ]);

    let outcome = pipeline.process(&request).unwrap();
    assert_eq!(outcome.method, AlignmentMethod::ProviderTimestamps);
    validate_timing(&outcome.segments, 0.5, 0.1).unwrap();
    assert_eq!(outcome.segments[0].start_time, 0.0);
    assert!(outcome.segments[2].start_time > 0.4);
}

#[test]
fn test_saved_file_parses_back() {
    let dir = TempDir::new().unwrap();
    let settings = char_only_settings();
    let mut pipeline = pipeline(&settings);
    let outcome = pipeline
        .process(&CaptionRequest::new("Short line. Another one!", 4.0).with_language(LanguageCode::En))
        .unwrap();

    let formatter = CaptionFormatter::default();
    let path = formatter
        .save(&outcome.segments, &dir.path().join("out.txt"), FormatVariant::Vtt)
        .unwrap();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("vtt"));

    let content = std::fs::read_to_string(&path).unwrap();
    let parsed = parse_captions(&content, FormatVariant::Vtt).unwrap();
    assert_eq!(parsed.len(), outcome.segments.len());
}
