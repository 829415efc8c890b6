//! Timestamp Aligner
//!
//! Assigns start/end times to segmented caption lines by trying a fixed,
//! confidence-ranked chain of strategies:
//!
//! 1. [`AlignmentMethod::ForcedAlignment`] - word timings from a speech model
//! 2. [`AlignmentMethod::ProviderTimestamps`] - hints from the TTS provider
//! 3. [`AlignmentMethod::ProportionalEstimate`] - character-length shares
//!
//! The first strategy that succeeds produces every segment; results are never
//! mixed. Strategy failures are logged and fall through.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::models::{CaptionSegment, TextLine, TimestampHint, WordTimestamp};
use crate::core::{LanguageCode, TimeSec};

// =============================================================================
// Error Types
// =============================================================================

/// Failures of a forced-alignment backend. Recovered inside the aligner.
#[derive(Error, Debug)]
pub enum AlignmentError {
    /// Backend compiled out (missing cargo feature)
    #[error("Forced alignment backend not enabled. Rebuild with --features whisper")]
    FeatureNotEnabled,

    /// Model file missing
    #[error("Alignment model not found: {0}")]
    ModelNotFound(String),

    /// Model failed to load or was not loaded
    #[error("Alignment model not loaded: {0}")]
    ModelNotLoaded(String),

    /// Audio could not be prepared or read
    #[error("Alignment audio error: {0}")]
    Audio(String),

    /// Inference failed
    #[error("Alignment failed: {0}")]
    InferenceFailed(String),
}

// =============================================================================
// Forced Aligner Capability
// =============================================================================

/// External speech model that aligns a known transcript against its audio.
///
/// Implementations hold a (possibly GPU-resident) model. `&mut self` on
/// [`ForcedAligner::align_words`] keeps calls against one loaded instance
/// sequential.
pub trait ForcedAligner: Send {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Whether the backend can run at all in this build/environment
    fn is_available(&self) -> bool {
        true
    }

    /// Loads model weights. Called before a batch of alignments.
    fn load_models(&mut self) -> Result<(), AlignmentError>;

    /// Releases model weights after a batch of alignments.
    fn cleanup_models(&mut self);

    /// Returns word-level timestamps for `reference_text` spoken in `audio`.
    fn align_words(
        &mut self,
        audio: &Path,
        reference_text: &str,
        language: LanguageCode,
    ) -> Result<Vec<WordTimestamp>, AlignmentError>;
}

// =============================================================================
// Result Types
// =============================================================================

/// Strategy that produced an alignment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    ForcedAlignment,
    ProviderTimestamps,
    ProportionalEstimate,
}

impl AlignmentMethod {
    /// Strategies in priority order
    pub const CHAIN: [AlignmentMethod; 3] = [
        AlignmentMethod::ForcedAlignment,
        AlignmentMethod::ProviderTimestamps,
        AlignmentMethod::ProportionalEstimate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentMethod::ForcedAlignment => "forced_alignment",
            AlignmentMethod::ProviderTimestamps => "provider_timestamps",
            AlignmentMethod::ProportionalEstimate => "proportional_estimate",
        }
    }
}

impl std::fmt::Display for AlignmentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Segments produced by exactly one strategy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
    pub segments: Vec<CaptionSegment>,
    pub method: AlignmentMethod,
    /// Mean of per-segment confidences
    pub confidence_score: f64,
}

impl AlignmentResult {
    pub fn new(segments: Vec<CaptionSegment>, method: AlignmentMethod) -> Self {
        let confidence_score = mean_confidence(&segments);
        Self {
            segments,
            method,
            confidence_score,
        }
    }
}

fn mean_confidence(segments: &[CaptionSegment]) -> f64 {
    if segments.is_empty() {
        return 0.0;
    }
    segments.iter().map(|s| s.confidence).sum::<f64>() / segments.len() as f64
}

// =============================================================================
// Aligner Configuration
// =============================================================================

/// Tunables for the strategy chain
#[derive(Clone, Debug, PartialEq)]
pub struct AlignerConfig {
    /// Shortest estimated segment
    pub min_duration: TimeSec,
    /// Longest estimated segment (except the final one)
    pub max_duration_per_segment: TimeSec,
    /// Fixed confidence for provider hints
    pub provider_confidence: f64,
    /// Fixed confidence for proportional estimates
    pub estimate_confidence: f64,
    pub enable_forced_alignment: bool,
    pub enable_provider_timestamps: bool,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            min_duration: 0.5,
            max_duration_per_segment: 3.0,
            provider_confidence: 0.8,
            estimate_confidence: 0.5,
            enable_forced_alignment: true,
            enable_provider_timestamps: true,
        }
    }
}

/// Inputs of one `align` call
struct AlignmentRequest<'a> {
    lines: &'a [TextLine],
    total_duration: TimeSec,
    audio_file: Option<&'a Path>,
    provider_timestamps: Option<&'a [TimestampHint]>,
    language: LanguageCode,
}

// =============================================================================
// Timestamp Aligner
// =============================================================================

/// Runs the alignment strategy chain
pub struct TimestampAligner {
    config: AlignerConfig,
    forced: Option<Box<dyn ForcedAligner>>,
}

impl TimestampAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self {
            config,
            forced: None,
        }
    }

    /// Attaches a forced-alignment backend
    pub fn with_forced_aligner(mut self, aligner: Box<dyn ForcedAligner>) -> Self {
        self.forced = Some(aligner);
        self
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    /// Loads the forced-alignment model, if one is attached
    pub fn load_models(&mut self) -> Result<(), AlignmentError> {
        match self.forced.as_mut() {
            Some(aligner) if aligner.is_available() => {
                info!("Loading forced alignment models ({})", aligner.name());
                aligner.load_models()
            }
            _ => Ok(()),
        }
    }

    /// Releases the forced-alignment model, if one is attached
    pub fn cleanup_models(&mut self) {
        if let Some(aligner) = self.forced.as_mut() {
            info!("Releasing forced alignment models ({})", aligner.name());
            aligner.cleanup_models();
        }
    }

    /// Aligns `lines` to time. Always succeeds.
    pub fn align(
        &mut self,
        lines: &[TextLine],
        total_duration: TimeSec,
        audio_file: Option<&Path>,
        provider_timestamps: Option<&[TimestampHint]>,
        language: LanguageCode,
    ) -> AlignmentResult {
        let request = AlignmentRequest {
            lines,
            total_duration,
            audio_file,
            provider_timestamps,
            language,
        };

        if lines.is_empty() {
            return AlignmentResult::new(Vec::new(), AlignmentMethod::ProportionalEstimate);
        }

        for method in AlignmentMethod::CHAIN {
            let attempt = match method {
                AlignmentMethod::ForcedAlignment => self.try_forced(&request),
                AlignmentMethod::ProviderTimestamps => self.try_provider(&request),
                AlignmentMethod::ProportionalEstimate => Some(self.estimate(&request)),
            };
            if let Some(segments) = attempt {
                let result = AlignmentResult::new(segments, method);
                info!(
                    method = %method,
                    segments = result.segments.len(),
                    confidence = result.confidence_score,
                    "Caption alignment complete"
                );
                return result;
            }
        }

        // The chain ends with the estimate, which never declines.
        AlignmentResult::new(self.estimate(&request), AlignmentMethod::ProportionalEstimate)
    }

    // -------------------------------------------------------------------------
    // Strategy 1: Forced Alignment
    // -------------------------------------------------------------------------

    fn try_forced(&mut self, request: &AlignmentRequest<'_>) -> Option<Vec<CaptionSegment>> {
        if !self.config.enable_forced_alignment {
            return None;
        }
        let audio = request.audio_file?;
        let aligner = self.forced.as_mut()?;

        if !aligner.is_available() {
            info!("Forced alignment backend '{}' unavailable, skipping", aligner.name());
            return None;
        }
        if !audio.exists() {
            warn!("Alignment audio not found: {}", audio.display());
            return None;
        }

        let reference = request
            .lines
            .iter()
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join(request.language.joiner());

        let words = match aligner.align_words(audio, &reference, request.language) {
            Ok(words) => words,
            Err(e) => {
                warn!("Forced alignment via '{}' failed: {}", aligner.name(), e);
                return None;
            }
        };

        let grouped = group_words(request.lines, &words);
        if grouped.is_none() {
            warn!(
                words = words.len(),
                lines = request.lines.len(),
                "Forced alignment returned too few words for the transcript"
            );
        }
        grouped
    }

    // -------------------------------------------------------------------------
    // Strategy 2: Provider Timestamps
    // -------------------------------------------------------------------------

    fn try_provider(&self, request: &AlignmentRequest<'_>) -> Option<Vec<CaptionSegment>> {
        if !self.config.enable_provider_timestamps {
            return None;
        }
        let hints = request.provider_timestamps?;

        if hints.len() != request.lines.len() {
            info!(
                hints = hints.len(),
                lines = request.lines.len(),
                "Provider timestamp count differs from line count, skipping"
            );
            return None;
        }
        if let Some(bad) = hints
            .iter()
            .find(|h| !h.start.is_finite() || !h.end.is_finite() || h.end < h.start)
        {
            warn!(
                "Invalid provider timestamp for '{}' ({}..{}), skipping",
                bad.text, bad.start, bad.end
            );
            return None;
        }

        Some(
            request
                .lines
                .iter()
                .zip(hints)
                .map(|(line, hint)| {
                    CaptionSegment::new(line.text(), hint.start, hint.end)
                        .with_confidence(self.config.provider_confidence)
                })
                .collect(),
        )
    }

    // -------------------------------------------------------------------------
    // Strategy 3: Proportional Estimate
    // -------------------------------------------------------------------------

    fn estimate(&self, request: &AlignmentRequest<'_>) -> Vec<CaptionSegment> {
        let min = self.config.min_duration.max(0.0);
        let max = self.config.max_duration_per_segment.max(min);
        let total = if request.total_duration.is_finite() {
            request.total_duration.max(0.0)
        } else {
            warn!("Non-finite total duration, laying captions out from minimums");
            0.0
        };

        let total_len: usize = request.lines.iter().map(TextLine::char_len).sum();
        let total_len = total_len.max(1) as f64;
        let last = request.lines.len() - 1;

        let mut cursor = 0.0;
        let mut segments = Vec::with_capacity(request.lines.len());
        for (i, line) in request.lines.iter().enumerate() {
            let share = total * line.char_len() as f64 / total_len;
            let start = cursor;
            let mut end = start + share.max(min).min(max);

            if i == last {
                end = total;
                if end <= start {
                    warn!(start, total, "Captions overrun the total duration, extending final caption");
                    end = start + min.max(f64::EPSILON);
                }
            }

            segments.push(
                CaptionSegment::new(line.text(), start, end)
                    .with_confidence(self.config.estimate_confidence),
            );
            cursor = end;
        }
        debug!(segments = segments.len(), total, "Estimated caption timings");
        segments
    }
}

impl Default for TimestampAligner {
    fn default() -> Self {
        Self::new(AlignerConfig::default())
    }
}

impl std::fmt::Debug for TimestampAligner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampAligner")
            .field("config", &self.config)
            .field("forced", &self.forced.as_ref().map(|a| a.name().to_string()))
            .finish()
    }
}

// =============================================================================
// Word Grouping
// =============================================================================

/// Characters that count when matching words against lines
fn alignable_len(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphanumeric()).count()
}

/// Regroups word timings into the given lines by consuming words until each
/// line's alignable characters are covered. A word spanning a line boundary
/// contributes to both lines. Returns `None` when words run out.
fn group_words(lines: &[TextLine], words: &[WordTimestamp]) -> Option<Vec<CaptionSegment>> {
    let mut words = words.iter().filter(|w| alignable_len(&w.word) > 0);
    let mut carry: Option<(&WordTimestamp, usize)> = None;
    let mut prev_end: TimeSec = 0.0;
    let mut segments = Vec::with_capacity(lines.len());

    for line in lines {
        let target = alignable_len(line.text());
        let mut covered = 0;
        let mut start: Option<TimeSec> = None;
        let mut end = prev_end;
        let mut confidences = Vec::new();

        let mut take = |word: &WordTimestamp, count: usize| {
            start.get_or_insert(word.start);
            end = word.end;
            confidences.push(word.confidence);
            count
        };

        if let Some((word, remaining)) = carry.take() {
            covered += take(word, remaining);
            if covered > target {
                carry = Some((word, covered - target));
            }
        }

        while covered < target {
            let word = words.next()?;
            covered += take(word, alignable_len(&word.word));
            if covered > target {
                carry = Some((word, covered - target));
            }
        }

        let start = start.unwrap_or(prev_end);
        let end = end.max(start);
        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        segments.push(CaptionSegment::new(line.text(), start, end).with_confidence(confidence));
        prev_end = end;
    }

    Some(segments)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn lines(texts: &[&str]) -> Vec<TextLine> {
        texts.iter().filter_map(|t| TextLine::new(t)).collect()
    }

    /// Scripted aligner recording how often it was called
    struct ScriptedAligner {
        words: Result<Vec<WordTimestamp>, String>,
        calls: Arc<AtomicUsize>,
        loaded: Arc<AtomicUsize>,
    }

    impl ScriptedAligner {
        fn ok(words: Vec<WordTimestamp>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    words: Ok(words),
                    calls: Arc::clone(&calls),
                    loaded: Arc::new(AtomicUsize::new(0)),
                },
                calls,
            )
        }

        fn failing() -> Self {
            Self {
                words: Err("gpu on fire".to_string()),
                calls: Arc::new(AtomicUsize::new(0)),
                loaded: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ForcedAligner for ScriptedAligner {
        fn name(&self) -> &str {
            "scripted"
        }

        fn load_models(&mut self) -> Result<(), AlignmentError> {
            self.loaded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn cleanup_models(&mut self) {
            self.loaded.store(0, Ordering::SeqCst);
        }

        fn align_words(
            &mut self,
            _audio: &Path,
            _reference_text: &str,
            _language: LanguageCode,
        ) -> Result<Vec<WordTimestamp>, AlignmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.words
                .clone()
                .map_err(AlignmentError::InferenceFailed)
        }
    }

    // -------------------------------------------------------------------------
    // Proportional Estimate
    // -------------------------------------------------------------------------

    #[test]
    fn test_proportional_estimate_scenario() {
        let mut aligner = TimestampAligner::default();
        let result = aligner.align(&lines(&["A", "BB", "CCC"]), 6.0, None, None, LanguageCode::En);

        assert_eq!(result.method, AlignmentMethod::ProportionalEstimate);
        let durations: Vec<f64> = result.segments.iter().map(|s| s.duration).collect();
        assert!((durations[0] - 1.0).abs() < 1e-9);
        assert!((durations[1] - 2.0).abs() < 1e-9);
        assert!((durations[2] - 3.0).abs() < 1e-9);
        assert_eq!(result.segments[2].end_time, 6.0);
        assert!((result.confidence_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_clamps_short_and_long_shares() {
        let mut aligner = TimestampAligner::default();
        // Shares would be 0.1s and 9.9s.
        let text = "B".repeat(99);
        let result = aligner.align(&lines(&["A", &text, "C"]), 10.0, None, None, LanguageCode::En);

        let segs = &result.segments;
        assert!((segs[0].duration - 0.5).abs() < 1e-9);
        assert!((segs[1].duration - 3.0).abs() < 1e-9);
        assert_eq!(segs[2].end_time, 10.0);
        assert!((segs[2].start_time - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_extends_final_segment_when_overrun() {
        let mut aligner = TimestampAligner::default();
        let result = aligner.align(&lines(&["A", "B", "C"]), 0.4, None, None, LanguageCode::En);
        let last = result.segments.last().unwrap();
        assert!(last.end_time > last.start_time);
    }

    #[test]
    fn test_empty_lines_produce_empty_result() {
        let mut aligner = TimestampAligner::default();
        let result = aligner.align(&[], 5.0, None, None, LanguageCode::Zh);
        assert!(result.segments.is_empty());
        assert_eq!(result.confidence_score, 0.0);
    }

    // -------------------------------------------------------------------------
    // Provider Timestamps
    // -------------------------------------------------------------------------

    #[test]
    fn test_provider_count_mismatch_falls_through() {
        let mut aligner = TimestampAligner::default();
        let hints = vec![
            TimestampHint::new("A", 0.0, 1.0),
            TimestampHint::new("BB", 1.0, 2.0),
        ];
        let result = aligner.align(
            &lines(&["A", "BB", "CCC"]),
            6.0,
            None,
            Some(&hints),
            LanguageCode::En,
        );
        assert_eq!(result.method, AlignmentMethod::ProportionalEstimate);
    }

    #[test]
    fn test_provider_timestamps_map_one_to_one() {
        let mut aligner = TimestampAligner::default();
        let hints = vec![
            TimestampHint::new("a", 0.2, 1.1),
            TimestampHint::new("b", 1.3, 2.9),
        ];
        let result = aligner.align(&lines(&["你好", "世界"]), 3.0, None, Some(&hints), LanguageCode::Zh);

        assert_eq!(result.method, AlignmentMethod::ProviderTimestamps);
        // Line text is authoritative, hint text is ignored.
        assert_eq!(result.segments[0].text, "你好");
        assert_eq!(result.segments[1].start_time, 1.3);
        assert!((result.confidence_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_provider_hint_falls_through() {
        let mut aligner = TimestampAligner::default();
        let hints = vec![TimestampHint::new("a", 2.0, 1.0)];
        let result = aligner.align(&lines(&["a"]), 3.0, None, Some(&hints), LanguageCode::En);
        assert_eq!(result.method, AlignmentMethod::ProportionalEstimate);
    }

    // -------------------------------------------------------------------------
    // Forced Alignment
    // -------------------------------------------------------------------------

    #[test]
    fn test_forced_alignment_groups_words_into_lines() {
        let audio = NamedTempFile::new().unwrap();
        let (backend, calls) = ScriptedAligner::ok(vec![
            WordTimestamp::new("你好", 0.1, 0.6, 0.9),
            WordTimestamp::new("，", 0.6, 0.6, 0.1),
            WordTimestamp::new("世界", 0.7, 1.2, 0.7),
            WordTimestamp::new("再见", 1.5, 2.0, 0.8),
        ]);
        let mut aligner = TimestampAligner::default().with_forced_aligner(Box::new(backend));

        let result = aligner.align(
            &lines(&["你好，世界。", "再见！"]),
            3.0,
            Some(audio.path()),
            None,
            LanguageCode::Zh,
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.method, AlignmentMethod::ForcedAlignment);
        let segs = &result.segments;
        assert_eq!((segs[0].start_time, segs[0].end_time), (0.1, 1.2));
        assert!((segs[0].confidence - 0.8).abs() < 1e-9);
        assert_eq!((segs[1].start_time, segs[1].end_time), (1.5, 2.0));
        assert!((result.confidence_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_word_spanning_lines_counts_for_both() {
        let words = vec![
            WordTimestamp::new("abcdef", 0.0, 1.0, 1.0),
            WordTimestamp::new("gh", 1.0, 1.5, 0.5),
        ];
        let segs = group_words(&lines(&["abc", "def gh"]), &words).unwrap();
        assert_eq!((segs[0].start_time, segs[0].end_time), (0.0, 1.0));
        assert_eq!((segs[1].start_time, segs[1].end_time), (0.0, 1.5));
        assert!((segs[1].confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_forced_alignment_too_few_words_falls_through() {
        let audio = NamedTempFile::new().unwrap();
        let (backend, _) = ScriptedAligner::ok(vec![WordTimestamp::new("hello", 0.0, 0.5, 0.9)]);
        let mut aligner = TimestampAligner::default().with_forced_aligner(Box::new(backend));
        let hints = vec![
            TimestampHint::new("hello", 0.0, 0.5),
            TimestampHint::new("world", 0.6, 1.0),
        ];

        let result = aligner.align(
            &lines(&["hello", "world"]),
            1.0,
            Some(audio.path()),
            Some(&hints),
            LanguageCode::En,
        );
        assert_eq!(result.method, AlignmentMethod::ProviderTimestamps);
    }

    fn char_tokens(text: &str, step: f64) -> Vec<WordTimestamp> {
        text.chars()
            .enumerate()
            .map(|(i, c)| {
                let start = i as f64 * step;
                WordTimestamp::new(c.to_string(), start, start + step, 0.9)
            })
            .collect()
    }

    #[test]
    fn test_forced_alignment_ignores_surplus_char_tokens() {
        let audio = NamedTempFile::new().unwrap();
        // Reference has six alignable chars; the backend hears one extra.
        let (backend, _) = ScriptedAligner::ok(char_tokens("你好世界再见啊", 0.5));
        let mut aligner = TimestampAligner::default().with_forced_aligner(Box::new(backend));

        let result = aligner.align(
            &lines(&["你好，世界。", "再见！"]),
            4.0,
            Some(audio.path()),
            None,
            LanguageCode::Zh,
        );

        assert_eq!(result.method, AlignmentMethod::ForcedAlignment);
        let segs = &result.segments;
        assert_eq!((segs[0].start_time, segs[0].end_time), (0.0, 2.0));
        assert_eq!((segs[1].start_time, segs[1].end_time), (2.0, 3.0));
    }

    #[test]
    fn test_forced_alignment_missing_char_tokens_falls_through() {
        let audio = NamedTempFile::new().unwrap();
        let (backend, calls) = ScriptedAligner::ok(char_tokens("你好世界再", 0.5));
        let mut aligner = TimestampAligner::default().with_forced_aligner(Box::new(backend));

        let result = aligner.align(
            &lines(&["你好，世界。", "再见！"]),
            4.0,
            Some(audio.path()),
            None,
            LanguageCode::Zh,
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.method, AlignmentMethod::ProportionalEstimate);
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[1].end_time, 4.0);
    }

    #[test]
    fn test_forced_alignment_error_falls_through() {
        let audio = NamedTempFile::new().unwrap();
        let mut aligner =
            TimestampAligner::default().with_forced_aligner(Box::new(ScriptedAligner::failing()));
        let result = aligner.align(&lines(&["a", "b"]), 2.0, Some(audio.path()), None, LanguageCode::En);
        assert_eq!(result.method, AlignmentMethod::ProportionalEstimate);
    }

    #[test]
    fn test_forced_alignment_skipped_without_audio_file() {
        let (backend, calls) = ScriptedAligner::ok(vec![WordTimestamp::new("a", 0.0, 1.0, 1.0)]);
        let mut aligner = TimestampAligner::default().with_forced_aligner(Box::new(backend));

        let missing = Path::new("/nonexistent/voice.wav");
        let result = aligner.align(&lines(&["a"]), 2.0, Some(missing), None, LanguageCode::En);
        assert_eq!(result.method, AlignmentMethod::ProportionalEstimate);

        let result = aligner.align(&lines(&["a"]), 2.0, None, None, LanguageCode::En);
        assert_eq!(result.method, AlignmentMethod::ProportionalEstimate);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disabled_strategies_are_skipped() {
        let audio = NamedTempFile::new().unwrap();
        let (backend, calls) = ScriptedAligner::ok(vec![WordTimestamp::new("a", 0.0, 1.0, 1.0)]);
        let config = AlignerConfig {
            enable_forced_alignment: false,
            enable_provider_timestamps: false,
            ..AlignerConfig::default()
        };
        let mut aligner = TimestampAligner::new(config).with_forced_aligner(Box::new(backend));
        let hints = vec![TimestampHint::new("a", 0.0, 1.0)];

        let result = aligner.align(&lines(&["a"]), 2.0, Some(audio.path()), Some(&hints), LanguageCode::En);
        assert_eq!(result.method, AlignmentMethod::ProportionalEstimate);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_model_lifecycle_is_delegated() {
        let (backend, _) = ScriptedAligner::ok(Vec::new());
        let loaded = Arc::clone(&backend.loaded);
        let mut aligner = TimestampAligner::default().with_forced_aligner(Box::new(backend));

        aligner.load_models().unwrap();
        assert_eq!(loaded.load(Ordering::SeqCst), 1);
        aligner.cleanup_models();
        assert_eq!(loaded.load(Ordering::SeqCst), 0);

        // No backend attached: lifecycle calls are no-ops.
        let mut bare = TimestampAligner::default();
        assert!(bare.load_models().is_ok());
        bare.cleanup_models();
    }
}
