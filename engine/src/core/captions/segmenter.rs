//! Text Segmenter
//!
//! Splits narration into caption-sized lines in three tiers:
//!
//! 1. sentence punctuation (。！？ / . ! ?)
//! 2. weak punctuation (，、：； / , ; :) with greedy re-packing
//! 3. forced unit split (characters for CJK, words for alphabetic text)
//!
//! Punctuation always stays at the end of the line it terminates. Whitespace
//! rides with the unit before it, so line breaks never drop characters and
//! concatenating the lines' source text gives back the narration. Every line
//! respects the character limit; the pixel limit is best effort because a
//! single character can not be split further.

use std::sync::Arc;
use tracing::debug;

use super::metrics::MeasureGlyph;
use super::models::TextLine;
use crate::core::{LanguageCode, Script};

// =============================================================================
// Punctuation Sets
// =============================================================================

const CJK_STRONG: &[char] = &['。', '！', '？', '!', '?', '…'];
const CJK_WEAK: &[char] = &['，', '、', '：', '；', ',', ':', ';'];
const ALPHA_STRONG: &[char] = &['.', '!', '?', '…'];
const ALPHA_WEAK: &[char] = &[',', ';', ':'];

/// Closing marks that belong to the preceding text
const CLOSING: &[char] = &[
    '"', '\'', '”', '’', '）', ')', '」', '』', '》', '】', ']',
];

fn strong_set(script: Script) -> &'static [char] {
    match script {
        Script::Logographic => CJK_STRONG,
        Script::Alphabetic => ALPHA_STRONG,
    }
}

fn weak_set(script: Script) -> &'static [char] {
    match script {
        Script::Logographic => CJK_WEAK,
        Script::Alphabetic => ALPHA_WEAK,
    }
}

fn ends_with_any(unit: &str, set: &[char]) -> bool {
    unit.trim_end()
        .trim_end_matches(CLOSING)
        .chars()
        .next_back()
        .is_some_and(|c| set.contains(&c))
}

/// True for units made only of punctuation / closing marks
fn is_trailing_mark(unit: &str) -> bool {
    let body = unit.trim_end();
    !body.is_empty()
        && body.chars().all(|c| {
            CLOSING.contains(&c)
                || CJK_STRONG.contains(&c)
                || CJK_WEAK.contains(&c)
                || ALPHA_STRONG.contains(&c)
                || ALPHA_WEAK.contains(&c)
        })
}

// =============================================================================
// Limits and Fit Predicate
// =============================================================================

/// Size constraints for a single caption line
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineLimits {
    /// Maximum characters per line (at least 1)
    pub max_chars: u32,
    /// Maximum rendered width in pixels
    pub max_pixel_width: u32,
    /// Font size used for width measurement
    pub font_size_px: u32,
    /// Whether the pixel width limit is checked at all
    pub validate_pixels: bool,
}

impl LineLimits {
    pub fn new(max_chars: u32, max_pixel_width: u32, font_size_px: u32, validate_pixels: bool) -> Self {
        Self {
            max_chars,
            max_pixel_width,
            font_size_px,
            validate_pixels,
        }
    }

    /// Character limit only
    pub fn chars_only(max_chars: u32) -> Self {
        Self {
            max_chars,
            validate_pixels: false,
            ..Self::default()
        }
    }
}

impl Default for LineLimits {
    fn default() -> Self {
        Self::new(10, 580, 48, true)
    }
}

/// `fits(line) := len <= max_chars && (!validate || width <= max_width)`,
/// measured without the line's trailing whitespace
struct FitPredicate<'a> {
    limits: LineLimits,
    metrics: &'a dyn MeasureGlyph,
}

impl FitPredicate<'_> {
    fn fits(&self, line: &str) -> bool {
        let line = line.trim_end();
        let max_chars = self.limits.max_chars.max(1) as usize;
        if line.chars().count() > max_chars {
            return false;
        }
        !self.limits.validate_pixels
            || self.metrics.measure(line, self.limits.font_size_px) <= self.limits.max_pixel_width
    }
}

// =============================================================================
// Segmenter
// =============================================================================

/// Splits narration text into [`TextLine`]s
#[derive(Clone)]
pub struct TextSegmenter {
    metrics: Arc<dyn MeasureGlyph>,
}

impl TextSegmenter {
    pub fn new(metrics: Arc<dyn MeasureGlyph>) -> Self {
        Self { metrics }
    }

    /// Segments `text` under `limits`. Blank input yields no lines.
    pub fn segment(&self, text: &str, language: LanguageCode, limits: LineLimits) -> Vec<TextLine> {
        let units = split_units(text.trim(), language.script());
        if units.is_empty() {
            return Vec::new();
        }

        let run = SegmentRun {
            predicate: FitPredicate {
                limits,
                metrics: self.metrics.as_ref(),
            },
            script: language.script(),
        };

        let mut lines = Vec::new();
        for clause in split_after(&units, strong_set(run.script)) {
            let joined = run.join(&clause);
            if run.predicate.fits(&joined) {
                lines.push(joined);
            } else {
                run.split_weak(&clause, &mut lines);
            }
        }

        let lines: Vec<TextLine> = lines
            .iter()
            .filter_map(|line| TextLine::from_source(line))
            .collect();
        debug!(
            language = %language,
            lines = lines.len(),
            "Segmented narration into caption lines"
        );
        lines
    }
}

struct SegmentRun<'a> {
    predicate: FitPredicate<'a>,
    script: Script,
}

impl SegmentRun<'_> {
    /// Units carry their own trailing whitespace
    fn join(&self, units: &[&str]) -> String {
        units.concat()
    }

    /// Tier 2: weak punctuation parts, greedily packed
    fn split_weak(&self, clause: &[&str], out: &mut Vec<String>) {
        let mut running: Vec<&str> = Vec::new();
        for part in split_after(clause, weak_set(self.script)) {
            let mut candidate = running.clone();
            candidate.extend_from_slice(&part);
            if self.predicate.fits(&self.join(&candidate)) {
                running = candidate;
                continue;
            }

            if !running.is_empty() {
                out.push(self.join(&running));
                running.clear();
            }

            if self.predicate.fits(&self.join(&part)) {
                running = part;
            } else {
                self.split_forced(&part, out);
            }
        }
        if !running.is_empty() {
            out.push(self.join(&running));
        }
    }

    /// Tier 3: unit-by-unit packing
    fn split_forced<'t>(&self, part: &[&'t str], out: &mut Vec<String>) {
        let mut chunk: Vec<&'t str> = Vec::new();
        for &unit in part {
            chunk.push(unit);
            if self.predicate.fits(&self.join(&chunk)) {
                continue;
            }
            chunk.pop();

            // Keep a punctuation mark with the unit before it, when the
            // pair still fits on a line of its own.
            if is_trailing_mark(unit) && chunk.len() > 1 {
                if let Some(&last) = chunk.last() {
                    if self.predicate.fits(&self.join(&[last, unit])) {
                        chunk.pop();
                        out.push(self.join(&chunk));
                        chunk = vec![last, unit];
                        continue;
                    }
                }
            }

            if !chunk.is_empty() {
                out.push(self.join(&chunk));
                chunk.clear();
            }

            if self.predicate.fits(unit) {
                chunk.push(unit);
            } else if self.script == Script::Alphabetic && unit.trim_end().chars().count() > 1 {
                let tail = self.split_word(unit, out);
                chunk.push(tail);
            } else {
                // A single glyph wider than the line; nothing smaller exists.
                out.push(unit.to_string());
            }
        }
        if !chunk.is_empty() {
            out.push(self.join(&chunk));
        }
    }

    /// Degenerate case: one word longer than a whole line. Emits the full
    /// pieces and returns the remainder so following words can join it.
    fn split_word<'t>(&self, word: &'t str, out: &mut Vec<String>) -> &'t str {
        let mut start = 0;
        for (i, c) in word.char_indices() {
            let end = i + c.len_utf8();
            if i > start && !self.predicate.fits(&word[start..end]) {
                out.push(word[start..i].to_string());
                start = i;
            }
        }
        &word[start..]
    }
}

/// Splits text into segmentation units: single characters for logographic
/// scripts, words for alphabetic ones. Whitespace is attached to the unit
/// before it, so the units concatenate back to `text`.
fn split_units(text: &str, script: Script) -> Vec<&str> {
    let mut starts = Vec::new();
    let mut prev_space = true;
    for (i, c) in text.char_indices() {
        let space = c.is_whitespace();
        let starts_unit = match script {
            Script::Logographic => !space,
            Script::Alphabetic => !space && prev_space,
        };
        if starts_unit || i == 0 {
            starts.push(i);
        }
        prev_space = space;
    }

    starts
        .iter()
        .enumerate()
        .map(|(k, &start)| {
            let end = starts.get(k + 1).copied().unwrap_or(text.len());
            &text[start..end]
        })
        .collect()
}

/// Groups units, closing a group after each unit ending in a boundary mark.
/// Marks that directly follow a boundary (e.g. "！？" or a closing quote)
/// stay in the group they close.
fn split_after<'a>(units: &[&'a str], boundary: &[char]) -> Vec<Vec<&'a str>> {
    let mut groups = Vec::new();
    let mut current: Vec<&'a str> = Vec::new();
    let mut closed = false;

    for &unit in units {
        if closed && !is_trailing_mark(unit) {
            groups.push(std::mem::take(&mut current));
            closed = false;
        }
        current.push(unit);
        if ends_with_any(unit, boundary) {
            closed = true;
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::captions::metrics::{default_font_candidates, GlyphMetrics};

    fn segmenter() -> TextSegmenter {
        TextSegmenter::new(Arc::new(GlyphMetrics::estimate_only(0)))
    }

    fn texts(lines: &[TextLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text()).collect()
    }

    fn source(lines: &[TextLine]) -> String {
        lines.iter().map(TextLine::source_text).collect()
    }

    /// Fixed 10px per character
    struct FixedWidth;

    impl MeasureGlyph for FixedWidth {
        fn measure(&self, text: &str, _font_size_px: u32) -> u32 {
            text.chars().count() as u32 * 10
        }
    }

    // -------------------------------------------------------------------------
    // CJK Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_three_tier_cjk_split() {
        let input = "你好。这是一个很长很长很长很长很长很长的句子，用于测试强制分割。";
        let lines = segmenter().segment(input, LanguageCode::Zh, LineLimits::chars_only(10));

        assert_eq!(
            texts(&lines),
            vec![
                "你好。",
                "这是一个很长很长很长",
                "很长很长很长的句子，",
                "用于测试强制分割。"
            ]
        );
        assert!(lines.len() >= 4);
        assert!(lines.iter().all(|l| l.char_len() <= 10));
        assert_eq!(texts(&lines).concat(), input);
    }

    #[test]
    fn test_short_clauses_are_kept_whole() {
        let lines = segmenter().segment("早上好！今天天气不错。", LanguageCode::Zh, LineLimits::chars_only(10));
        assert_eq!(texts(&lines), vec!["早上好！", "今天天气不错。"]);
    }

    #[test]
    fn test_weak_parts_are_packed_greedily() {
        let lines = segmenter().segment(
            "一二三，四五六，七八九十一二，三。",
            LanguageCode::Zh,
            LineLimits::chars_only(10),
        );
        assert_eq!(texts(&lines), vec!["一二三，四五六，", "七八九十一二，三。"]);
    }

    #[test]
    fn test_consecutive_marks_stay_together() {
        let lines = segmenter().segment("真的吗？！“是的。”好", LanguageCode::Zh, LineLimits::chars_only(10));
        assert_eq!(texts(&lines), vec!["真的吗？！", "“是的。”", "好"]);
    }

    #[test]
    fn test_forced_split_keeps_mark_with_previous_char() {
        let input = "一二三四五六七八九十，好";
        let lines = segmenter().segment(input, LanguageCode::Zh, LineLimits::chars_only(10));
        assert!(lines.iter().all(|l| !l.text().starts_with('，')));
        assert!(lines.iter().all(|l| l.char_len() <= 10));
        assert_eq!(texts(&lines).concat(), input);
    }

    #[test]
    fn test_pixel_validation_tightens_lines() {
        let seg = TextSegmenter::new(Arc::new(FixedWidth));
        let limits = LineLimits::new(10, 50, 48, true);
        let lines = seg.segment("一二三四五六七八九十", LanguageCode::Zh, limits);
        assert_eq!(texts(&lines), vec!["一二三四五", "六七八九十"]);

        let unchecked = LineLimits { validate_pixels: false, ..limits };
        assert_eq!(seg.segment("一二三四五六七八九十", LanguageCode::Zh, unchecked).len(), 1);
    }

    #[test]
    fn test_oversized_glyph_is_emitted_alone() {
        let seg = TextSegmenter::new(Arc::new(FixedWidth));
        let lines = seg.segment("一二", LanguageCode::Zh, LineLimits::new(10, 5, 48, true));
        assert_eq!(texts(&lines), vec!["一", "二"]);
    }

    // -------------------------------------------------------------------------
    // Alphabetic Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_english_splits_on_words() {
        let input = "Hello world. This sentence is definitely far too long, so it splits.";
        let lines = segmenter().segment(input, LanguageCode::En, LineLimits::chars_only(20));

        assert!(lines.iter().all(|l| l.char_len() <= 20));
        assert_eq!(lines[0].text(), "Hello world.");
        let rejoined: Vec<&str> = texts(&lines);
        assert_eq!(rejoined.join(" "), input);
        // No word is ever cut in half here.
        for line in &lines {
            for word in line.text().split(' ') {
                assert!(input.split_whitespace().any(|w| w == word));
            }
        }
    }

    #[test]
    fn test_single_long_word_is_char_split() {
        let lines = segmenter().segment(
            "Supercalifragilistic ok",
            LanguageCode::En,
            LineLimits::chars_only(8),
        );
        assert_eq!(texts(&lines), vec!["Supercal", "ifragili", "stic ok"]);
    }

    #[test]
    fn test_alphabetic_text_keeps_inner_whitespace() {
        let lines = segmenter().segment("  Hola   mundo.  ", LanguageCode::Es, LineLimits::chars_only(40));
        assert_eq!(texts(&lines), vec!["Hola   mundo."]);
        assert_eq!(source(&lines), "Hola   mundo.");
    }

    #[test]
    fn test_trailing_mark_never_overflows_line() {
        let lines = segmenter().segment("a bcd ?!.. e", LanguageCode::En, LineLimits::chars_only(5));
        assert_eq!(texts(&lines), vec!["a bcd", "?!..", "e"]);
        assert_eq!(source(&lines), "a bcd ?!.. e");
    }

    #[test]
    fn test_punctuation_runs_respect_limits() {
        let inputs = [
            (LanguageCode::En, "Wait ?!.. what ... no !!! fine , ok ;; sure ?! yes."),
            (LanguageCode::En, "a bcd ?!.. e fgh ,,, ij !? k"),
            (LanguageCode::Zh, "真的吗 ？！！ 是的 。。。 好吧 ，， 走"),
            (LanguageCode::Zh, "一二三四……！！？？五六七八九十，，，"),
        ];
        for (language, input) in inputs {
            for max in 1..=12 {
                let lines = segmenter().segment(input, language, LineLimits::chars_only(max));
                assert!(
                    lines.iter().all(|l| l.char_len() <= max as usize),
                    "{:?} max_chars={}: {:?}",
                    input,
                    max,
                    texts(&lines)
                );
                assert_eq!(source(&lines), input, "max_chars={}", max);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Edge Cases
    // -------------------------------------------------------------------------

    // -------------------------------------------------------------------------
    // Mixed Script Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_mixed_script_keeps_spaces_at_line_breaks() {
        let input = "我喜欢 Rust 语言。";
        let lines = segmenter().segment(input, LanguageCode::Zh, LineLimits::chars_only(4));

        assert_eq!(texts(&lines), vec!["我喜欢", "Rust", "语言。"]);
        assert_eq!(source(&lines), input);
    }

    #[test]
    fn test_mixed_script_concatenation_for_many_limits() {
        let input = "今天我们用 Rust 和 FFmpeg 做字幕， 效果 very good！ 下一步：发布 v1.0 版本。";
        for max in 1..=16 {
            let lines = segmenter().segment(input, LanguageCode::Zh, LineLimits::chars_only(max));
            assert!(lines.iter().all(|l| l.char_len() <= max as usize), "max_chars={}", max);
            assert!(lines.iter().all(|l| l.text() == l.text().trim()));
            assert_eq!(source(&lines), input, "max_chars={}", max);
        }
    }

    // -------------------------------------------------------------------------
    // Real Font Measurement
    // -------------------------------------------------------------------------

    #[test]
    fn test_pixel_limit_with_system_font() {
        let metrics = GlyphMetrics::new(default_font_candidates(), 0);
        if metrics.font_path().is_none() {
            eprintln!("No candidate font installed, skipping");
            return;
        }
        let metrics = Arc::new(metrics);
        let seg = TextSegmenter::new(metrics.clone());
        let input = "The quick brown fox jumps over the lazy dog again and again";

        let limits = LineLimits::new(60, 300, 48, true);
        let lines = seg.segment(input, LanguageCode::En, limits);
        assert!(lines.len() > 1);
        assert!(lines
            .iter()
            .all(|l| !l.text().contains(' ') || metrics.measure(l.text(), 48) <= 300));
        assert_eq!(source(&lines), input);

        let unchecked = LineLimits { validate_pixels: false, ..limits };
        assert_eq!(seg.segment(input, LanguageCode::En, unchecked).len(), 1);
    }

    #[test]
    fn test_empty_input_yields_no_lines() {
        let seg = segmenter();
        assert!(seg.segment("", LanguageCode::Zh, LineLimits::default()).is_empty());
        assert!(seg.segment("  \n\t ", LanguageCode::En, LineLimits::default()).is_empty());
    }

    #[test]
    fn test_char_limit_holds_for_many_limits() {
        let input = "春眠不觉晓，处处闻啼鸟。夜来风雨声，花落知多少！这是一段没有标点符号的非常长的文字用来测试";
        for max in 1..=15 {
            let lines = segmenter().segment(input, LanguageCode::Zh, LineLimits::chars_only(max));
            assert!(lines.iter().all(|l| l.char_len() <= max as usize), "max_chars={}", max);
            assert_eq!(texts(&lines).concat(), input, "max_chars={}", max);
        }
    }

    #[test]
    fn test_zero_char_limit_is_treated_as_one() {
        let lines = segmenter().segment("你好", LanguageCode::Zh, LineLimits::chars_only(0));
        assert_eq!(texts(&lines), vec!["你", "好"]);
    }
}
