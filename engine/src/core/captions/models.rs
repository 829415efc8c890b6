//! Caption Data Models
//!
//! Defines the data structures that flow through the caption pipeline.
//!
//! # Overview
//!
//! - [`TextLine`]: a caption-sized piece of narration produced by segmentation
//! - [`CaptionSegment`]: a timed, styled line ready for export or burn-in
//! - [`StyleProfile`] / [`StyleBook`]: immutable visual styles looked up by id
//! - [`TimestampHint`] / [`WordTimestamp`]: timing inputs from collaborators

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::core::{StyleId, TimeSec};

// =============================================================================
// Caption Positioning
// =============================================================================

/// Vertical position of a caption on screen
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Bottom of screen (default for narration)
    #[default]
    Bottom,
    /// Top of screen
    Top,
    /// Center of screen (title cards)
    Center,
}

/// Horizontal alignment of caption text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlign {
    /// Left-aligned, offset by the style margin
    Left,
    /// Centered (default)
    #[default]
    Center,
    /// Right-aligned, offset by the style margin
    Right,
}

// =============================================================================
// Colors and Decorations
// =============================================================================

/// RGBA color value (0-255 for each component)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Creates a new color from RGBA components
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Creates an opaque color from RGB components
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// White color
    pub fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    /// Black color
    pub fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    /// Converts to hex string (e.g., "FFFFFF" or "FFFFFFFF" with alpha)
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }

    /// Converts to FFmpeg color syntax (`0xRRGGBB` or `0xRRGGBB@0.70`)
    pub fn to_ffmpeg(&self) -> String {
        let base = format!("0x{:02X}{:02X}{:02X}", self.r, self.g, self.b);
        if self.a == 255 {
            base
        } else {
            format!("{}@{:.2}", base, self.a as f64 / 255.0)
        }
    }

    /// Converts to ASS/SSA color format (&HAABBGGRR)
    pub fn to_ass_color(&self) -> String {
        format!(
            "&H{:02X}{:02X}{:02X}{:02X}",
            255 - self.a,
            self.b,
            self.g,
            self.r
        )
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::white()
    }
}

/// Solid box drawn behind caption text
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundSpec {
    /// Box color, alpha controls translucency
    pub color: Color,
    /// Padding between text and box edge
    pub padding_px: u32,
}

/// Linear opacity ramps at both ends of a caption's display window
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FadeSpec {
    /// Fade-in duration in seconds
    pub fade_in: TimeSec,
    /// Fade-out duration in seconds
    pub fade_out: TimeSec,
}

impl FadeSpec {
    /// Same duration on both ends
    pub fn symmetric(duration: TimeSec) -> Self {
        Self {
            fade_in: duration,
            fade_out: duration,
        }
    }
}

// =============================================================================
// Style Profile
// =============================================================================

/// Visual style of a caption, referenced by [`CaptionSegment::style_id`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleProfile {
    /// Unique style id
    pub id: StyleId,
    /// Font family name (informational for overlay mode, used by ASS)
    pub font_family: String,
    /// Font size in pixels
    pub font_size_px: u32,
    /// Text fill color
    pub text_color: Color,
    /// Outline (border) color
    pub outline_color: Color,
    /// Outline width in pixels
    pub outline_width_px: u32,
    /// Optional background box
    #[serde(default)]
    pub background: Option<BackgroundSpec>,
    /// Vertical placement
    #[serde(default)]
    pub position: Position,
    /// Horizontal alignment
    #[serde(default)]
    pub alignment: HorizontalAlign,
    /// Distance from the bottom (or top) edge in pixels
    pub margin_bottom_px: u32,
    /// Optional fade in/out
    #[serde(default)]
    pub fade: Option<FadeSpec>,
}

impl StyleProfile {
    /// White text with a black outline near the bottom edge
    pub fn main() -> Self {
        Self {
            id: StyleId::main(),
            font_family: "Noto Sans CJK SC".to_string(),
            font_size_px: 48,
            text_color: Color::white(),
            outline_color: Color::black(),
            outline_width_px: 3,
            background: None,
            position: Position::Bottom,
            alignment: HorizontalAlign::Center,
            margin_bottom_px: 80,
            fade: Some(FadeSpec::symmetric(0.2)),
        }
    }

    /// Centered title card style
    pub fn title() -> Self {
        Self {
            id: StyleId::title(),
            font_size_px: 40,
            position: Position::Center,
            margin_bottom_px: 0,
            ..Self::main()
        }
    }

    /// Main style over a translucent black box
    pub fn boxed() -> Self {
        Self {
            id: StyleId::new(StyleId::BOXED),
            background: Some(BackgroundSpec {
                color: Color::rgba(0, 0, 0, 178),
                padding_px: 12,
            }),
            ..Self::main()
        }
    }

    /// The built-in style set
    pub fn builtin() -> Vec<Self> {
        vec![Self::main(), Self::title(), Self::boxed()]
    }
}

/// Immutable collection of styles, keyed by id
#[derive(Clone, Debug)]
pub struct StyleBook {
    styles: HashMap<StyleId, StyleProfile>,
    fallback: StyleProfile,
}

impl StyleBook {
    /// Builds a style book. The `main` profile (or the built-in one when
    /// absent) is used for unknown ids.
    pub fn new(profiles: impl IntoIterator<Item = StyleProfile>) -> Self {
        let styles: HashMap<StyleId, StyleProfile> = profiles
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();
        let fallback = styles
            .get(&StyleId::main())
            .cloned()
            .unwrap_or_else(StyleProfile::main);
        Self { styles, fallback }
    }

    /// Style book containing only the built-in profiles
    pub fn builtin() -> Self {
        Self::new(StyleProfile::builtin())
    }

    /// Looks up a style, falling back to `main` for unknown ids
    pub fn get(&self, id: &StyleId) -> &StyleProfile {
        match self.styles.get(id) {
            Some(profile) => profile,
            None => {
                warn!("Unknown caption style '{}', using '{}'", id, self.fallback.id);
                &self.fallback
            }
        }
    }

    /// Owned lookup, convenient as a renderer style callback
    pub fn lookup(&self, id: &StyleId) -> StyleProfile {
        self.get(id).clone()
    }

    pub fn contains(&self, id: &StyleId) -> bool {
        self.styles.contains_key(id)
    }

    /// All profiles sorted by id
    pub fn profiles(&self) -> Vec<&StyleProfile> {
        let mut profiles: Vec<&StyleProfile> = self.styles.values().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }
}

impl Default for StyleBook {
    fn default() -> Self {
        Self::builtin()
    }
}

// =============================================================================
// Segmentation and Timing Inputs
// =============================================================================

/// A caption-sized line of narration text.
///
/// `text` is what is displayed. `trailing` holds the whitespace that followed
/// the line in the narration, so concatenating `source_text()` over all lines
/// gives back the input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLine {
    text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    trailing: String,
}

impl TextLine {
    /// Creates a line from text, trimming it. Returns `None` for blank text.
    pub fn new(text: impl AsRef<str>) -> Option<Self> {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self {
                text: trimmed.to_string(),
                trailing: String::new(),
            })
        }
    }

    /// Creates a line from a slice of narration, keeping its trailing
    /// whitespace aside. Returns `None` for blank text.
    pub fn from_source(raw: &str) -> Option<Self> {
        let body = raw.trim_end();
        if body.trim_start().is_empty() {
            return None;
        }
        Some(Self {
            text: body.to_string(),
            trailing: raw[body.len()..].to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The line as it appeared in the narration, trailing whitespace included
    pub fn source_text(&self) -> String {
        format!("{}{}", self.text, self.trailing)
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Coarse timing for one narration chunk, supplied by the speech synthesizer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampHint {
    pub text: String,
    pub start: TimeSec,
    pub end: TimeSec,
}

impl TimestampHint {
    pub fn new(text: impl Into<String>, start: TimeSec, end: TimeSec) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// Word-level timing produced by a forced aligner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordTimestamp {
    pub word: String,
    pub start: TimeSec,
    pub end: TimeSec,
    /// Model confidence (0.0 - 1.0)
    pub confidence: f64,
}

impl WordTimestamp {
    pub fn new(word: impl Into<String>, start: TimeSec, end: TimeSec, confidence: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
            confidence,
        }
    }
}

// =============================================================================
// Caption Segment
// =============================================================================

/// A single timed, styled caption
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionSegment {
    /// Caption text (may contain '\n' line breaks)
    pub text: String,
    /// Start time in seconds
    pub start_time: TimeSec,
    /// End time in seconds
    pub end_time: TimeSec,
    /// `end_time - start_time`, kept in sync by [`CaptionSegment::set_times`]
    pub duration: TimeSec,
    /// Style reference
    #[serde(default)]
    pub style_id: StyleId,
    /// Vertical placement
    #[serde(default)]
    pub position: Position,
    /// Timing confidence (0.0 - 1.0)
    pub confidence: f64,
}

impl CaptionSegment {
    /// Creates a segment in the default style with full confidence
    pub fn new(text: impl Into<String>, start_time: TimeSec, end_time: TimeSec) -> Self {
        Self {
            text: text.into(),
            start_time,
            end_time,
            duration: end_time - start_time,
            style_id: StyleId::main(),
            position: Position::Bottom,
            confidence: 1.0,
        }
    }

    /// Sets the confidence, clamped to [0, 1]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Applies a style id and takes its position
    pub fn with_style(mut self, style: &StyleProfile) -> Self {
        self.style_id = style.id.clone();
        self.position = style.position;
        self
    }

    /// Updates both boundaries and the cached duration
    pub fn set_times(&mut self, start_time: TimeSec, end_time: TimeSec) {
        self.start_time = start_time;
        self.end_time = end_time;
        self.duration = end_time - start_time;
    }

    /// Character count, ignoring line breaks
    pub fn char_count(&self) -> usize {
        self.text.chars().filter(|c| *c != '\n').count()
    }

    /// Checks if the caption is visible at the given time
    pub fn is_visible_at(&self, time: TimeSec) -> bool {
        time >= self.start_time && time < self.end_time
    }

    /// Checks if this caption overlaps with another
    pub fn overlaps(&self, other: &CaptionSegment) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Color Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_color_hex() {
        assert_eq!(Color::white().to_hex(), "FFFFFF");
        assert_eq!(Color::rgba(255, 0, 0, 128).to_hex(), "FF000080");
    }

    #[test]
    fn test_color_ffmpeg_format() {
        assert_eq!(Color::white().to_ffmpeg(), "0xFFFFFF");
        assert_eq!(Color::rgba(0, 0, 0, 178).to_ffmpeg(), "0x000000@0.70");
    }

    #[test]
    fn test_color_ass_format() {
        // ASS stores inverted alpha and BGR order
        assert_eq!(Color::rgb(255, 128, 0).to_ass_color(), "&H000080FF");
        assert_eq!(Color::rgba(0, 0, 0, 0).to_ass_color(), "&HFF000000");
    }

    // -------------------------------------------------------------------------
    // Style Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_builtin_styles() {
        let main = StyleProfile::main();
        assert_eq!(main.font_size_px, 48);
        assert_eq!(main.outline_width_px, 3);
        assert_eq!(main.margin_bottom_px, 80);
        assert!(main.background.is_none());

        let title = StyleProfile::title();
        assert_eq!(title.position, Position::Center);
        assert_eq!(title.font_size_px, 40);

        let boxed = StyleProfile::boxed();
        assert_eq!(boxed.background.map(|b| b.padding_px), Some(12));
    }

    #[test]
    fn test_style_book_fallback() {
        let book = StyleBook::builtin();
        assert!(book.contains(&StyleId::title()));
        assert_eq!(book.get(&StyleId::new("missing")).id, StyleId::main());
        assert_eq!(book.profiles().len(), 3);
    }

    #[test]
    fn test_style_book_custom_main_is_fallback() {
        let custom = StyleProfile {
            font_size_px: 60,
            ..StyleProfile::main()
        };
        let book = StyleBook::new(vec![custom]);
        assert_eq!(book.get(&StyleId::new("nope")).font_size_px, 60);
    }

    // -------------------------------------------------------------------------
    // Text Line Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_text_line_trims_and_rejects_blank() {
        assert_eq!(TextLine::new("  hi  ").unwrap().text(), "hi");
        assert!(TextLine::new("   ").is_none());
        assert_eq!(TextLine::new("你好。").unwrap().char_len(), 3);

        let line = TextLine::from_source("我喜欢 ").unwrap();
        assert_eq!(line.text(), "我喜欢");
        assert_eq!(line.char_len(), 3);
        assert_eq!(line.source_text(), "我喜欢 ");
        assert!(TextLine::from_source(" \t").is_none());
    }

    // -------------------------------------------------------------------------
    // Segment Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_segment_times_and_duration() {
        let mut seg = CaptionSegment::new("Hello", 1.0, 2.5);
        assert!((seg.duration - 1.5).abs() < 1e-9);

        seg.set_times(2.0, 4.0);
        assert!((seg.duration - 2.0).abs() < 1e-9);
        assert!(seg.is_visible_at(3.0));
        assert!(!seg.is_visible_at(4.0));
    }

    #[test]
    fn test_segment_confidence_clamped() {
        assert_eq!(CaptionSegment::new("a", 0.0, 1.0).with_confidence(1.7).confidence, 1.0);
        assert_eq!(CaptionSegment::new("a", 0.0, 1.0).with_confidence(f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_segment_overlap() {
        let a = CaptionSegment::new("a", 0.0, 2.0);
        let b = CaptionSegment::new("b", 1.5, 3.0);
        let c = CaptionSegment::new("c", 2.0, 3.0);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_segment_with_style_takes_position() {
        let seg = CaptionSegment::new("标题", 0.0, 3.0).with_style(&StyleProfile::title());
        assert_eq!(seg.style_id, StyleId::title());
        assert_eq!(seg.position, Position::Center);
    }

    #[test]
    fn test_segment_serialization() {
        let seg = CaptionSegment::new("Hello", 0.0, 1.0);
        let json = serde_json::to_string(&seg).unwrap();
        assert!(json.contains("\"startTime\":0.0"));
        assert!(json.contains("\"styleId\":\"main\""));
        let back: CaptionSegment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seg);
    }
}
