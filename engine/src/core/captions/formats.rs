//! Subtitle Format Parsers and Exporters
//!
//! Supports three interchange formats:
//! - SRT (SubRip): `HH:MM:SS,mmm`
//! - ASS (Advanced SubStation Alpha): `H:MM:SS.cc`, with a style column
//! - VTT (WebVTT): `MM:SS.mmm` after a `WEBVTT` header
//!
//! Exported timestamps parse back to the same millisecond for SRT and VTT,
//! and to the same centisecond for ASS.
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::core::captions::{CaptionFormatter, FormatVariant, parse_captions};
//!
//! let srt = CaptionFormatter::default().format(&segments, FormatVariant::Srt);
//! let back = parse_captions(&srt, FormatVariant::Srt)?;
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::info;

use super::models::{CaptionSegment, HorizontalAlign, Position, StyleBook, StyleProfile};
use crate::core::{CaptionResult, StyleId};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during subtitle parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Invalid cue or event format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Unexpected end of input")]
    UnexpectedEnd,
}

// =============================================================================
// Format Variants
// =============================================================================

/// Supported subtitle formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FormatVariant {
    /// SubRip
    #[default]
    Srt,
    /// Advanced SubStation Alpha
    Ass,
    /// WebVTT
    #[serde(alias = "webvtt")]
    Vtt,
}

impl FormatVariant {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            FormatVariant::Srt => "srt",
            FormatVariant::Ass => "ass",
            FormatVariant::Vtt => "vtt",
        }
    }

    /// Detects the variant from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl std::str::FromStr for FormatVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "srt" => Ok(FormatVariant::Srt),
            "ass" | "ssa" => Ok(FormatVariant::Ass),
            "vtt" | "webvtt" => Ok(FormatVariant::Vtt),
            other => Err(format!("Unknown subtitle format: {}", other)),
        }
    }
}

impl std::fmt::Display for FormatVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

// =============================================================================
// Formatter
// =============================================================================

/// Serializes caption segments to subtitle text
#[derive(Clone, Debug)]
pub struct CaptionFormatter {
    styles: StyleBook,
    play_res: (u32, u32),
}

impl CaptionFormatter {
    /// Default script resolution (vertical 720x1280 video)
    pub const DEFAULT_PLAY_RES: (u32, u32) = (720, 1280);

    pub fn new(styles: StyleBook) -> Self {
        Self {
            styles,
            play_res: Self::DEFAULT_PLAY_RES,
        }
    }

    /// Sets the ASS script resolution that style sizes are relative to
    pub fn with_play_res(mut self, width: u32, height: u32) -> Self {
        self.play_res = (width.max(1), height.max(1));
        self
    }

    /// Formats segments in the requested variant
    pub fn format(&self, segments: &[CaptionSegment], variant: FormatVariant) -> String {
        match variant {
            FormatVariant::Srt => export_srt(segments),
            FormatVariant::Ass => export_ass(segments, &self.styles, self.play_res),
            FormatVariant::Vtt => export_vtt(segments),
        }
    }

    /// Writes segments to `path`, replacing its extension with the variant's.
    /// The file appears atomically. Returns the final path.
    pub fn save(
        &self,
        segments: &[CaptionSegment],
        path: &Path,
        variant: FormatVariant,
    ) -> CaptionResult<PathBuf> {
        let target = path.with_extension(variant.extension());
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(self.format(segments, variant).as_bytes())?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| e.error)?;

        info!(
            "Saved {} captions to {} ({})",
            segments.len(),
            target.display(),
            variant
        );
        Ok(target)
    }
}

impl Default for CaptionFormatter {
    fn default() -> Self {
        Self::new(StyleBook::builtin())
    }
}

/// Parses subtitle text in the given variant
pub fn parse_captions(content: &str, variant: FormatVariant) -> Result<Vec<CaptionSegment>, ParseError> {
    match variant {
        FormatVariant::Srt => parse_srt(content),
        FormatVariant::Ass => parse_ass(content),
        FormatVariant::Vtt => parse_vtt(content),
    }
}

/// Rounds seconds to whole milliseconds
fn to_millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

fn strip_bom(content: &str) -> &str {
    content.trim_start_matches('\u{feff}')
}

/// Collects the text lines of one cue, stopping at a blank line
fn take_cue_text<'a, I>(lines: &mut std::iter::Peekable<I>) -> Vec<&'a str>
where
    I: Iterator<Item = &'a str>,
{
    let mut text_lines = Vec::new();
    while let Some(line) = lines.next_if(|l| !l.trim().is_empty()) {
        text_lines.push(line);
    }
    text_lines
}

fn split_arrow(line: &str) -> Result<(&str, &str), ParseError> {
    line.split_once("-->")
        .map(|(start, end)| (start.trim(), end.trim()))
        .ok_or_else(|| {
            ParseError::InvalidFormat(format!("Expected 'start --> end' format: {}", line))
        })
}

fn parse_number(part: &str, ts: &str) -> Result<f64, ParseError> {
    part.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| ParseError::InvalidTimestamp(ts.to_string()))
}

// =============================================================================
// SRT Format
// =============================================================================

/// Parses SRT (SubRip) content
///
/// # SRT Format
///
/// ```text
/// 1
/// 00:00:01,000 --> 00:00:04,000
/// First caption text
///
/// 2
/// 00:00:05,500 --> 00:00:08,000
/// Second caption text
/// with multiple lines
/// ```
pub fn parse_srt(content: &str) -> Result<Vec<CaptionSegment>, ParseError> {
    let mut segments = Vec::new();
    let mut lines = strip_bom(content).lines().peekable();

    loop {
        while lines.next_if(|l| l.trim().is_empty()).is_some() {}
        let Some(first) = lines.next() else {
            break;
        };

        // The sequence number is optional in practice.
        let timestamp_line = if first.contains("-->") {
            first
        } else {
            lines.next().ok_or(ParseError::UnexpectedEnd)?
        };
        let (start, end) = split_arrow(timestamp_line)?;
        let start = parse_srt_timestamp(start)?;
        let end = parse_srt_timestamp(end)?;

        let text_lines = take_cue_text(&mut lines);
        if text_lines.is_empty() {
            return Err(ParseError::MissingData("Caption text".to_string()));
        }
        segments.push(CaptionSegment::new(text_lines.join("\n"), start, end));
    }

    Ok(segments)
}

/// Parses an SRT timestamp (e.g., "00:01:23,456") into seconds
fn parse_srt_timestamp(ts: &str) -> Result<f64, ParseError> {
    // Format: HH:MM:SS,mmm (a '.' separator is tolerated)
    let normalized = ts.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();
    if parts.len() != 3 {
        return Err(ParseError::InvalidTimestamp(ts.to_string()));
    }

    let hours = parse_number(parts[0], ts)?;
    let minutes = parse_number(parts[1], ts)?;
    let seconds = parse_number(parts[2], ts)?;

    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Exports segments to SRT format
pub fn export_srt(segments: &[CaptionSegment]) -> String {
    let mut output = String::new();

    for (index, segment) in segments.iter().enumerate() {
        output.push_str(&format!("{}\n", index + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(segment.start_time),
            format_srt_timestamp(segment.end_time)
        ));
        output.push_str(&segment.text);
        output.push_str("\n\n");
    }

    output.trim_end().to_string()
}

/// Formats seconds as SRT timestamp (00:00:00,000)
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = to_millis(seconds);
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, ms)
}

// =============================================================================
// ASS Format
// =============================================================================

const ASS_STYLE_FORMAT: &str = "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding";

const ASS_EVENT_FORMAT: &str =
    "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text";

/// Numpad-style alignment used by ASS (1-3 bottom, 4-6 middle, 7-9 top)
pub fn ass_alignment(position: Position, alignment: HorizontalAlign) -> u8 {
    let column = match alignment {
        HorizontalAlign::Left => 1,
        HorizontalAlign::Center => 2,
        HorizontalAlign::Right => 3,
    };
    let row = match position {
        Position::Bottom => 0,
        Position::Center => 3,
        Position::Top => 6,
    };
    row + column
}

fn ass_style_line(style: &StyleProfile) -> String {
    // BorderStyle 3 draws an opaque box in BackColour instead of an outline.
    let (border_style, back_colour, outline) = match &style.background {
        Some(bg) => (3, bg.color.to_ass_color(), bg.padding_px),
        None => (1, style.outline_color.to_ass_color(), style.outline_width_px),
    };
    format!(
        "Style: {},{},{},{},{},{},{},0,0,0,0,100,100,0,0,{},{},0,{},20,20,{},1",
        style.id,
        style.font_family,
        style.font_size_px,
        style.text_color.to_ass_color(),
        style.text_color.to_ass_color(),
        style.outline_color.to_ass_color(),
        back_colour,
        border_style,
        outline,
        ass_alignment(style.position, style.alignment),
        style.margin_bottom_px
    )
}

/// Exports segments to ASS with a styles section built from `styles`
pub fn export_ass(segments: &[CaptionSegment], styles: &StyleBook, play_res: (u32, u32)) -> String {
    let mut output = String::new();
    output.push_str("[Script Info]\n");
    output.push_str("ScriptType: v4.00+\n");
    output.push_str(&format!("PlayResX: {}\n", play_res.0));
    output.push_str(&format!("PlayResY: {}\n", play_res.1));
    output.push_str("WrapStyle: 2\n");
    output.push_str("ScaledBorderAndShadow: yes\n\n");

    output.push_str("[V4+ Styles]\n");
    output.push_str(ASS_STYLE_FORMAT);
    output.push('\n');
    for style in styles.profiles() {
        output.push_str(&ass_style_line(style));
        output.push('\n');
    }
    // Segments may reference ids outside the book; they render with the fallback.
    let mut unknown: Vec<&StyleId> = segments
        .iter()
        .map(|s| &s.style_id)
        .filter(|id| !styles.contains(id))
        .collect();
    unknown.sort();
    unknown.dedup();
    for id in unknown {
        let fallback = StyleProfile {
            id: id.clone(),
            ..styles.get(id).clone()
        };
        output.push_str(&ass_style_line(&fallback));
        output.push('\n');
    }
    output.push('\n');

    output.push_str("[Events]\n");
    output.push_str(ASS_EVENT_FORMAT);
    output.push('\n');
    for segment in segments {
        output.push_str(&format!(
            "Dialogue: 0,{},{},{},,0,0,0,,{}\n",
            format_ass_timestamp(segment.start_time),
            format_ass_timestamp(segment.end_time),
            segment.style_id,
            segment.text.replace("\r\n", "\n").replace('\n', "\\N")
        ));
    }

    output.trim_end().to_string()
}

/// Formats seconds as ASS timestamp (0:00:00.00)
pub fn format_ass_timestamp(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    format!("{}:{:02}:{:02}.{:02}", hours, mins, secs, cs)
}

/// Parses an ASS timestamp (e.g., "0:01:23.45") into seconds
fn parse_ass_timestamp(ts: &str) -> Result<f64, ParseError> {
    let parts: Vec<&str> = ts.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(ParseError::InvalidTimestamp(ts.to_string()));
    }
    let hours = parse_number(parts[0], ts)?;
    let minutes = parse_number(parts[1], ts)?;
    let seconds = parse_number(parts[2], ts)?;
    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// `{\b1}`-style override blocks
static ASS_OVERRIDE_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}").expect("override tag pattern is valid"));

/// Column positions of the fields this parser needs
struct EventColumns {
    count: usize,
    start: usize,
    end: usize,
    style: usize,
    text: usize,
}

impl EventColumns {
    fn standard() -> Self {
        Self {
            count: 10,
            start: 1,
            end: 2,
            style: 3,
            text: 9,
        }
    }

    fn from_format_line(fields: &str) -> Result<Self, ParseError> {
        let names: Vec<String> = fields
            .split(',')
            .map(|f| f.trim().to_ascii_lowercase())
            .collect();
        let find = |name: &str| {
            names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| ParseError::MissingData(format!("Event column '{}'", name)))
        };
        let text = find("text")?;
        if text + 1 != names.len() {
            return Err(ParseError::InvalidFormat(
                "Text must be the last event column".to_string(),
            ));
        }
        Ok(Self {
            count: names.len(),
            start: find("start")?,
            end: find("end")?,
            style: find("style")?,
            text,
        })
    }
}

/// Parses ASS/SSA content. Only `Dialogue` events are read; the style
/// column becomes the segment's `style_id`.
pub fn parse_ass(content: &str) -> Result<Vec<CaptionSegment>, ParseError> {
    let mut segments = Vec::new();
    let mut in_events = false;
    let mut saw_events = false;
    let mut columns = EventColumns::standard();

    for line in strip_bom(content).lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_events = line.eq_ignore_ascii_case("[events]");
            saw_events |= in_events;
            continue;
        }
        if !in_events {
            continue;
        }

        if let Some(fields) = line.strip_prefix("Format:") {
            columns = EventColumns::from_format_line(fields)?;
            continue;
        }
        let Some(fields) = line.strip_prefix("Dialogue:") else {
            continue;
        };

        let values: Vec<&str> = fields.trim_start().splitn(columns.count, ',').collect();
        if values.len() != columns.count {
            return Err(ParseError::InvalidFormat(format!(
                "Expected {} event fields: {}",
                columns.count, line
            )));
        }

        let start = parse_ass_timestamp(values[columns.start])?;
        let end = parse_ass_timestamp(values[columns.end])?;
        let text = ASS_OVERRIDE_TAGS
            .replace_all(values[columns.text], "")
            .replace("\\N", "\n")
            .replace("\\n", "\n");
        if text.trim().is_empty() {
            return Err(ParseError::MissingData("Caption text".to_string()));
        }

        let mut segment = CaptionSegment::new(text, start, end);
        segment.style_id = StyleId::new(values[columns.style].trim());
        segments.push(segment);
    }

    if !saw_events {
        return Err(ParseError::InvalidFormat(
            "ASS file has no [Events] section".to_string(),
        ));
    }

    Ok(segments)
}

// =============================================================================
// VTT Format
// =============================================================================

/// Parses WebVTT content
///
/// # VTT Format
///
/// ```text
/// WEBVTT
///
/// 00:01.000 --> 00:04.000
/// First caption text
///
/// 01:00:05.500 --> 01:00:08.000
/// Second caption text
/// ```
pub fn parse_vtt(content: &str) -> Result<Vec<CaptionSegment>, ParseError> {
    let mut segments = Vec::new();
    let mut lines = strip_bom(content).lines().peekable();

    match lines.next() {
        Some(header) if header.starts_with("WEBVTT") => {}
        _ => {
            return Err(ParseError::InvalidFormat(
                "VTT file must start with WEBVTT".to_string(),
            ))
        }
    }

    // Header metadata runs until the first blank line.
    while lines.next_if(|l| !l.trim().is_empty()).is_some() {}

    loop {
        while lines.next_if(|l| l.trim().is_empty()).is_some() {}
        let Some(first) = lines.next() else {
            break;
        };

        // NOTE and STYLE blocks carry no cues.
        if first.starts_with("NOTE") || first.starts_with("STYLE") || first.starts_with("REGION") {
            take_cue_text(&mut lines);
            continue;
        }

        let timestamp_line = if first.contains("-->") {
            first
        } else {
            // Cue identifier
            lines.next().ok_or(ParseError::UnexpectedEnd)?
        };
        let (start, end_part) = split_arrow(timestamp_line)?;
        // Cue settings may follow the end timestamp.
        let end = end_part.split_whitespace().next().unwrap_or(end_part);
        let start = parse_vtt_timestamp(start)?;
        let end = parse_vtt_timestamp(end)?;

        let text_lines = take_cue_text(&mut lines);
        if text_lines.is_empty() {
            return Err(ParseError::MissingData("Caption text".to_string()));
        }
        let text = text_lines
            .iter()
            .map(|l| strip_vtt_tags(l))
            .collect::<Vec<_>>()
            .join("\n");
        segments.push(CaptionSegment::new(text, start, end));
    }

    Ok(segments)
}

/// Parses a VTT timestamp ("01:23.456" or "00:01:23.456") into seconds
fn parse_vtt_timestamp(ts: &str) -> Result<f64, ParseError> {
    let parts: Vec<&str> = ts.split(':').collect();
    match parts.as_slice() {
        [minutes, seconds] => Ok(parse_number(minutes, ts)? * 60.0 + parse_number(seconds, ts)?),
        [hours, minutes, seconds] => Ok(parse_number(hours, ts)? * 3600.0
            + parse_number(minutes, ts)? * 60.0
            + parse_number(seconds, ts)?),
        _ => Err(ParseError::InvalidTimestamp(ts.to_string())),
    }
}

/// Strips VTT formatting tags such as `<b>` or `<c.yellow>`
fn strip_vtt_tags(text: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;

    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result
}

/// Exports segments to WebVTT format
pub fn export_vtt(segments: &[CaptionSegment]) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for segment in segments {
        output.push_str(&format!(
            "{} --> {}\n",
            format_vtt_timestamp(segment.start_time),
            format_vtt_timestamp(segment.end_time)
        ));
        output.push_str(&segment.text);
        output.push_str("\n\n");
    }

    output.trim_end().to_string()
}

/// Formats seconds as VTT timestamp (MM:SS.mmm, minutes not wrapped)
pub fn format_vtt_timestamp(seconds: f64) -> String {
    let total_ms = to_millis(seconds);
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = total_secs / 60;

    format!("{:02}:{:02}.{:03}", mins, secs, ms)
}

// =============================================================================
// Tests
// =============================================================================
