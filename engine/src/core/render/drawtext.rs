//! FFmpeg filter construction for caption burn-in

use std::path::Path;
use std::sync::Arc;

use crate::core::captions::formats::ass_alignment;
use crate::core::captions::{
    CaptionSegment, GlyphMetrics, HorizontalAlign, LineLimits, Position, StyleProfile,
    TextSegmenter,
};
use crate::core::{LanguageCode, TimeSec};

/// Horizontal inset for left/right aligned captions
const SIDE_MARGIN_PX: u32 = 40;

/// libass lays SRT input out on a 384x288 canvas and scales it to the frame
const LIBASS_SRT_PLAY_RES_Y: u32 = 288;

/// Bounds on characters per wrapped row
const WRAP_MIN_CHARS: u32 = 8;
const WRAP_MAX_CHARS: u32 = 20;

fn is_logographic(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0xFF00..=0xFFEF)
}

/// Breaks caption text into rows for drawtext when it is wider than
/// `wrap_width_px`. Rows hold `wrap_width_px / font_size_px` characters,
/// kept within 8..=20, and are split with the narration segmenter so
/// punctuation stays at row ends. Text that already fits is returned as is.
pub fn wrap_caption_text(text: &str, font_size_px: u32, wrap_width_px: u32) -> String {
    let per_row = (wrap_width_px / font_size_px.max(1)).clamp(WRAP_MIN_CHARS, WRAP_MAX_CHARS);
    if text.lines().all(|row| row.chars().count() <= per_row as usize) {
        return text.to_string();
    }

    let language = if text.chars().any(is_logographic) {
        LanguageCode::Zh
    } else {
        LanguageCode::En
    };
    let segmenter = TextSegmenter::new(Arc::new(GlyphMetrics::estimate_only(0)));
    text.lines()
        .flat_map(|row| segmenter.segment(row, language, LineLimits::chars_only(per_row)))
        .map(|line| line.into_text())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escapes a value for the filter's own `key=value:...` option parser
pub fn escape_filter_value(raw: &str) -> String {
    raw.replace('\\', r"\\")
        .replace(':', r"\:")
        .replace('\'', r"\'")
}

/// Escapes `raw` for the option parser, then single-quotes it for the
/// filtergraph parser. A backslash is literal inside graph-level quotes, so
/// each quote is written as `'\''` (close, escaped quote, reopen).
pub fn quote_filter_value(raw: &str) -> String {
    format!("'{}'", escape_filter_value(raw).replace('\'', r"'\''"))
}

fn horizontal_expr(alignment: HorizontalAlign) -> String {
    match alignment {
        HorizontalAlign::Left => SIDE_MARGIN_PX.to_string(),
        HorizontalAlign::Center => "(w-text_w)/2".to_string(),
        HorizontalAlign::Right => format!("w-text_w-{}", SIDE_MARGIN_PX),
    }
}

fn vertical_expr(position: Position, margin: u32) -> String {
    match position {
        Position::Bottom => format!("h-text_h-{}", margin),
        Position::Center => "(h-text_h)/2".to_string(),
        Position::Top => margin.to_string(),
    }
}

/// Linear opacity ramp over `[start, start+fade_in]` and `[end-fade_out, end]`.
/// Fades longer than half the window are shortened to fit.
fn fade_alpha_expr(start: TimeSec, end: TimeSec, fade_in: TimeSec, fade_out: TimeSec) -> Option<String> {
    let half = ((end - start) / 2.0).max(0.0);
    let fade_in = fade_in.clamp(0.0, half);
    let fade_out = fade_out.clamp(0.0, half);
    if fade_in <= 0.0 && fade_out <= 0.0 {
        return None;
    }

    let rise = if fade_in > 0.0 {
        format!("lt(t,{s:.3}+{fi:.3}),(t-{s:.3})/{fi:.3}", s = start, fi = fade_in)
    } else {
        format!("lt(t,{s:.3}),0", s = start)
    };
    let fall = if fade_out > 0.0 {
        format!("gt(t,{e:.3}-{fo:.3}),({e:.3}-t)/{fo:.3}", e = end, fo = fade_out)
    } else {
        format!("gt(t,{e:.3}),0", e = end)
    };
    Some(format!("if({},if({},1))", rise, fall))
}

/// One drawtext filter for `segment` drawn in `style`
pub fn build_drawtext_filter(
    segment: &CaptionSegment,
    style: &StyleProfile,
    font_file: Option<&Path>,
) -> String {
    let mut params = Vec::with_capacity(12);

    if let Some(font) = font_file {
        params.push(format!(
            "fontfile={}",
            quote_filter_value(&font.to_string_lossy())
        ));
    }
    params.push(format!("text={}", quote_filter_value(&segment.text)));
    params.push("expansion=none".to_string());
    params.push(format!("fontsize={}", style.font_size_px));
    params.push(format!("fontcolor={}", style.text_color.to_ffmpeg()));
    params.push(format!("borderw={}", style.outline_width_px));
    params.push(format!("bordercolor={}", style.outline_color.to_ffmpeg()));

    if let Some(bg) = &style.background {
        params.push("box=1".to_string());
        params.push(format!("boxcolor={}", bg.color.to_ffmpeg()));
        params.push(format!("boxborderw={}", bg.padding_px));
    }

    params.push(format!("x={}", horizontal_expr(style.alignment)));
    params.push(format!(
        "y={}",
        vertical_expr(segment.position, style.margin_bottom_px)
    ));
    params.push(format!(
        "enable={}",
        quote_filter_value(&format!(
            "between(t,{:.3},{:.3})",
            segment.start_time, segment.end_time
        ))
    ));

    if let Some(fade) = &style.fade {
        if let Some(alpha) =
            fade_alpha_expr(segment.start_time, segment.end_time, fade.fade_in, fade.fade_out)
        {
            params.push(format!("alpha={}", quote_filter_value(&alpha)));
        }
    }

    format!("drawtext={}", params.join(":"))
}

/// Joins filters into `[0:v]f1,f2,...[v]`
pub fn build_filter_chain(filters: &[String]) -> String {
    if filters.is_empty() {
        return "[0:v]null[v]".to_string();
    }
    format!("[0:v]{}[v]", filters.join(","))
}

/// libass `force_style` overrides derived from a style profile
pub fn force_style(style: &StyleProfile, frame_height: u32) -> String {
    let frame_height = frame_height.max(1);
    let scale = |px: u32| -> u32 {
        let scaled = (px as f64 * LIBASS_SRT_PLAY_RES_Y as f64 / frame_height as f64).round() as u32;
        if px > 0 {
            scaled.max(1)
        } else {
            0
        }
    };

    let (border_style, back_colour, outline) = match &style.background {
        Some(bg) => (3, bg.color.to_ass_color(), scale(bg.padding_px)),
        None => (
            1,
            style.outline_color.to_ass_color(),
            scale(style.outline_width_px),
        ),
    };

    format!(
        "FontName={},FontSize={},PrimaryColour={},OutlineColour={},BackColour={},BorderStyle={},Outline={},Alignment={},MarginV={}",
        style.font_family,
        scale(style.font_size_px),
        style.text_color.to_ass_color(),
        style.outline_color.to_ass_color(),
        back_colour,
        border_style,
        outline,
        ass_alignment(style.position, style.alignment),
        scale(style.margin_bottom_px)
    )
}

/// `subtitles` filter reading `srt_path` with `force_style` overrides
pub fn build_subtitles_filter(srt_path: &Path, style: &StyleProfile, frame_height: u32) -> String {
    format!(
        "subtitles={}:force_style={}",
        quote_filter_value(&srt_path.to_string_lossy()),
        quote_filter_value(&force_style(style, frame_height))
    )
}
