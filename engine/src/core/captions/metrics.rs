//! Glyph Metrics
//!
//! Measures the rendered pixel width of caption text. The first font file
//! found among the configured candidates is loaded once per process; parsed
//! faces are cached per font size. Measurement never fails: without a usable
//! font it falls back to a per-character estimate.

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{debug, info, warn};

use crate::core::PixelWidth;

/// Width of one character relative to the font size, used without a font
pub const ESTIMATE_CHAR_WIDTH_RATIO: f64 = 0.8;

/// Default font search order (CJK-capable faces first)
pub fn default_font_candidates() -> Vec<PathBuf> {
    [
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "C:/Windows/Fonts/msyh.ttc",
        "/System/Library/Fonts/PingFang.ttc",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

/// Something that can report a rendered text width
pub trait MeasureGlyph: Send + Sync {
    fn measure(&self, text: &str, font_size_px: u32) -> PixelWidth;
}

struct ResolvedFont {
    path: PathBuf,
    bytes: Arc<Vec<u8>>,
}

/// Process-wide glyph metrics cache.
///
/// Shared between pipelines through `Arc<GlyphMetrics>`. Font resolution and
/// per-size face parsing each happen once; afterwards lookups only take the
/// read lock.
pub struct GlyphMetrics {
    candidates: Vec<PathBuf>,
    outline_width_px: u32,
    font: OnceLock<Option<ResolvedFont>>,
    faces: RwLock<HashMap<u32, Option<Arc<Font>>>>,
}

impl GlyphMetrics {
    pub fn new(candidates: Vec<PathBuf>, outline_width_px: u32) -> Self {
        Self {
            candidates,
            outline_width_px,
            font: OnceLock::new(),
            faces: RwLock::new(HashMap::new()),
        }
    }

    /// Metrics that never load a font and always estimate
    pub fn estimate_only(outline_width_px: u32) -> Self {
        Self::new(Vec::new(), outline_width_px)
    }

    /// Path of the resolved font, resolving it on first call
    pub fn font_path(&self) -> Option<&Path> {
        self.resolved().map(|f| f.path.as_path())
    }

    pub fn outline_width_px(&self) -> u32 {
        self.outline_width_px
    }

    /// Measures `text` at `font_size_px`, including the outline on both sides
    pub fn measure(&self, text: &str, font_size_px: u32) -> PixelWidth {
        let outline = self.outline_width_px.saturating_mul(2);
        if text.is_empty() {
            return 0;
        }
        match self.face(font_size_px) {
            Some(face) => layout_width(&face, text, font_size_px as f32).saturating_add(outline),
            None => self.estimate(text, font_size_px),
        }
    }

    /// Heuristic width: `chars * size * 0.8`, plus outline
    pub fn estimate(&self, text: &str, font_size_px: u32) -> PixelWidth {
        let chars = text.chars().count() as f64;
        let width = (chars * font_size_px as f64 * ESTIMATE_CHAR_WIDTH_RATIO).round();
        (width as PixelWidth).saturating_add(self.outline_width_px.saturating_mul(2))
    }

    fn resolved(&self) -> Option<&ResolvedFont> {
        self.font
            .get_or_init(|| resolve_font(&self.candidates))
            .as_ref()
    }

    fn face(&self, font_size_px: u32) -> Option<Arc<Font>> {
        {
            let faces = self.faces.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = faces.get(&font_size_px) {
                return cached.clone();
            }
        }

        let resolved = self.resolved()?;
        let mut faces = self.faces.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have populated the entry while we waited.
        if let Some(cached) = faces.get(&font_size_px) {
            return cached.clone();
        }

        let settings = FontSettings {
            scale: font_size_px.max(1) as f32,
            ..FontSettings::default()
        };
        let face = match Font::from_bytes(resolved.bytes.as_slice(), settings) {
            Ok(font) => {
                debug!(size = font_size_px, "Parsed font face for measurement");
                Some(Arc::new(font))
            }
            Err(e) => {
                warn!(
                    "Failed to parse font {} at {}px, estimating widths: {}",
                    resolved.path.display(),
                    font_size_px,
                    e
                );
                None
            }
        };
        faces.insert(font_size_px, face.clone());
        face
    }
}

impl MeasureGlyph for GlyphMetrics {
    fn measure(&self, text: &str, font_size_px: u32) -> PixelWidth {
        GlyphMetrics::measure(self, text, font_size_px)
    }
}

impl std::fmt::Debug for GlyphMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlyphMetrics")
            .field("candidates", &self.candidates)
            .field("outline_width_px", &self.outline_width_px)
            .finish_non_exhaustive()
    }
}

fn resolve_font(candidates: &[PathBuf]) -> Option<ResolvedFont> {
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match std::fs::read(path) {
            Ok(bytes) => {
                info!("Using font for caption measurement: {}", path.display());
                return Some(ResolvedFont {
                    path: path.clone(),
                    bytes: Arc::new(bytes),
                });
            }
            Err(e) => warn!("Failed to read font {}: {}", path.display(), e),
        }
    }
    warn!("No caption font found, falling back to width estimates");
    None
}

/// Width of the laid-out glyph bounding box
fn layout_width(font: &Font, text: &str, px: f32) -> PixelWidth {
    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&LayoutSettings::default());
    layout.append(&[font], &TextStyle::new(text, px, 0));

    let mut left = f32::MAX;
    let mut right = f32::MIN;
    for glyph in layout.glyphs() {
        let advance = font.metrics(glyph.parent, px).advance_width;
        left = left.min(glyph.x);
        right = right.max(glyph.x + (glyph.width as f32).max(advance));
    }
    if right <= left {
        return 0;
    }
    (right - left).ceil() as PixelWidth
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_estimate_without_font() {
        let metrics = GlyphMetrics::estimate_only(3);
        // 5 chars * 48 * 0.8 = 192, plus 2 * 3 outline
        assert_eq!(metrics.measure("你好世界啊", 48), 198);
        assert!(metrics.font_path().is_none());
    }

    #[test]
    fn test_empty_text_has_zero_width() {
        let metrics = GlyphMetrics::estimate_only(3);
        assert_eq!(metrics.measure("", 48), 0);
    }

    #[test]
    fn test_missing_candidates_fall_back() {
        let metrics = GlyphMetrics::new(vec![PathBuf::from("/definitely/not/a/font.ttf")], 0);
        assert_eq!(metrics.measure("abcd", 10), 32);
        assert!(metrics.font_path().is_none());
    }

    #[test]
    fn test_unparseable_font_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();

        let metrics = GlyphMetrics::new(vec![bogus.clone()], 1);
        assert_eq!(metrics.font_path(), Some(bogus.as_path()));
        assert_eq!(metrics.measure("ab", 10), metrics.estimate("ab", 10));
    }

    #[test]
    fn test_width_grows_with_text() {
        let metrics = GlyphMetrics::new(default_font_candidates(), 3);
        let short = metrics.measure("Hi", 48);
        let long = metrics.measure("Hello there, friend", 48);
        assert!(long > short);
    }

    #[test]
    fn test_concurrent_measurement() {
        let metrics = Arc::new(GlyphMetrics::new(default_font_candidates(), 3));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || metrics.measure("字幕测试", 40 + i))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap() > 0);
        }
    }
}
