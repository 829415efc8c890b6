//! Settings Persistence System
//!
//! Provides persistent engine settings with:
//! - Atomic file writes (temp file + rename)
//! - Per-section defaults so partial files load
//! - Normalization that clamps bad values instead of failing
//!
//! Storage location: {config_dir}/captionforge.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use tracing::{info, warn};

use crate::core::captions::{
    default_font_candidates, AlignerConfig, LineLimits, StyleBook, StyleProfile,
};
use crate::core::render::RenderMode;
use crate::core::TimeSec;

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "captionforge.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "captionforge.json.lock";

/// Upper bound for overlays per render pass
pub const MAX_BATCH_SIZE: u32 = 64;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while persisting settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to lock settings file: {0}")]
    Lock(String),

    #[error("Settings IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode settings: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Settings Document
// =============================================================================

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptionSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub segmentation: SegmentationSettings,

    #[serde(default)]
    pub timing: TimingSettings,

    #[serde(default)]
    pub alignment: AlignmentSettings,

    #[serde(default)]
    pub fonts: FontSettings,

    #[serde(default)]
    pub render: RenderSettings,

    /// Caption styles, looked up by id
    #[serde(default = "StyleProfile::builtin")]
    pub styles: Vec<StyleProfile>,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            segmentation: SegmentationSettings::default(),
            timing: TimingSettings::default(),
            alignment: AlignmentSettings::default(),
            fonts: FontSettings::default(),
            render: RenderSettings::default(),
            styles: StyleProfile::builtin(),
        }
    }
}

impl CaptionSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        let seg = &mut self.segmentation;
        seg.max_chars_per_line = seg.max_chars_per_line.clamp(1, 200);
        seg.max_text_width_px = seg.max_text_width_px.clamp(16, 8192);
        seg.font_size_px = seg.font_size_px.clamp(8, 512);

        let timing = &mut self.timing;
        timing.min_duration = clamp_f64(timing.min_duration, 0.05, 10.0);
        timing.max_duration_per_segment =
            clamp_f64(timing.max_duration_per_segment, timing.min_duration, 60.0);
        timing.min_gap = clamp_f64(timing.min_gap, 0.0, 5.0);

        let alignment = &mut self.alignment;
        alignment.provider_confidence = clamp_f64(alignment.provider_confidence, 0.0, 1.0);
        alignment.estimate_confidence = clamp_f64(alignment.estimate_confidence, 0.0, 1.0);

        self.fonts.outline_width_px = self.fonts.outline_width_px.min(32);

        let render = &mut self.render;
        render.batch_size = render.batch_size.clamp(1, MAX_BATCH_SIZE);
        render.final_caption_padding = clamp_f64(render.final_caption_padding, 0.0, 5.0);
        if render.video_codec.trim().is_empty() {
            render.video_codec = default_video_codec();
        }
        render.preset = normalize_enum(
            &render.preset,
            &[
                "ultrafast",
                "superfast",
                "veryfast",
                "faster",
                "fast",
                "medium",
                "slow",
                "slower",
                "veryslow",
            ],
            default_preset(),
        );

        if self.styles.is_empty() {
            self.styles = StyleProfile::builtin();
        }
    }

    /// Line limits for the segmenter
    pub fn line_limits(&self) -> LineLimits {
        LineLimits::new(
            self.segmentation.max_chars_per_line,
            self.segmentation.max_text_width_px,
            self.segmentation.font_size_px,
            self.segmentation.enable_pixel_validation,
        )
    }

    /// Configuration for the alignment strategy chain
    pub fn aligner_config(&self) -> AlignerConfig {
        AlignerConfig {
            min_duration: self.timing.min_duration,
            max_duration_per_segment: self.timing.max_duration_per_segment,
            provider_confidence: self.alignment.provider_confidence,
            estimate_confidence: self.alignment.estimate_confidence,
            enable_forced_alignment: self.alignment.enable_forced_alignment,
            enable_provider_timestamps: self.alignment.enable_provider_timestamps,
        }
    }

    pub fn style_book(&self) -> StyleBook {
        StyleBook::new(self.styles.iter().cloned())
    }
}

fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

fn normalize_enum(value: &str, allowed: &[&str], fallback: String) -> String {
    if allowed.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        value.to_ascii_lowercase()
    } else {
        fallback
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Sections
// =============================================================================

/// Line breaking limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationSettings {
    #[serde(default = "default_max_chars")]
    pub max_chars_per_line: u32,

    /// Usable text width on a 720px wide frame
    #[serde(default = "default_max_width")]
    pub max_text_width_px: u32,

    #[serde(default = "default_font_size")]
    pub font_size_px: u32,

    #[serde(default = "default_true")]
    pub enable_pixel_validation: bool,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            max_chars_per_line: default_max_chars(),
            max_text_width_px: default_max_width(),
            font_size_px: default_font_size(),
            enable_pixel_validation: true,
        }
    }
}

fn default_max_chars() -> u32 {
    10
}

fn default_max_width() -> u32 {
    580
}

fn default_font_size() -> u32 {
    48
}

/// Timing rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimingSettings {
    #[serde(default = "default_min_duration")]
    pub min_duration: TimeSec,

    #[serde(default = "default_max_duration")]
    pub max_duration_per_segment: TimeSec,

    #[serde(default = "default_min_gap")]
    pub min_gap: TimeSec,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            min_duration: default_min_duration(),
            max_duration_per_segment: default_max_duration(),
            min_gap: default_min_gap(),
        }
    }
}

fn default_min_duration() -> TimeSec {
    0.5
}

fn default_max_duration() -> TimeSec {
    3.0
}

fn default_min_gap() -> TimeSec {
    0.1
}

/// Alignment strategy switches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentSettings {
    #[serde(default = "default_true")]
    pub enable_forced_alignment: bool,

    #[serde(default = "default_true")]
    pub enable_provider_timestamps: bool,

    #[serde(default = "default_provider_confidence")]
    pub provider_confidence: f64,

    #[serde(default = "default_estimate_confidence")]
    pub estimate_confidence: f64,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            enable_forced_alignment: true,
            enable_provider_timestamps: true,
            provider_confidence: default_provider_confidence(),
            estimate_confidence: default_estimate_confidence(),
        }
    }
}

fn default_provider_confidence() -> f64 {
    0.8
}

fn default_estimate_confidence() -> f64 {
    0.5
}

/// Font resolution for width measurement and overlays
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FontSettings {
    /// Probed in order; the first existing file wins
    #[serde(default = "default_font_candidates")]
    pub candidates: Vec<PathBuf>,

    #[serde(default = "default_outline_width")]
    pub outline_width_px: u32,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            candidates: default_font_candidates(),
            outline_width_px: default_outline_width(),
        }
    }
}

impl FontSettings {
    /// First candidate present on disk
    pub fn resolve(&self) -> Option<&Path> {
        self.candidates
            .iter()
            .find(|path| path.is_file())
            .map(PathBuf::as_path)
    }
}

fn default_outline_width() -> u32 {
    3
}

/// Burn-in options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderSettings {
    /// Overlays per FFmpeg pass
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Extra seconds the last caption stays past the probed duration
    #[serde(default = "default_final_padding")]
    pub final_caption_padding: TimeSec,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default)]
    pub mode: RenderMode,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            final_caption_padding: default_final_padding(),
            video_codec: default_video_codec(),
            preset: default_preset(),
            mode: RenderMode::default(),
        }
    }
}

fn default_batch_size() -> u32 {
    15
}

fn default_final_padding() -> TimeSec {
    0.1
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_preset() -> String {
    "fast".to_string()
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Settings manager for loading, saving, and resetting settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager rooted at `config_dir`
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            settings_path: config_dir.join(SETTINGS_FILE),
        }
    }

    /// Settings manager for the platform config directory
    pub fn default_location() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("captionforge");
        Self::new(dir)
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(
        &self,
        exclusive: bool,
        op: impl FnOnce() -> Result<T, SettingsError>,
    ) -> Result<T, SettingsError> {
        // The lock file lives next to the settings file.
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)
                .map_err(|e| SettingsError::Lock(format!("exclusive: {}", e)))?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)
                .map_err(|e| SettingsError::Lock(format!("shared: {}", e)))?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or unreadable
    pub fn load(&self) -> CaptionSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(CaptionSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<CaptionSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                CaptionSettings::default()
            }
        }
    }

    /// Save settings to disk using atomic write (temp file + rename)
    pub fn save(&self, settings: &CaptionSettings) -> Result<CaptionSettings, SettingsError> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            let content = serde_json::to_string_pretty(&normalized)?;

            // std::fs::rename does not overwrite on Windows.
            let temp_path = self.settings_path.with_extension("json.tmp");
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }

            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            drop(file);

            if cfg!(windows) {
                let backup_path = self.settings_path.with_extension("json.bak");
                if backup_path.exists() {
                    let _ = fs::remove_file(&backup_path);
                }

                if self.settings_path.exists() {
                    fs::rename(&self.settings_path, &backup_path)?;
                }

                match fs::rename(&temp_path, &self.settings_path) {
                    Ok(()) => {
                        if backup_path.exists() {
                            let _ = fs::remove_file(&backup_path);
                        }
                    }
                    Err(e) => {
                        if backup_path.exists() {
                            let _ = fs::rename(&backup_path, &self.settings_path);
                        }
                        return Err(e.into());
                    }
                }
            } else {
                fs::rename(&temp_path, &self.settings_path)?;
            }

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&self) -> Result<CaptionSettings, SettingsError> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(CaptionSettings::default())
        })
    }
}
