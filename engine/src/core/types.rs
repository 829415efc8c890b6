//! CaptionForge Core Type Definitions
//!
//! Defines fundamental types shared by the caption pipeline and renderer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Time and Size Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;

/// Rendered text width in pixels
pub type PixelWidth = u32;

// =============================================================================
// Style Identifier
// =============================================================================

/// Identifier of a [`StyleProfile`](crate::core::captions::StyleProfile)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(String);

impl StyleId {
    /// Default style for narration captions
    pub const MAIN: &'static str = "main";
    /// Centered title card style
    pub const TITLE: &'static str = "title";
    /// Narration style with a translucent background box
    pub const BOXED: &'static str = "boxed";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn main() -> Self {
        Self::new(Self::MAIN)
    }

    pub fn title() -> Self {
        Self::new(Self::TITLE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StyleId {
    fn default() -> Self {
        Self::main()
    }
}

impl fmt::Display for StyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StyleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StyleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// =============================================================================
// Language
// =============================================================================

/// Writing system family of a language, which decides the segmentation unit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Script {
    /// No spaces between words; lines are built from individual characters
    Logographic,
    /// Space-delimited; lines are built from whole words
    Alphabetic,
}

/// Supported narration languages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    /// Mandarin Chinese (default)
    #[default]
    Zh,
    /// Japanese
    Ja,
    /// English
    En,
    /// Spanish
    Es,
}

impl LanguageCode {
    /// Returns the script family used for segmentation
    pub fn script(self) -> Script {
        match self {
            LanguageCode::Zh | LanguageCode::Ja => Script::Logographic,
            LanguageCode::En | LanguageCode::Es => Script::Alphabetic,
        }
    }

    /// Separator placed between units when re-joining text
    pub fn joiner(self) -> &'static str {
        match self.script() {
            Script::Logographic => "",
            Script::Alphabetic => " ",
        }
    }

    /// ISO 639-1 code
    pub fn as_str(self) -> &'static str {
        match self {
            LanguageCode::Zh => "zh",
            LanguageCode::Ja => "ja",
            LanguageCode::En => "en",
            LanguageCode::Es => "es",
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh-tw" | "chinese" => Ok(LanguageCode::Zh),
            "ja" | "japanese" => Ok(LanguageCode::Ja),
            "en" | "en-us" | "en-gb" | "english" => Ok(LanguageCode::En),
            "es" | "spanish" => Ok(LanguageCode::Es),
            other => Err(format!("Unsupported language: {}", other)),
        }
    }
}
