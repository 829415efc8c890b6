//! Whisper Forced Aligner
//!
//! A [`ForcedAligner`] backed by whisper.cpp (via whisper-rs). The reference
//! transcript is passed as the initial prompt and token-level timestamps are
//! returned as word timings, with the token probability as confidence.
//!
//! The real engine is compiled only with the `whisper` feature. Without it the
//! aligner reports itself unavailable and the alignment chain falls through.

use std::path::{Path, PathBuf};

use super::aligner::{AlignmentError, ForcedAligner};
use super::models::WordTimestamp;
use crate::core::LanguageCode;

// =============================================================================
// Whisper Model Types
// =============================================================================

/// Available Whisper model sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhisperModel {
    /// Tiny model (~75MB) - fastest, lowest accuracy
    Tiny,
    /// Base model (~142MB) - good balance
    #[default]
    Base,
    /// Small model (~466MB) - better accuracy
    Small,
    /// Medium model (~1.5GB) - high accuracy
    Medium,
    /// Large model (~2.9GB) - highest accuracy
    Large,
}

impl WhisperModel {
    /// Returns the filename for this model size
    pub fn filename(&self) -> &'static str {
        match self {
            WhisperModel::Tiny => "ggml-tiny.bin",
            WhisperModel::Base => "ggml-base.bin",
            WhisperModel::Small => "ggml-small.bin",
            WhisperModel::Medium => "ggml-medium.bin",
            WhisperModel::Large => "ggml-large.bin",
        }
    }
}

impl std::str::FromStr for WhisperModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(WhisperModel::Tiny),
            "base" => Ok(WhisperModel::Base),
            "small" => Ok(WhisperModel::Small),
            "medium" => Ok(WhisperModel::Medium),
            "large" => Ok(WhisperModel::Large),
            _ => Err(format!("Unknown Whisper model size: {}", s)),
        }
    }
}

/// Checks if the Whisper backend was compiled in
pub fn is_whisper_available() -> bool {
    cfg!(feature = "whisper")
}

/// Returns the default model directory
pub fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("captionforge")
        .join("models")
        .join("whisper")
}

// =============================================================================
// Aligner Options
// =============================================================================

/// Options for [`WhisperAligner`]
#[derive(Debug, Clone)]
pub struct WhisperAlignerOptions {
    pub model: WhisperModel,
    pub models_dir: PathBuf,
    /// Number of threads to use (0 = whisper default)
    pub threads: u32,
    /// FFmpeg binary used to convert audio to 16kHz mono
    pub ffmpeg_path: PathBuf,
}

impl WhisperAlignerOptions {
    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(self.model.filename())
    }
}

impl Default for WhisperAlignerOptions {
    fn default() -> Self {
        Self {
            model: WhisperModel::default(),
            models_dir: default_models_dir(),
            threads: 0,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

/// Token text that is a control marker rather than speech
fn is_special_token(text: &str) -> bool {
    let t = text.trim();
    t.is_empty() || (t.starts_with("[_") && t.ends_with(']')) || (t.starts_with("<|") && t.ends_with("|>"))
}

// =============================================================================
// Whisper Aligner - Feature-gated Implementation
// =============================================================================

#[cfg(feature = "whisper")]
mod engine_impl {
    use super::*;
    use crate::core::captions::audio::{load_mono_samples, prepare_alignment_audio};
    use tracing::{debug, info};
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Whisper-backed forced aligner
    pub struct WhisperAligner {
        options: WhisperAlignerOptions,
        context: Option<WhisperContext>,
    }

    impl WhisperAligner {
        pub fn new(options: WhisperAlignerOptions) -> Self {
            Self {
                options,
                context: None,
            }
        }

        fn transcribe_tokens(
            &self,
            samples: &[f32],
            reference_text: &str,
            language: LanguageCode,
        ) -> Result<Vec<WordTimestamp>, AlignmentError> {
            let context = self.context.as_ref().ok_or_else(|| {
                AlignmentError::ModelNotLoaded(self.options.model_path().display().to_string())
            })?;
            let mut state = context
                .create_state()
                .map_err(|e| AlignmentError::InferenceFailed(e.to_string()))?;

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_language(Some(language.as_str()));
            params.set_initial_prompt(reference_text);
            params.set_token_timestamps(true);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);
            if self.options.threads > 0 {
                params.set_n_threads(self.options.threads as i32);
            }

            state
                .full(params, samples)
                .map_err(|e| AlignmentError::InferenceFailed(e.to_string()))?;

            let num_segments = state
                .full_n_segments()
                .map_err(|e| AlignmentError::InferenceFailed(e.to_string()))?;

            let mut words = Vec::new();
            for i in 0..num_segments {
                let num_tokens = state
                    .full_n_tokens(i)
                    .map_err(|e| AlignmentError::InferenceFailed(e.to_string()))?;
                for j in 0..num_tokens {
                    let text = state
                        .full_get_token_text(i, j)
                        .map_err(|e| AlignmentError::InferenceFailed(e.to_string()))?;
                    if is_special_token(&text) {
                        continue;
                    }
                    let data = state
                        .full_get_token_data(i, j)
                        .map_err(|e| AlignmentError::InferenceFailed(e.to_string()))?;
                    words.push(WordTimestamp::new(
                        text.trim(),
                        data.t0 as f64 / 100.0,
                        data.t1 as f64 / 100.0,
                        data.p as f64,
                    ));
                }
            }
            debug!(tokens = words.len(), "Whisper token timestamps extracted");
            Ok(words)
        }
    }

    impl ForcedAligner for WhisperAligner {
        fn name(&self) -> &str {
            "whisper"
        }

        fn load_models(&mut self) -> Result<(), AlignmentError> {
            if self.context.is_some() {
                return Ok(());
            }
            let model_path = self.options.model_path();
            if !model_path.exists() {
                return Err(AlignmentError::ModelNotFound(
                    model_path.display().to_string(),
                ));
            }
            let context = WhisperContext::new_with_params(
                &model_path.to_string_lossy(),
                WhisperContextParameters::default(),
            )
            .map_err(|e| AlignmentError::ModelNotLoaded(e.to_string()))?;
            info!("Loaded Whisper model {}", model_path.display());
            self.context = Some(context);
            Ok(())
        }

        fn cleanup_models(&mut self) {
            self.context = None;
        }

        fn align_words(
            &mut self,
            audio: &Path,
            reference_text: &str,
            language: LanguageCode,
        ) -> Result<Vec<WordTimestamp>, AlignmentError> {
            if self.context.is_none() {
                self.load_models()?;
            }

            let scratch = tempfile::TempDir::new().map_err(|e| AlignmentError::Audio(e.to_string()))?;
            let wav = scratch.path().join("alignment.wav");
            prepare_alignment_audio(audio, &wav, &self.options.ffmpeg_path)
                .map_err(|e| AlignmentError::Audio(e.to_string()))?;
            let samples =
                load_mono_samples(&wav).map_err(|e| AlignmentError::Audio(e.to_string()))?;

            self.transcribe_tokens(&samples, reference_text, language)
        }
    }
}

#[cfg(feature = "whisper")]
pub use engine_impl::WhisperAligner;

// =============================================================================
// Stub Implementation (when whisper feature is disabled)
// =============================================================================

#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperAligner {
    options: WhisperAlignerOptions,
}

#[cfg(not(feature = "whisper"))]
impl WhisperAligner {
    pub fn new(options: WhisperAlignerOptions) -> Self {
        Self { options }
    }
}

#[cfg(not(feature = "whisper"))]
impl ForcedAligner for WhisperAligner {
    fn name(&self) -> &str {
        "whisper"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn load_models(&mut self) -> Result<(), AlignmentError> {
        Err(AlignmentError::FeatureNotEnabled)
    }

    fn cleanup_models(&mut self) {}

    fn align_words(
        &mut self,
        _audio: &Path,
        _reference_text: &str,
        _language: LanguageCode,
    ) -> Result<Vec<WordTimestamp>, AlignmentError> {
        tracing::debug!(
            "Whisper alignment requested for model {} without the whisper feature",
            self.options.model_path().display()
        );
        Err(AlignmentError::FeatureNotEnabled)
    }
}

// =============================================================================
// Tests
// =============================================================================
