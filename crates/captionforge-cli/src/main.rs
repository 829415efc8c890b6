//! CaptionForge CLI
//!
//! Headless front end for the caption engine: generate subtitle files from
//! narration text, burn subtitle files into video, inspect subtitle files and
//! show the effective settings. Results are printed to stdout as JSON.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use captionforge_lib::core::captions::audio::wav_duration;
use captionforge_lib::core::captions::whisper::{
    is_whisper_available, WhisperAlignerOptions, WhisperModel,
};
use captionforge_lib::core::captions::{
    parse_captions, validate_timing, CaptionFormatter, CaptionPipeline, CaptionRequest,
    CaptionStats, FormatVariant, TimestampHint, WhisperAligner,
};
use captionforge_lib::core::ffmpeg::{detect_system_ffmpeg, FFmpegInfo, FFmpegRunner};
use captionforge_lib::core::render::{CaptionRenderer, RenderMode, RenderOptions};
use captionforge_lib::core::settings::{CaptionSettings, SettingsManager};
use captionforge_lib::core::LanguageCode;

#[derive(Parser, Debug)]
#[command(
    name = "captionforge-cli",
    version,
    about = "Segment, time and burn captions for narrated videos"
)]
struct Cli {
    /// Directory holding captionforge.json (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Also write daily-rolling logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Explicit ffmpeg binary (requires --ffprobe)
    #[arg(long, global = true, requires = "ffprobe")]
    ffmpeg: Option<PathBuf>,

    /// Explicit ffprobe binary (requires --ffmpeg)
    #[arg(long, global = true, requires = "ffmpeg")]
    ffprobe: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn narration text into a subtitle file
    Caption(CaptionArgs),
    /// Burn a subtitle file into a video
    Burn(BurnArgs),
    /// Parse a subtitle file and report statistics
    Inspect(InspectArgs),
    /// Print the effective settings
    Settings(SettingsArgs),
}

#[derive(clap::Args, Debug)]
struct CaptionArgs {
    /// Narration text
    #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
    text: Option<String>,

    /// File containing the narration text
    #[arg(long)]
    text_file: Option<PathBuf>,

    /// Narration duration in seconds (probed from --audio when omitted)
    #[arg(long)]
    duration: Option<f64>,

    /// Narration language (zh, ja, en, es)
    #[arg(long, default_value = "zh")]
    language: String,

    /// Narration audio, used for forced alignment
    #[arg(long)]
    audio: Option<PathBuf>,

    /// JSON array of {"text","start","end"} hints from the speech synthesizer
    #[arg(long)]
    hints: Option<PathBuf>,

    /// Caption style id
    #[arg(long, default_value = "main")]
    style: String,

    /// Subtitle format (srt, ass, vtt); taken from --output when omitted
    #[arg(long)]
    format: Option<String>,

    /// Output subtitle file; the extension is set from the format
    #[arg(short, long)]
    output: PathBuf,

    /// Whisper model size for forced alignment
    #[arg(long, default_value = "base")]
    whisper_model: String,

    /// Directory holding Whisper ggml models
    #[arg(long)]
    models_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct BurnArgs {
    /// Source video
    #[arg(long)]
    video: PathBuf,

    /// Subtitle file (srt, ass or vtt)
    #[arg(long)]
    captions: PathBuf,

    /// Captioned output video
    #[arg(short, long)]
    output: PathBuf,

    /// Render mode override (overlay, subtitle_filter)
    #[arg(long)]
    mode: Option<String>,

    /// Overlays per FFmpeg pass override
    #[arg(long)]
    batch_size: Option<u32>,
}

#[derive(clap::Args, Debug)]
struct InspectArgs {
    /// Subtitle file
    path: PathBuf,

    /// Format override (srt, ass, vtt)
    #[arg(long)]
    format: Option<String>,
}

#[derive(clap::Args, Debug)]
struct SettingsArgs {
    /// Write the normalized settings back to disk
    #[arg(long)]
    save: bool,

    /// Delete the settings file and show defaults
    #[arg(long, conflicts_with = "save")]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    captionforge_lib::init_logging(cli.log_dir.as_deref());

    let manager = match &cli.config_dir {
        Some(dir) => SettingsManager::new(dir.clone()),
        None => SettingsManager::default_location(),
    };
    let settings = manager.load();

    match &cli.command {
        Command::Caption(args) => run_caption(&cli, &settings, args).await,
        Command::Burn(args) => run_burn(&cli, &settings, args).await,
        Command::Inspect(args) => run_inspect(&settings, args),
        Command::Settings(args) => run_settings(&manager, settings, args),
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn run_caption(cli: &Cli, settings: &CaptionSettings, args: &CaptionArgs) -> Result<()> {
    let text = match (&args.text, &args.text_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read text file {}", path.display()))?,
        (None, None) => bail!("Either --text or --text-file is required"),
    };
    let language = LanguageCode::from_str(&args.language).map_err(|e| anyhow!(e))?;
    let variant = resolve_variant(args.format.as_deref(), &args.output)?;

    let total_duration = match (args.duration, &args.audio) {
        (Some(duration), _) => duration,
        (None, Some(audio)) => narration_duration(cli, audio).await?,
        (None, None) => bail!("--duration is required when no --audio is given"),
    };

    let mut request = CaptionRequest::new(text, total_duration)
        .with_language(language)
        .with_style(args.style.as_str());
    if let Some(audio) = &args.audio {
        request = request.with_audio(audio.clone());
    }
    if let Some(path) = &args.hints {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read hints {}", path.display()))?;
        let hints: Vec<TimestampHint> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid hints JSON in {}", path.display()))?;
        request = request.with_provider_timestamps(hints);
    }

    let mut pipeline = CaptionPipeline::from_settings(settings);
    if args.audio.is_some() && !is_whisper_available() {
        info!("Built without the whisper feature, forced alignment is skipped");
    } else if args.audio.is_some() {
        let mut options = WhisperAlignerOptions {
            model: WhisperModel::from_str(&args.whisper_model).map_err(|e| anyhow!(e))?,
            ..WhisperAlignerOptions::default()
        };
        if let Some(dir) = &args.models_dir {
            options.models_dir = dir.clone();
        }
        match resolve_ffmpeg(cli) {
            Ok(info) => options.ffmpeg_path = info.ffmpeg_path,
            Err(e) => warn!("FFmpeg not found, forced alignment may fail: {}", e),
        }
        pipeline = pipeline.with_forced_aligner(Box::new(WhisperAligner::new(options)));
        if let Err(e) = pipeline.load_models() {
            warn!("Forced alignment models not loaded: {}", e);
        }
    }

    let outcome = pipeline.process(&request);
    pipeline.cleanup_models();
    let outcome = outcome.context("Caption generation failed")?;

    let formatter = CaptionFormatter::new(pipeline.styles().clone());
    let path = formatter
        .save(&outcome.segments, &args.output, variant)
        .context("Failed to save captions")?;

    print_json(&json!({
        "output": path,
        "format": variant.to_string(),
        "method": outcome.method,
        "confidenceScore": outcome.confidence_score,
        "processingTimeMs": outcome.processing_time_ms,
        "stats": outcome.stats,
    }))
}

async fn run_burn(cli: &Cli, settings: &CaptionSettings, args: &BurnArgs) -> Result<()> {
    let variant = FormatVariant::from_path(&args.captions)
        .ok_or_else(|| anyhow!("Unknown subtitle format: {}", args.captions.display()))?;
    let content = std::fs::read_to_string(&args.captions)
        .with_context(|| format!("Failed to read {}", args.captions.display()))?;
    let segments = parse_captions(&content, variant)
        .with_context(|| format!("Failed to parse {}", args.captions.display()))?;

    let mut options = RenderOptions::from_settings(settings);
    if let Some(mode) = &args.mode {
        options.mode = RenderMode::from_str(mode).map_err(|e| anyhow!(e))?;
    }
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size.max(1) as usize;
    }

    let runner = FFmpegRunner::new(resolve_ffmpeg(cli)?);
    if let Ok(media) = runner.probe(&args.video).await {
        if let Some(video) = media.video {
            options.frame_height = video.height.max(1);
        }
    }

    info!(
        captions = segments.len(),
        "Burning {} into {}",
        args.captions.display(),
        args.video.display()
    );
    let styles = settings.style_book();
    let renderer = CaptionRenderer::new(runner, options);
    let summary = renderer
        .render(&args.video, &segments, |id| styles.lookup(id), &args.output)
        .await
        .context("Render failed")?;

    print_json(&summary)
}

fn run_inspect(settings: &CaptionSettings, args: &InspectArgs) -> Result<()> {
    let variant = resolve_variant(args.format.as_deref(), &args.path)?;
    let content = std::fs::read_to_string(&args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let segments = parse_captions(&content, variant)
        .with_context(|| format!("Failed to parse {}", args.path.display()))?;

    let timing = match validate_timing(
        &segments,
        settings.timing.min_duration,
        settings.timing.min_gap,
    ) {
        Ok(()) => json!({ "valid": true }),
        Err(violation) => json!({ "valid": false, "violation": violation.to_string() }),
    };

    print_json(&json!({
        "path": args.path,
        "format": variant.to_string(),
        "stats": CaptionStats::from_segments(&segments),
        "timing": timing,
        "segments": segments,
    }))
}

fn run_settings(
    manager: &SettingsManager,
    settings: CaptionSettings,
    args: &SettingsArgs,
) -> Result<()> {
    let settings = if args.reset {
        manager.reset().context("Failed to reset settings")?
    } else if args.save {
        let saved = manager.save(&settings).context("Failed to save settings")?;
        info!("Settings written to {}", manager.settings_path().display());
        saved
    } else {
        settings
    };
    print_json(&settings)
}

// =============================================================================
// Helpers
// =============================================================================

fn resolve_ffmpeg(cli: &Cli) -> Result<FFmpegInfo> {
    match (&cli.ffmpeg, &cli.ffprobe) {
        (Some(ffmpeg), Some(ffprobe)) => FFmpegInfo::from_paths(ffmpeg.clone(), ffprobe.clone())
            .context("Explicit FFmpeg binaries are not usable"),
        _ => detect_system_ffmpeg().context("FFmpeg detection failed"),
    }
}

/// WAV narration is measured directly; anything else goes through ffprobe
async fn narration_duration(cli: &Cli, audio: &Path) -> Result<f64> {
    let is_wav = audio
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    if is_wav {
        if let Ok(duration) = wav_duration(audio) {
            return Ok(duration);
        }
    }

    let runner = FFmpegRunner::new(resolve_ffmpeg(cli)?);
    runner
        .duration(audio)
        .await
        .with_context(|| format!("Failed to probe duration of {}", audio.display()))
}

fn resolve_variant(explicit: Option<&str>, path: &Path) -> Result<FormatVariant> {
    match explicit {
        Some(name) => FormatVariant::from_str(name).map_err(|e| anyhow!(e)),
        None => FormatVariant::from_path(path)
            .ok_or_else(|| anyhow!("Cannot infer subtitle format from {}", path.display())),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
