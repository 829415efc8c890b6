//! Batched caption burn-in
//!
//! Overlay mode folds over fixed-size chunks of the segment list: batch *k*
//! reads the video written by batch *k-1*, and only the last batch writes
//! next to the final output. Every pass writes to a temporary path, so a
//! failure at any point leaves no partial `video_out`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tempfile::{TempDir, TempPath};
use tracing::{debug, info, warn};

use super::drawtext::{
    build_drawtext_filter, build_filter_chain, build_subtitles_filter, wrap_caption_text,
};
use super::{RenderError, RenderMode};
use crate::core::captions::formats::export_srt;
use crate::core::captions::{CaptionFormatter, CaptionSegment, StyleProfile};
use crate::core::ffmpeg::{FFmpegResult, FFmpegRunner};
use crate::core::settings::CaptionSettings;
use crate::core::{StyleId, TimeSec};

// =============================================================================
// Engine Abstraction
// =============================================================================

/// Video filter applied by one pass
#[derive(Clone, Debug, PartialEq)]
pub enum VideoFilter {
    /// `-filter_complex` graph ending in the `[v]` label
    Complex(String),
    /// Plain `-vf` filter
    Simple(String),
}

/// Video encoder settings for burn-in passes. Audio is always stream-copied.
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderOptions {
    pub video_codec: String,
    pub preset: String,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "fast".to_string(),
        }
    }
}

/// One FFmpeg invocation: `input` → filter → `output`
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayPass {
    pub input: PathBuf,
    pub output: PathBuf,
    pub filter: VideoFilter,
    pub encoder: EncoderOptions,
}

impl OverlayPass {
    /// FFmpeg command-line arguments for this pass
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-y"),
            OsString::from("-i"),
            self.input.clone().into_os_string(),
        ];
        let (flag, filter, video_map) = match &self.filter {
            VideoFilter::Complex(graph) => ("-filter_complex", graph.as_str(), "[v]"),
            VideoFilter::Simple(filter) => ("-vf", filter.as_str(), "0:v"),
        };
        args.extend(
            [
                flag,
                filter,
                "-map",
                video_map,
                "-map",
                "0:a?",
                "-c:a",
                "copy",
                "-c:v",
                self.encoder.video_codec.as_str(),
                "-preset",
                self.encoder.preset.as_str(),
            ]
            .map(OsString::from),
        );
        args.push(self.output.clone().into_os_string());
        args
    }
}

/// External video engine used by [`CaptionRenderer`]
#[async_trait]
pub trait OverlayEngine: Send + Sync {
    /// Duration of a media file in seconds
    async fn media_duration(&self, input: &Path) -> FFmpegResult<TimeSec>;

    /// Runs one filter pass, writing `pass.output`
    async fn burn(&self, pass: &OverlayPass) -> FFmpegResult<()>;
}

#[async_trait]
impl OverlayEngine for FFmpegRunner {
    async fn media_duration(&self, input: &Path) -> FFmpegResult<TimeSec> {
        self.duration(input).await
    }

    async fn burn(&self, pass: &OverlayPass) -> FFmpegResult<()> {
        self.run(&pass.to_args()).await
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Burn-in options
#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Overlays per pass
    pub batch_size: usize,
    /// Seconds the last caption stays past the probed video duration
    pub final_caption_padding: TimeSec,
    pub encoder: EncoderOptions,
    pub mode: RenderMode,
    /// Font for drawtext; FFmpeg's default font when `None`
    pub font_file: Option<PathBuf>,
    /// Frame height used to scale subtitle-filter styles
    pub frame_height: u32,
    /// Overlay captions wider than this are broken into rows; `None` keeps
    /// caption text on one row
    pub wrap_width_px: Option<u32>,
}

/// Row width used when no settings are given
pub const DEFAULT_WRAP_WIDTH_PX: u32 = 640;

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            batch_size: 15,
            final_caption_padding: 0.1,
            encoder: EncoderOptions::default(),
            mode: RenderMode::Overlay,
            font_file: None,
            frame_height: CaptionFormatter::DEFAULT_PLAY_RES.1,
            wrap_width_px: Some(DEFAULT_WRAP_WIDTH_PX),
        }
    }
}

impl RenderOptions {
    pub fn from_settings(settings: &CaptionSettings) -> Self {
        Self {
            batch_size: settings.render.batch_size.max(1) as usize,
            final_caption_padding: settings.render.final_caption_padding,
            encoder: EncoderOptions {
                video_codec: settings.render.video_codec.clone(),
                preset: settings.render.preset.clone(),
            },
            mode: settings.render.mode,
            font_file: settings.fonts.resolve().map(Path::to_path_buf),
            frame_height: CaptionFormatter::DEFAULT_PLAY_RES.1,
            wrap_width_px: Some(settings.segmentation.max_text_width_px),
        }
    }
}

/// What a render did
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSummary {
    pub output: PathBuf,
    pub mode: RenderMode,
    pub segments: usize,
    /// FFmpeg passes run (0 when the video was copied unchanged)
    pub passes: usize,
}

/// Burns captions into a video through an [`OverlayEngine`]
pub struct CaptionRenderer<E: OverlayEngine> {
    engine: E,
    options: RenderOptions,
}

impl<E: OverlayEngine> CaptionRenderer<E> {
    pub fn new(engine: E, options: RenderOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Renders `segments` onto `video_in`, writing `video_out` only on success
    pub async fn render<F>(
        &self,
        video_in: &Path,
        segments: &[CaptionSegment],
        style_lookup: F,
        video_out: &Path,
    ) -> Result<RenderSummary, RenderError>
    where
        F: Fn(&StyleId) -> StyleProfile,
    {
        if !video_in.is_file() {
            return Err(RenderError::MissingInput(video_in.display().to_string()));
        }

        let out_dir = parent_dir(video_out);
        std::fs::create_dir_all(&out_dir)?;
        let final_temp = temp_output(&out_dir, video_out)?;

        let passes = if segments.is_empty() {
            info!("No captions to burn, copying {}", video_in.display());
            tokio::fs::copy(video_in, &final_temp).await?;
            0
        } else {
            match self.options.mode {
                RenderMode::Overlay => {
                    self.render_overlays(video_in, segments, &style_lookup, &out_dir, &final_temp)
                        .await?
                }
                RenderMode::SubtitleFilter => {
                    self.render_subtitles(video_in, segments, &style_lookup, &out_dir, &final_temp)
                        .await?
                }
            }
        };

        final_temp.persist(video_out).map_err(|e| RenderError::Io(e.error))?;
        info!(
            passes,
            segments = segments.len(),
            "Captioned video written to {}",
            video_out.display()
        );

        Ok(RenderSummary {
            output: video_out.to_path_buf(),
            mode: self.options.mode,
            segments: segments.len(),
            passes,
        })
    }

    async fn render_overlays<F>(
        &self,
        video_in: &Path,
        segments: &[CaptionSegment],
        style_lookup: &F,
        out_dir: &Path,
        final_out: &Path,
    ) -> Result<usize, RenderError>
    where
        F: Fn(&StyleId) -> StyleProfile,
    {
        let batch_size = self.options.batch_size.max(1);
        let total = segments.len().div_ceil(batch_size);
        let scratch = scratch_dir(out_dir)?;
        let ext = extension_of(final_out);

        let mut current = video_in.to_path_buf();
        for (index, chunk) in segments.chunks(batch_size).enumerate() {
            let batch = index + 1;
            let is_last = batch == total;

            let mut chunk = chunk.to_vec();
            if is_last {
                self.extend_final_caption(&current, &mut chunk).await;
            }

            let filters: Vec<String> = chunk
                .iter()
                .map(|segment| {
                    let style = style_lookup(&segment.style_id);
                    match self.options.wrap_width_px {
                        Some(width) => {
                            let mut wrapped = segment.clone();
                            wrapped.text =
                                wrap_caption_text(&segment.text, style.font_size_px, width);
                            build_drawtext_filter(
                                &wrapped,
                                &style,
                                self.options.font_file.as_deref(),
                            )
                        }
                        None => build_drawtext_filter(
                            segment,
                            &style,
                            self.options.font_file.as_deref(),
                        ),
                    }
                })
                .collect();

            let output = if is_last {
                final_out.to_path_buf()
            } else {
                scratch.path().join(format!("batch_{:03}.{}", batch, ext))
            };

            let pass = OverlayPass {
                input: current.clone(),
                output: output.clone(),
                filter: VideoFilter::Complex(build_filter_chain(&filters)),
                encoder: self.options.encoder.clone(),
            };

            info!(batch, total, overlays = chunk.len(), "Rendering caption batch");
            self.engine
                .burn(&pass)
                .await
                .map_err(|e| RenderError::BatchFailed {
                    batch,
                    total,
                    reason: e.to_string(),
                })?;

            // The previous intermediate is no longer needed.
            if index > 0 {
                if let Err(e) = std::fs::remove_file(&current) {
                    debug!("Could not remove intermediate {}: {}", current.display(), e);
                }
            }
            current = output;
        }

        Ok(total)
    }

    async fn render_subtitles<F>(
        &self,
        video_in: &Path,
        segments: &[CaptionSegment],
        style_lookup: &F,
        out_dir: &Path,
        final_out: &Path,
    ) -> Result<usize, RenderError>
    where
        F: Fn(&StyleId) -> StyleProfile,
    {
        let scratch = scratch_dir(out_dir)?;
        let srt_path = scratch.path().join("captions.srt");

        let mut adjusted = segments.to_vec();
        self.extend_final_caption(video_in, &mut adjusted).await;
        tokio::fs::write(&srt_path, export_srt(&adjusted)).await?;

        // The subtitles filter applies one style to every caption.
        let style = style_lookup(&adjusted[0].style_id);
        let pass = OverlayPass {
            input: video_in.to_path_buf(),
            output: final_out.to_path_buf(),
            filter: VideoFilter::Simple(build_subtitles_filter(
                &srt_path,
                &style,
                self.options.frame_height,
            )),
            encoder: self.options.encoder.clone(),
        };

        info!(captions = adjusted.len(), "Rendering captions with subtitles filter");
        self.engine
            .burn(&pass)
            .await
            .map_err(|e| RenderError::BatchFailed {
                batch: 1,
                total: 1,
                reason: e.to_string(),
            })?;
        Ok(1)
    }

    /// Keeps the last caption on screen until the end of `video`
    async fn extend_final_caption(&self, video: &Path, segments: &mut [CaptionSegment]) {
        let Some(last) = segments.last_mut() else {
            return;
        };
        match self.engine.media_duration(video).await {
            Ok(duration) => {
                let end = (duration + self.options.final_caption_padding).max(last.end_time);
                debug!(
                    nominal_end = last.end_time,
                    end, "Extending final caption to video end"
                );
                last.set_times(last.start_time, end);
            }
            Err(e) => warn!(
                "Could not measure {}, keeping final caption end: {}",
                video.display(),
                e
            ),
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("mp4")
        .to_string()
}

/// Hidden temp file next to `video_out` with the same extension
fn temp_output(dir: &Path, video_out: &Path) -> Result<TempPath, RenderError> {
    let file = tempfile::Builder::new()
        .prefix(".captionforge-")
        .suffix(&format!(".{}", extension_of(video_out)))
        .tempfile_in(dir)?;
    Ok(file.into_temp_path())
}

fn scratch_dir(dir: &Path) -> Result<TempDir, RenderError> {
    Ok(tempfile::Builder::new()
        .prefix(".captionforge-batches-")
        .tempdir_in(dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::captions::StyleBook;
    use crate::core::ffmpeg::FFmpegError;
    use std::sync::Mutex;

    /// Records passes and writes a stub output file for each
    struct RecordingEngine {
        duration: TimeSec,
        fail_on_pass: Option<usize>,
        passes: Mutex<Vec<OverlayPass>>,
        probed: Mutex<Vec<PathBuf>>,
    }

    impl RecordingEngine {
        fn new(duration: TimeSec) -> Self {
            Self {
                duration,
                fail_on_pass: None,
                passes: Mutex::new(Vec::new()),
                probed: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(duration: TimeSec, pass: usize) -> Self {
            Self {
                fail_on_pass: Some(pass),
                ..Self::new(duration)
            }
        }

        fn passes(&self) -> Vec<OverlayPass> {
            self.passes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OverlayEngine for RecordingEngine {
        async fn media_duration(&self, input: &Path) -> FFmpegResult<TimeSec> {
            self.probed.lock().unwrap().push(input.to_path_buf());
            Ok(self.duration)
        }

        async fn burn(&self, pass: &OverlayPass) -> FFmpegResult<()> {
            assert!(pass.input.exists(), "pass input missing: {:?}", pass.input);
            let number = {
                let mut passes = self.passes.lock().unwrap();
                passes.push(pass.clone());
                passes.len()
            };
            if self.fail_on_pass == Some(number) {
                return Err(FFmpegError::ExecutionFailed("exit status: 1".to_string()));
            }
            std::fs::write(&pass.output, format!("pass {}", number))?;
            Ok(())
        }
    }

    fn segments(count: usize) -> Vec<CaptionSegment> {
        (0..count)
            .map(|i| CaptionSegment::new(format!("caption {}", i), i as f64, i as f64 + 0.8))
            .collect()
    }

    fn filter_of(pass: &OverlayPass) -> &str {
        match &pass.filter {
            VideoFilter::Complex(graph) | VideoFilter::Simple(graph) => graph,
        }
    }

    struct Fixture {
        _input_dir: TempDir,
        out_dir: TempDir,
        video_in: PathBuf,
        video_out: PathBuf,
    }

    fn fixture() -> Fixture {
        let input_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let video_in = input_dir.path().join("input.mp4");
        std::fs::write(&video_in, b"source video").unwrap();
        let video_out = out_dir.path().join("captioned.mp4");
        Fixture {
            _input_dir: input_dir,
            out_dir,
            video_in,
            video_out,
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    // -------------------------------------------------------------------------
    // Overlay Batching
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_32_segments_render_in_three_chained_batches() {
        let fx = fixture();
        let book = StyleBook::builtin();
        let renderer = CaptionRenderer::new(RecordingEngine::new(40.0), RenderOptions::default());

        let summary = renderer
            .render(&fx.video_in, &segments(32), |id| book.lookup(id), &fx.video_out)
            .await
            .unwrap();

        let passes = renderer.engine.passes();
        assert_eq!(passes.len(), 3);
        assert_eq!(summary.passes, 3);

        let overlays: Vec<usize> = passes
            .iter()
            .map(|p| filter_of(p).matches("drawtext=").count())
            .collect();
        assert_eq!(overlays, vec![15, 15, 2]);

        assert_eq!(passes[0].input, fx.video_in);
        assert_eq!(passes[1].input, passes[0].output);
        assert_eq!(passes[2].input, passes[1].output);
        assert_eq!(passes[2].output.parent(), Some(fx.out_dir.path()));

        assert_eq!(std::fs::read_to_string(&fx.video_out).unwrap(), "pass 3");
        assert_eq!(dir_entries(fx.out_dir.path()), vec!["captioned.mp4"]);
    }

    #[tokio::test]
    async fn test_final_caption_extends_to_probed_duration() {
        let fx = fixture();
        let book = StyleBook::builtin();
        let engine = RecordingEngine::new(20.0);
        let renderer = CaptionRenderer::new(engine, RenderOptions::default());

        renderer
            .render(&fx.video_in, &segments(3), |id| book.lookup(id), &fx.video_out)
            .await
            .unwrap();

        let passes = renderer.engine.passes();
        assert_eq!(passes.len(), 1);
        let graph = filter_of(&passes[0]);
        assert!(graph.contains("between(t,2.000,20.100)"));
        assert!(graph.contains("between(t,0.000,0.800)"));
        assert_eq!(renderer.engine.probed.lock().unwrap().as_slice(), &[fx.video_in.clone()]);
    }

    #[tokio::test]
    async fn test_final_batch_probes_current_intermediate() {
        let fx = fixture();
        let book = StyleBook::builtin();
        let options = RenderOptions {
            batch_size: 2,
            ..RenderOptions::default()
        };
        let renderer = CaptionRenderer::new(RecordingEngine::new(10.0), options);

        renderer
            .render(&fx.video_in, &segments(3), |id| book.lookup(id), &fx.video_out)
            .await
            .unwrap();

        let passes = renderer.engine.passes();
        let probed = renderer.engine.probed.lock().unwrap().clone();
        assert_eq!(probed, vec![passes[1].input.clone()]);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_no_output() {
        let fx = fixture();
        let book = StyleBook::builtin();
        let renderer =
            CaptionRenderer::new(RecordingEngine::failing_on(40.0, 2), RenderOptions::default());

        let err = renderer
            .render(&fx.video_in, &segments(32), |id| book.lookup(id), &fx.video_out)
            .await
            .unwrap_err();

        match err {
            RenderError::BatchFailed { batch, total, reason } => {
                assert_eq!((batch, total), (2, 3));
                assert!(reason.contains("exit status"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(renderer.engine.passes().len(), 2);
        assert!(!fx.video_out.exists());
        assert!(dir_entries(fx.out_dir.path()).is_empty());
    }

    // -------------------------------------------------------------------------
    // Other Modes
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_no_segments_copies_video() {
        let fx = fixture();
        let renderer = CaptionRenderer::new(RecordingEngine::new(5.0), RenderOptions::default());

        let summary = renderer
            .render(&fx.video_in, &[], |_| StyleProfile::main(), &fx.video_out)
            .await
            .unwrap();

        assert_eq!(summary.passes, 0);
        assert!(renderer.engine.passes().is_empty());
        assert_eq!(std::fs::read(&fx.video_out).unwrap(), b"source video");
    }

    #[tokio::test]
    async fn test_missing_input() {
        let fx = fixture();
        let renderer = CaptionRenderer::new(RecordingEngine::new(5.0), RenderOptions::default());
        let result = renderer
            .render(
                &fx.out_dir.path().join("nope.mp4"),
                &segments(1),
                |_| StyleProfile::main(),
                &fx.video_out,
            )
            .await;
        assert!(matches!(result, Err(RenderError::MissingInput(_))));
    }

    #[tokio::test]
    async fn test_subtitle_filter_mode_single_pass() {
        let fx = fixture();
        let options = RenderOptions {
            mode: RenderMode::SubtitleFilter,
            ..RenderOptions::default()
        };
        let renderer = CaptionRenderer::new(RecordingEngine::new(40.0), options);

        let summary = renderer
            .render(&fx.video_in, &segments(32), |_| StyleProfile::boxed(), &fx.video_out)
            .await
            .unwrap();

        let passes = renderer.engine.passes();
        assert_eq!(passes.len(), 1);
        assert_eq!(summary.mode, RenderMode::SubtitleFilter);
        assert!(matches!(&passes[0].filter, VideoFilter::Simple(f)
            if f.starts_with("subtitles='") && f.contains("BorderStyle=3")));
        assert!(fx.video_out.exists());
        assert_eq!(dir_entries(fx.out_dir.path()), vec!["captioned.mp4"]);
    }

    #[tokio::test]
    async fn test_long_overlay_caption_is_wrapped() {
        let fx = fixture();
        let long = vec![CaptionSegment::new(
            "这是一条从外部字幕文件导入的非常长的字幕，需要在画面内换行显示。",
            0.0,
            3.0,
        )];
        let renderer = CaptionRenderer::new(RecordingEngine::new(5.0), RenderOptions::default());

        renderer
            .render(&fx.video_in, &long, |_| StyleProfile::main(), &fx.video_out)
            .await
            .unwrap();

        let passes = renderer.engine.passes();
        assert_eq!(passes.len(), 1);
        assert!(filter_of(&passes[0]).contains('\n'));
    }

    #[tokio::test]
    async fn test_wrapping_can_be_disabled() {
        let fx = fixture();
        let long = vec![CaptionSegment::new(
            "这是一条从外部字幕文件导入的非常长的字幕，需要在画面内换行显示。",
            0.0,
            3.0,
        )];
        let options = RenderOptions {
            wrap_width_px: None,
            ..RenderOptions::default()
        };
        let renderer = CaptionRenderer::new(RecordingEngine::new(5.0), options);

        renderer
            .render(&fx.video_in, &long, |_| StyleProfile::main(), &fx.video_out)
            .await
            .unwrap();

        let passes = renderer.engine.passes();
        assert!(!filter_of(&passes[0]).contains('\n'));
    }

    // -------------------------------------------------------------------------
    // Arguments
    // -------------------------------------------------------------------------

    #[test]
    fn test_overlay_pass_args_copy_audio() {
        let pass = OverlayPass {
            input: PathBuf::from("in.mp4"),
            output: PathBuf::from("out.mp4"),
            filter: VideoFilter::Complex("[0:v]null[v]".to_string()),
            encoder: EncoderOptions::default(),
        };
        let args: Vec<String> = pass
            .to_args()
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec![
                "-y", "-i", "in.mp4", "-filter_complex", "[0:v]null[v]", "-map", "[v]", "-map",
                "0:a?", "-c:a", "copy", "-c:v", "libx264", "-preset", "fast", "out.mp4"
            ]
        );
    }

    #[test]
    fn test_options_from_settings() {
        let mut settings = CaptionSettings::default();
        settings.render.batch_size = 7;
        settings.render.mode = RenderMode::SubtitleFilter;
        settings.fonts.candidates.clear();
        let options = RenderOptions::from_settings(&settings);
        assert_eq!(options.batch_size, 7);
        assert_eq!(options.mode, RenderMode::SubtitleFilter);
        assert!(options.font_file.is_none());
        assert_eq!(options.encoder, EncoderOptions::default());
        assert_eq!(options.wrap_width_px, Some(settings.segmentation.max_text_width_px));
    }
}
