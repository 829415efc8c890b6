//! FFmpeg Runner Module
//!
//! Probes media with FFprobe and executes FFmpeg passes.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{FFmpegError, FFmpegInfo, FFmpegResult};
use crate::core::process::configure_tokio_command;
use crate::core::TimeSec;

/// Number of stderr lines kept in execution errors
const STDERR_TAIL_LINES: usize = 12;

/// Media information extracted by FFprobe
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration_sec: f64,
    /// First video stream (if present)
    pub video: Option<VideoStreamInfo>,
    /// Whether any audio stream is present
    pub has_audio: bool,
    /// Container format
    pub format: String,
}

/// Video stream information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    /// Frame rate (frames per second)
    pub fps: f64,
    /// Codec name (e.g., "h264", "vp9")
    pub codec: String,
}

/// FFmpeg Runner for executing video processing commands
#[derive(Clone, Debug)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
    timeout: Option<Duration>,
}

impl FFmpegRunner {
    /// Create a new FFmpegRunner from a detected FFmpeg installation
    pub fn new(info: FFmpegInfo) -> Self {
        Self {
            info: Arc::new(info),
            timeout: None,
        }
    }

    /// Kills FFmpeg passes that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the FFmpeg info
    pub fn info(&self) -> &FFmpegInfo {
        &self.info
    }

    /// Probe media file to get information
    pub async fn probe(&self, input: &Path) -> FFmpegResult<MediaInfo> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        let mut cmd = tokio::process::Command::new(&self.info.ffprobe_path);
        configure_tokio_command(&mut cmd);
        let output = cmd
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(input)
            .output()
            .await
            .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ProbeError(format!("FFprobe failed: {}", stderr)));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&json_str)
    }

    /// Container duration in seconds
    pub async fn duration(&self, input: &Path) -> FFmpegResult<TimeSec> {
        let info = self.probe(input).await?;
        if info.duration_sec > 0.0 && info.duration_sec.is_finite() {
            Ok(info.duration_sec)
        } else {
            Err(FFmpegError::ProbeError(format!(
                "No duration reported for {}",
                input.display()
            )))
        }
    }

    /// Runs ffmpeg with `args`. Stderr is captured and its tail reported on failure.
    pub async fn run(&self, args: &[OsString]) -> FFmpegResult<()> {
        let mut cmd = tokio::process::Command::new(&self.info.ffmpeg_path);
        configure_tokio_command(&mut cmd);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!("Running ffmpeg {:?}", args);
        let child = cmd.spawn().map_err(FFmpegError::ProcessError)?;

        // The child is killed on drop, so a timeout also stops the process.
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| FFmpegError::Timeout)?,
            None => child.wait_with_output().await,
        }
        .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ExecutionFailed(format!(
                "{}: {}",
                output.status,
                stderr_tail(&stderr)
            )));
        }

        Ok(())
    }
}

/// Last few non-empty stderr lines
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

fn parse_probe_output(json_str: &str) -> FFmpegResult<MediaInfo> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FFmpegError::ParseError(format!("Failed to parse FFprobe output: {}", e)))?;

    let format = json
        .get("format")
        .ok_or_else(|| FFmpegError::ParseError("Missing format info".to_string()))?;

    let duration_sec = format
        .get("duration")
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let format_name = format
        .get("format_name")
        .and_then(|f| f.as_str())
        .unwrap_or("unknown")
        .to_string();

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();

    let mut video: Option<VideoStreamInfo> = None;
    let mut has_audio = false;

    for stream in &streams {
        match stream.get("codec_type").and_then(|c| c.as_str()) {
            Some("video") if video.is_none() => video = Some(parse_video_stream(stream)),
            Some("audio") => has_audio = true,
            _ => {}
        }
    }

    Ok(MediaInfo {
        duration_sec,
        video,
        has_audio,
        format: format_name,
    })
}

fn parse_video_stream(stream: &serde_json::Value) -> VideoStreamInfo {
    let width = stream.get("width").and_then(|w| w.as_u64()).unwrap_or(0) as u32;
    let height = stream.get("height").and_then(|h| h.as_u64()).unwrap_or(0) as u32;

    // r_frame_rate looks like "30/1" or "30000/1001"
    let fps = stream
        .get("r_frame_rate")
        .and_then(|f| f.as_str())
        .and_then(|s| match s.split_once('/') {
            Some((num, den)) => {
                let num: f64 = num.parse().ok()?;
                let den: f64 = den.parse().ok()?;
                (den > 0.0).then(|| num / den)
            }
            None => s.parse().ok(),
        })
        .unwrap_or(30.0);

    let codec = stream
        .get("codec_name")
        .and_then(|c| c.as_str())
        .unwrap_or("unknown")
        .to_string();

    VideoStreamInfo {
        width,
        height,
        fps,
        codec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 720, "height": 1280, "r_frame_rate": "30000/1001"},
                {"codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"duration": "12.480000", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!((info.duration_sec - 12.48).abs() < 1e-9);
        assert!(info.has_audio);
        let video = info.video.unwrap();
        assert_eq!((video.width, video.height), (720, 1280));
        assert!((video.fps - 29.97).abs() < 0.01);
        assert_eq!(video.codec, "h264");
    }

    #[test]
    fn test_parse_probe_output_audio_only() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.5"}}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.video.is_none());
        assert_eq!(info.format, "unknown");
    }

    #[test]
    fn test_parse_probe_output_errors() {
        assert!(matches!(
            parse_probe_output("not json"),
            Err(FFmpegError::ParseError(_))
        ));
        assert!(matches!(
            parse_probe_output(r#"{"streams": []}"#),
            Err(FFmpegError::ParseError(_))
        ));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {}\n\n", i)).collect();
        let tail = stderr_tail(&stderr);
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 29"));
        assert!(!tail.contains("line 17\n"));
    }

    #[tokio::test]
    async fn test_probe_missing_input() {
        let runner = FFmpegRunner::new(FFmpegInfo {
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            version: "test".to_string(),
        });
        let result = runner.probe(Path::new("/nonexistent/video.mp4")).await;
        assert!(matches!(result, Err(FFmpegError::InvalidInput(_))));
    }
}
