//! FFmpeg Detection Module
//!
//! Finds FFmpeg/FFprobe in common install directories, then on `PATH`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::{FFmpegError, FFmpegResult};
use crate::core::process::configure_std_command;

/// Information about a detected FFmpeg installation
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FFmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_path: PathBuf,
    /// FFmpeg version string
    pub version: String,
}

impl FFmpegInfo {
    /// Uses explicit binary paths, reading the version from `ffmpeg_path`
    pub fn from_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> FFmpegResult<Self> {
        if !ffmpeg_path.exists() || !ffprobe_path.exists() {
            return Err(FFmpegError::NotFound);
        }
        let version = get_ffmpeg_version(&ffmpeg_path)?;
        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
            version,
        })
    }
}

/// Detect FFmpeg from common locations or the system PATH
pub fn detect_system_ffmpeg() -> FFmpegResult<FFmpegInfo> {
    let ffmpeg_path = which_binary("ffmpeg")?;
    let ffprobe_path = which_binary("ffprobe")?;
    let version = get_ffmpeg_version(&ffmpeg_path)?;

    debug!(
        "Detected FFmpeg {} at {}",
        version,
        ffmpeg_path.display()
    );

    Ok(FFmpegInfo {
        ffmpeg_path,
        ffprobe_path,
        version,
    })
}

/// Find a binary in the common install directories, then via `where`/`which`
fn which_binary(name: &str) -> FFmpegResult<PathBuf> {
    let file_name = binary_file_name(name);

    for dir in get_common_ffmpeg_paths() {
        let candidate = dir.join(&file_name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    #[cfg(target_os = "windows")]
    let locator = "where";

    #[cfg(not(target_os = "windows"))]
    let locator = "which";

    let mut cmd = Command::new(locator);
    configure_std_command(&mut cmd);
    let output = cmd.arg(name).output().map_err(|_| FFmpegError::NotFound)?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        if let Some(first_line) = path_str.lines().map(str::trim).find(|l| !l.is_empty()) {
            return Ok(PathBuf::from(first_line));
        }
    }

    Err(FFmpegError::NotFound)
}

fn binary_file_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Get common FFmpeg installation paths for the current platform
fn get_common_ffmpeg_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));

        // Chocolatey installation
        if let Ok(programdata) = std::env::var("ProgramData") {
            paths.push(PathBuf::from(programdata).join("chocolatey").join("bin"));
        }

        // Scoop installation
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join("scoop").join("shims"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        // Homebrew and MacPorts
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/opt/local/bin"));
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

/// Get FFmpeg version string
fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let mut cmd = Command::new(ffmpeg_path);
    configure_std_command(&mut cmd);
    let output = cmd
        .arg("-version")
        .output()
        .map_err(FFmpegError::ProcessError)?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(
            "Failed to get FFmpeg version".to_string(),
        ));
    }

    parse_version_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parses "ffmpeg version X.Y.Z ..." from the first line of `-version` output
fn parse_version_output(output: &str) -> FFmpegResult<String> {
    match output.lines().next() {
        Some(first_line) => Ok(first_line
            .strip_prefix("ffmpeg version ")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or(first_line)
            .to_string()),
        None => Err(FFmpegError::ParseError(
            "Could not parse FFmpeg version".to_string(),
        )),
    }
}
