pub mod download;
pub mod ffmpeg;
pub mod probe;

pub use ffmpeg::FfmpegMuxer;
pub use probe::{probe_audio, probe_video, AudioInfo, VideoInfo};

use crate::error::{DubberError, Result};
use crate::job::progress::ProgressFn;
use crate::request::VideoFormat;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Result of a muxing operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxingResult {
    pub video_file_path: std::path::PathBuf,
    pub original_video_duration: f64,
    pub audio_duration: f64,
    pub final_video_duration: f64,
    pub file_size_bytes: u64,
    pub format: VideoFormat,
    pub resolution: String,
    pub video_codec: String,
    pub processing_time_seconds: f64,
    pub is_preview: bool,
}

/// Seam between the orchestrator and the external muxing tools.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Replace the source video's audio track with `audio_file`.
    async fn replace_audio(
        &self,
        video_source: &str,
        audio_file: &Path,
        output_path: &Path,
        preserve_video_quality: bool,
        target_format: VideoFormat,
        progress: ProgressFn,
    ) -> Result<MuxingResult>;

    /// Produce a short preview (first `duration_seconds` of the source)
    /// muxed against the same span of `audio_file`.
    async fn create_preview(
        &self,
        video_source: &str,
        audio_file: &Path,
        output_path: &Path,
        duration_seconds: u32,
        progress: ProgressFn,
    ) -> Result<MuxingResult>;
}

/// Last portion of a tool's stderr, for error payloads.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    const TAIL_BYTES: usize = 800;
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= TAIL_BYTES {
        return text.to_string();
    }
    let start = text.len() - TAIL_BYTES;
    let start = (start..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(start);
    format!("...{}", &text[start..])
}

/// Check that FFmpeg is installed and runnable.
pub fn check_ffmpeg() -> Result<()> {
    check_tool("ffmpeg")
}

/// Check that FFprobe is installed and runnable.
pub fn check_ffprobe() -> Result<()> {
    check_tool("ffprobe")
}

/// Check that the video downloader is installed and runnable.
pub fn check_downloader() -> Result<()> {
    check_tool("yt-dlp")
}

fn check_tool(name: &str) -> Result<()> {
    let output = std::process::Command::new(name)
        .arg("--version")
        .output()
        .map_err(|e| {
            DubberError::MuxingFailed(format!(
                "{name} not found. Install it and ensure it is on PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(DubberError::MuxingFailed(format!("{name} check failed")));
    }

    debug!("{name} is available");
    Ok(())
}
