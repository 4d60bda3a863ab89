//! Source-media handling for transcription: metadata lookup, best-audio
//! download, and conversion to the recognizer's input format.

use crate::error::{DubberError, Result};
use crate::mux::stderr_tail;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const INFO_TIMEOUT: Duration = Duration::from_secs(60);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const CONVERT_TIMEOUT: Duration = Duration::from_secs(300);

/// Source video facts from the downloader's metadata dump.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub title: String,
    pub duration_seconds: f64,
}

#[derive(Deserialize)]
struct DumpedInfo {
    title: Option<String>,
    duration: Option<f64>,
}

/// Query the downloader for title and duration without downloading.
pub async fn fetch_source_info(url: &str) -> Result<SourceInfo> {
    if Path::new(url).is_file() {
        let info = crate::mux::probe::probe_audio(Path::new(url)).await;
        let duration = match info {
            Ok(a) => a.duration,
            Err(_) => crate::mux::probe::probe_video(Path::new(url))
                .await
                .map(|v| v.duration)
                .unwrap_or(0.0),
        };
        let title = Path::new(url)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "local file".to_string());
        return Ok(SourceInfo {
            title,
            duration_seconds: duration,
        });
    }

    let result = tokio::time::timeout(
        INFO_TIMEOUT,
        tokio::process::Command::new("yt-dlp")
            .args(["--dump-json", "--no-warnings", "--no-playlist"])
            .arg(url)
            .output(),
    )
    .await
    .map_err(|_| DubberError::TranscriptionFailed("Video info lookup timed out".to_string()))?;

    let output = result
        .map_err(|e| DubberError::TranscriptionFailed(format!("Failed to run yt-dlp: {e}")))?;

    if !output.status.success() {
        return Err(DubberError::TranscriptionFailed(format!(
            "Video info lookup failed: {}",
            stderr_tail(&output.stderr)
        )));
    }

    let info: DumpedInfo = serde_json::from_slice(&output.stdout).map_err(|e| {
        DubberError::TranscriptionFailed(format!("Unparseable video metadata: {e}"))
    })?;

    Ok(SourceInfo {
        title: info.title.unwrap_or_else(|| "Unknown".to_string()),
        duration_seconds: info.duration.unwrap_or(0.0),
    })
}

/// Download the best audio track into `temp_dir`.
pub async fn download_audio(url: &str, temp_dir: &Path) -> Result<PathBuf> {
    if Path::new(url).is_file() {
        return Ok(PathBuf::from(url));
    }

    std::fs::create_dir_all(temp_dir)?;
    let token = uuid::Uuid::new_v4().simple().to_string();
    let template = temp_dir.join(format!("audio_{token}.%(ext)s"));

    info!("Downloading audio track from {url}");

    let result = tokio::time::timeout(
        DOWNLOAD_TIMEOUT,
        tokio::process::Command::new("yt-dlp")
            .args(["--format", "bestaudio[ext=m4a]/bestaudio"])
            .arg("--output")
            .arg(&template)
            .args(["--no-warnings", "--no-playlist"])
            .arg(url)
            .output(),
    )
    .await
    .map_err(|_| DubberError::TranscriptionFailed("Audio download timed out".to_string()))?;

    let output = result
        .map_err(|e| DubberError::TranscriptionFailed(format!("Failed to run yt-dlp: {e}")))?;

    if !output.status.success() {
        return Err(DubberError::TranscriptionFailed(format!(
            "Audio download failed: {}",
            stderr_tail(&output.stderr)
        )));
    }

    find_by_prefix(temp_dir, &format!("audio_{token}."))
        .ok_or_else(|| DubberError::TranscriptionFailed("Downloaded audio not found".to_string()))
}

/// Convert any audio input to mono 16-bit PCM WAV at 16 kHz, the format
/// the recognizer expects. `limit_seconds` trims test-mode input.
pub async fn convert_to_wav(
    input: &Path,
    output: &Path,
    limit_seconds: Option<u32>,
) -> Result<()> {
    if !input.exists() {
        return Err(DubberError::TranscriptionFailed(format!(
            "Audio file not found: {}",
            input.display()
        )));
    }

    let mut cmd = tokio::process::Command::new("ffmpeg");
    cmd.arg("-y").arg("-i").arg(input);
    if let Some(limit) = limit_seconds {
        cmd.args(["-t", &limit.to_string()]);
    }
    cmd.args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"]);
    cmd.arg(output);

    debug!("Converting {} to 16kHz mono WAV", input.display());

    let result = tokio::time::timeout(CONVERT_TIMEOUT, cmd.output())
        .await
        .map_err(|_| DubberError::TranscriptionFailed("Audio conversion timed out".to_string()))?;

    let output_result = result
        .map_err(|e| DubberError::TranscriptionFailed(format!("Failed to run ffmpeg: {e}")))?;

    if !output_result.status.success() {
        return Err(DubberError::TranscriptionFailed(format!(
            "Audio conversion failed: {}",
            stderr_tail(&output_result.stderr)
        )));
    }

    if !output.exists() {
        return Err(DubberError::TranscriptionFailed(
            "Converted audio file was not created".to_string(),
        ));
    }
    Ok(())
}

fn find_by_prefix(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.is_file()
                && p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(prefix))
                    .unwrap_or(false)
        })
}
