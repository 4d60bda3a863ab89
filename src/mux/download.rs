//! Video download via the external downloader, biased toward video-only
//! tracks to save bandwidth.

use crate::error::{DubberError, Result};
use crate::mux::stderr_tail;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const SEGMENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Format selector preferring a video-without-audio mp4 track.
const VIDEO_ONLY_FORMAT: &str = "bv[ext=mp4]/best[ext=mp4]/bv/best";

/// Download only the video track of `url` into `temp_dir`.
///
/// Local paths pass through untouched; the caller must not delete those.
pub async fn download_video_only(url: &str, temp_dir: &Path) -> Result<PathBuf> {
    if Path::new(url).is_file() {
        return Ok(PathBuf::from(url));
    }

    std::fs::create_dir_all(temp_dir)?;
    let token = uuid::Uuid::new_v4().simple().to_string();
    let template = temp_dir.join(format!("video_{token}.%(ext)s"));

    info!("Downloading video-only track from {url}");

    let result = tokio::time::timeout(
        DOWNLOAD_TIMEOUT,
        tokio::process::Command::new("yt-dlp")
            .args(["--format", VIDEO_ONLY_FORMAT])
            .arg("--output")
            .arg(&template)
            .args(["--no-warnings", "--no-playlist"])
            .arg(url)
            .output(),
    )
    .await
    .map_err(|_| DubberError::MuxingFailed("Video download timed out (10 minutes)".to_string()))?;

    let output =
        result.map_err(|e| DubberError::MuxingFailed(format!("Failed to run yt-dlp: {e}")))?;

    if !output.status.success() {
        return Err(DubberError::MuxingFailed(format!(
            "Video download failed: {}",
            stderr_tail(&output.stderr)
        )));
    }

    // yt-dlp fills in the real extension; find what it wrote.
    find_downloaded(temp_dir, &format!("video_{token}.")).ok_or_else(|| {
        DubberError::MuxingFailed("Downloaded video file not found".to_string())
    })
}

/// Download the first `duration_sec` seconds of the video track, for
/// previews.
pub async fn download_video_segment(
    url: &str,
    temp_dir: &Path,
    start_sec: u32,
    duration_sec: u32,
) -> Result<PathBuf> {
    std::fs::create_dir_all(temp_dir)?;
    let token = uuid::Uuid::new_v4().simple().to_string();
    let target = temp_dir.join(format!("preview_{token}.mp4"));

    debug!("Downloading {duration_sec}s video segment from {url}");

    let downloader_args = format!("-ss {start_sec} -t {duration_sec}");
    let result = tokio::time::timeout(
        SEGMENT_TIMEOUT,
        tokio::process::Command::new("yt-dlp")
            .args(["--format", "bv[ext=mp4]/best[ext=mp4]"])
            .args(["--external-downloader", "ffmpeg"])
            .args(["--external-downloader-args", &downloader_args])
            .arg("--output")
            .arg(&target)
            .arg("--no-warnings")
            .arg(url)
            .output(),
    )
    .await
    .map_err(|_| DubberError::MuxingFailed("Video segment download timed out".to_string()))?;

    let output =
        result.map_err(|e| DubberError::MuxingFailed(format!("Failed to run yt-dlp: {e}")))?;

    if !output.status.success() {
        return Err(DubberError::MuxingFailed(format!(
            "Video segment download failed: {}",
            stderr_tail(&output.stderr)
        )));
    }

    if !target.exists() {
        return Err(DubberError::MuxingFailed(
            "Downloaded video segment not found".to_string(),
        ));
    }
    Ok(target)
}

fn find_downloaded(dir: &Path, prefix: &str) -> Option<PathBuf> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_path_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("input.mp4");
        std::fs::write(&local, b"fake video").unwrap();

        let result = download_video_only(local.to_str().unwrap(), dir.path())
            .await
            .unwrap();
        assert_eq!(result, local);
    }

    #[test]
    fn test_find_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("video_abc.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("other.mp4"), b"x").unwrap();

        let found = find_downloaded(dir.path(), "video_abc.").unwrap();
        assert!(found.to_string_lossy().ends_with("video_abc.webm"));
        assert!(find_downloaded(dir.path(), "video_zzz.").is_none());
    }
}
