//! FFprobe-backed media inspection.

use crate::error::{DubberError, Result};
use crate::mux::stderr_tail;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Video stream facts needed by the muxer.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub bitrate: u64,
    pub fps: f64,
}

impl VideoInfo {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Audio stream facts needed by the muxer.
#[derive(Debug, Clone)]
pub struct AudioInfo {
    pub duration: f64,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u64,
}

async fn run_ffprobe(path: &Path) -> Result<FfprobeOutput> {
    let result = tokio::time::timeout(
        PROBE_TIMEOUT,
        tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output(),
    )
    .await
    .map_err(|_| DubberError::MuxingFailed("ffprobe timed out".to_string()))?;

    let output =
        result.map_err(|e| DubberError::MuxingFailed(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(DubberError::MuxingFailed(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            stderr_tail(&output.stderr)
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| DubberError::MuxingFailed(format!("Failed to parse ffprobe output: {e}")))
}

/// Probe a video file for duration, resolution, codec, framerate, bitrate.
pub async fn probe_video(path: &Path) -> Result<VideoInfo> {
    let probe = run_ffprobe(path).await?;
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            DubberError::MuxingFailed(format!("No video stream found in {}", path.display()))
        })?;

    let info = VideoInfo {
        duration: probe.format.duration_seconds(),
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        codec: stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        bitrate: probe.format.bitrate(),
        fps: parse_framerate(stream.r_frame_rate.as_deref().unwrap_or("0/0")),
    };
    debug!(
        "Probed video {}: {:.1}s {}",
        path.display(),
        info.duration,
        info.resolution()
    );
    Ok(info)
}

/// Probe an audio file for duration, codec, sample rate, channels.
pub async fn probe_audio(path: &Path) -> Result<AudioInfo> {
    let probe = run_ffprobe(path).await?;
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| {
            DubberError::MuxingFailed(format!("No audio stream found in {}", path.display()))
        })?;

    Ok(AudioInfo {
        duration: probe.format.duration_seconds(),
        codec: stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        sample_rate: stream
            .sample_rate
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        channels: stream.channels.unwrap_or(0),
        bitrate: stream
            .bit_rate
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    })
}

/// Parse FFmpeg framerate notation (`30000/1001` or plain `25`).
fn parse_framerate(framerate: &str) -> f64 {
    if let Some((num, den)) = framerate.split_once('/') {
        let num: f64 = num.parse().unwrap_or(0.0);
        let den: f64 = den.parse().unwrap_or(0.0);
        if den > 0.0 {
            return num / den;
        }
        return 0.0;
    }
    framerate.parse().unwrap_or(0.0)
}

// FFprobe JSON shapes (numbers arrive as strings).

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize, Default)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

impl FfprobeFormat {
    fn duration_seconds(&self) -> f64 {
        self.duration
            .as_deref()
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0)
    }

    fn bitrate(&self) -> u64 {
        self.bit_rate
            .as_deref()
            .and_then(|b| b.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    bit_rate: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_framerate_fraction() {
        assert!((parse_framerate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_framerate("25/1"), 25.0);
    }

    #[test]
    fn test_parse_framerate_plain_and_invalid() {
        assert_eq!(parse_framerate("24"), 24.0);
        assert_eq!(parse_framerate("0/0"), 0.0);
        assert_eq!(parse_framerate("garbage"), 0.0);
    }

    #[test]
    fn test_ffprobe_json_decoding() {
        let json = r#"{
            "format": {"duration": "120.5", "bit_rate": "2500000"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920,
                 "height": 1080, "r_frame_rate": "30/1"},
                {"codec_type": "audio", "codec_name": "aac",
                 "sample_rate": "44100", "channels": 2, "bit_rate": "128000"}
            ]
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.format.duration_seconds(), 120.5);
        assert_eq!(parsed.streams.len(), 2);
        assert_eq!(parsed.streams[0].width, Some(1920));
        assert_eq!(parsed.streams[1].sample_rate.as_deref(), Some("44100"));
    }

    #[test]
    fn test_resolution_format() {
        let info = VideoInfo {
            duration: 1.0,
            width: 1280,
            height: 720,
            codec: "h264".into(),
            bitrate: 0,
            fps: 30.0,
        };
        assert_eq!(info.resolution(), "1280x720");
    }
}
