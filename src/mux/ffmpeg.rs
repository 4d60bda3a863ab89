//! FFmpeg-backed muxer: replaces a video's audio track with synthesized
//! audio, or builds a short preview.

use crate::error::{DubberError, Result};
use crate::job::progress::ProgressFn;
use crate::mux::download::{download_video_only, download_video_segment};
use crate::mux::probe::{probe_audio, probe_video, AudioInfo, VideoInfo};
use crate::mux::{stderr_tail, Muxer, MuxingResult};
use crate::request::VideoFormat;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Hard cap on a single mux run.
const MUX_TIMEOUT: Duration = Duration::from_secs(1800);
const TRIM_TIMEOUT: Duration = Duration::from_secs(60);

/// Tolerated video/audio duration drift before warning.
const DURATION_TOLERANCE: f64 = 0.10;

pub struct FfmpegMuxer {
    temp_dir: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(temp_dir: PathBuf) -> Self {
        Self { temp_dir }
    }

    /// Warn about duration drift. Short audio still proceeds (the track
    /// simply ends early); long audio is handled by `-shortest`.
    fn validate_duration_compatibility(video: &VideoInfo, audio: &AudioInfo) {
        let diff = (video.duration - audio.duration).abs();
        if diff > video.duration * DURATION_TOLERANCE {
            warn!(
                "Duration mismatch: video={:.1}s, audio={:.1}s",
                video.duration, audio.duration
            );
            if audio.duration < video.duration * 0.8 {
                warn!("Audio significantly shorter than video");
            }
            if audio.duration > video.duration * 1.2 {
                warn!("Audio will be trimmed to match video");
            }
        }
    }

    fn build_ffmpeg_command(
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
        preserve_quality: bool,
        target_format: VideoFormat,
    ) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("ffmpeg");
        cmd.arg("-y");
        cmd.arg("-i").arg(video_path);
        cmd.arg("-i").arg(audio_path);

        if preserve_quality {
            cmd.args(["-c:v", "copy"]);
        } else {
            cmd.args(["-c:v", "libx264", "-crf", "23"]);
        }

        cmd.args(["-c:a", "aac", "-b:a", "128k", "-ac", "2", "-ar", "44100"]);
        cmd.args(["-map", "0:v:0", "-map", "1:a:0"]);
        cmd.args(["-shortest", "-avoid_negative_ts", "make_zero"]);

        if target_format == VideoFormat::Mp4 {
            cmd.args(["-movflags", "+faststart"]);
        }

        cmd.arg(output_path);
        cmd
    }

    async fn mux(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
        preserve_quality: bool,
        target_format: VideoFormat,
    ) -> Result<(VideoInfo, u64)> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut cmd = Self::build_ffmpeg_command(
            video_path,
            audio_path,
            output_path,
            preserve_quality,
            target_format,
        );
        debug!("Running ffmpeg mux into {}", output_path.display());

        let run = async {
            let output = cmd
                .output()
                .await
                .map_err(|e| DubberError::MuxingFailed(format!("Failed to run ffmpeg: {e}")))?;
            if !output.status.success() {
                return Err(DubberError::MuxingFailed(format!(
                    "ffmpeg failed: {}",
                    stderr_tail(&output.stderr)
                )));
            }
            Ok(())
        };

        let result = tokio::time::timeout(MUX_TIMEOUT, run)
            .await
            .map_err(|_| DubberError::MuxingFailed("ffmpeg timed out (30 minutes)".to_string()))
            .and_then(|r| r);

        if let Err(e) = result {
            // Never leave partial output behind.
            let _ = std::fs::remove_file(output_path);
            return Err(e);
        }

        let size = std::fs::metadata(output_path).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            let _ = std::fs::remove_file(output_path);
            return Err(DubberError::MuxingFailed(
                "Output file was not created or is empty".to_string(),
            ));
        }

        let info = probe_video(output_path).await?;
        Ok((info, size))
    }

    /// Trim an audio file to the preview span without re-encoding.
    async fn trim_audio(&self, audio_path: &Path, duration_sec: u32) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let token = uuid::Uuid::new_v4().simple().to_string();
        let target = self.temp_dir.join(format!("audio_trim_{token}.mka"));

        let run = tokio::process::Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(audio_path)
            .args(["-ss", "0", "-t", &duration_sec.to_string(), "-c:a", "copy"])
            .arg(&target)
            .output();

        let output = tokio::time::timeout(TRIM_TIMEOUT, run)
            .await
            .map_err(|_| DubberError::MuxingFailed("Audio trim timed out".to_string()))?
            .map_err(|e| DubberError::MuxingFailed(format!("Failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(DubberError::MuxingFailed(format!(
                "Audio trimming failed: {}",
                stderr_tail(&output.stderr)
            )));
        }
        Ok(target)
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn replace_audio(
        &self,
        video_source: &str,
        audio_file: &Path,
        output_path: &Path,
        preserve_video_quality: bool,
        target_format: VideoFormat,
        progress: ProgressFn,
    ) -> Result<MuxingResult> {
        let start_time = Instant::now();

        if !audio_file.exists() {
            return Err(DubberError::MuxingFailed(format!(
                "Audio file not found: {}",
                audio_file.display()
            )));
        }

        let was_downloaded = !Path::new(video_source).is_file();
        let video_path = download_video_only(video_source, &self.temp_dir).await?;
        progress(30);

        let result = async {
            let video_info = probe_video(&video_path).await?;
            let audio_info = probe_audio(audio_file).await?;
            info!(
                "Muxing: video {:.1}s {} / audio {:.1}s {}Hz",
                video_info.duration,
                video_info.resolution(),
                audio_info.duration,
                audio_info.sample_rate
            );
            progress(40);

            Self::validate_duration_compatibility(&video_info, &audio_info);

            let (output_info, file_size) = self
                .mux(
                    &video_path,
                    audio_file,
                    output_path,
                    preserve_video_quality,
                    target_format,
                )
                .await?;
            progress(95);

            Ok(MuxingResult {
                video_file_path: output_path.to_path_buf(),
                original_video_duration: video_info.duration,
                audio_duration: audio_info.duration,
                final_video_duration: output_info.duration,
                file_size_bytes: file_size,
                format: target_format,
                resolution: output_info.resolution(),
                video_codec: output_info.codec,
                processing_time_seconds: start_time.elapsed().as_secs_f64(),
                is_preview: false,
            })
        }
        .await;

        // The downloaded video-only temp goes away on every exit path.
        if was_downloaded {
            if let Err(e) = std::fs::remove_file(&video_path) {
                warn!("Failed to remove temp video: {e}");
            }
        }

        progress(100);
        result
    }

    async fn create_preview(
        &self,
        video_source: &str,
        audio_file: &Path,
        output_path: &Path,
        duration_seconds: u32,
        progress: ProgressFn,
    ) -> Result<MuxingResult> {
        let start_time = Instant::now();
        info!("Creating {duration_seconds}s preview");

        let video_path =
            download_video_segment(video_source, &self.temp_dir, 0, duration_seconds).await?;
        progress(30);

        let trimmed_audio = match self.trim_audio(audio_file, duration_seconds).await {
            Ok(p) => p,
            Err(e) => {
                let _ = std::fs::remove_file(&video_path);
                return Err(e);
            }
        };
        progress(50);

        let result = async {
            let video_info = probe_video(&video_path).await?;
            let audio_info = probe_audio(&trimmed_audio).await?;

            let (output_info, file_size) = self
                .mux(
                    &video_path,
                    &trimmed_audio,
                    output_path,
                    true,
                    VideoFormat::Mp4,
                )
                .await?;

            Ok(MuxingResult {
                video_file_path: output_path.to_path_buf(),
                original_video_duration: video_info.duration,
                audio_duration: audio_info.duration,
                final_video_duration: output_info.duration,
                file_size_bytes: file_size,
                format: VideoFormat::Mp4,
                resolution: output_info.resolution(),
                video_codec: output_info.codec,
                processing_time_seconds: start_time.elapsed().as_secs_f64(),
                is_preview: true,
            })
        }
        .await;

        for temp in [&video_path, &trimmed_audio] {
            if let Err(e) = std::fs::remove_file(temp) {
                warn!("Failed to remove preview temp file: {e}");
            }
        }

        progress(100);
        result
    }
}
