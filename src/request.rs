//! Request and response contracts exposed to the HTTP layer. Decoding a
//! submission into a `DubbingRequest` and validating it is the only entry
//! point into the pipeline.

use crate::error::{DubberError, ErrorKind, Result};
use crate::job::registry::JobSummary;
use crate::job::{Job, JobStatus};
use crate::translate::TranslationContext;
use crate::tts::{AudioQuality, TtsProvider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported output video containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Webm,
    Avi,
    Mkv,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Avi => "avi",
            VideoFormat::Mkv => "mkv",
        }
    }
}

impl std::str::FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp4" => Ok(VideoFormat::Mp4),
            "webm" => Ok(VideoFormat::Webm),
            "avi" => Ok(VideoFormat::Avi),
            "mkv" => Ok(VideoFormat::Mkv),
            _ => Err(format!("Unknown video format: {s}")),
        }
    }
}

/// TTS provider preference as submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsProviderChoice {
    #[default]
    Auto,
    Elevenlabs,
    GoogleTts,
}

impl TtsProviderChoice {
    pub fn explicit(&self) -> Option<TtsProvider> {
        match self {
            TtsProviderChoice::Auto => None,
            TtsProviderChoice::Elevenlabs => Some(TtsProvider::Elevenlabs),
            TtsProviderChoice::GoogleTts => Some(TtsProvider::GoogleTts),
        }
    }
}

/// A full dubbing submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DubbingRequest {
    /// Source video location.
    pub url: String,
    /// Limit processing to the first 60 seconds of the source.
    pub test_mode: bool,
    /// Emit pause markers in the transcript.
    pub breath_detection: bool,
    /// Enable LLM-based transcript reformatting.
    pub use_postprocess: bool,
    /// Post-processing model; `"auto-detect"` triggers the fallback order.
    pub postprocess_model: Option<String>,

    /// Spoken language of the source video.
    pub source_language: String,

    pub enable_translation: bool,
    pub target_language: String,
    pub translation_context: TranslationContext,
    pub target_audience: String,
    pub desired_tone: String,

    pub enable_synthesis: bool,
    pub tts_provider: TtsProviderChoice,
    pub voice_id: Option<String>,
    pub audio_quality: AudioQuality,

    pub enable_video_muxing: bool,
    pub video_format: VideoFormat,
    pub preserve_video_quality: bool,

    pub max_cost_usd: Option<f64>,
    /// Produce a ≤30 s preview instead of the full output.
    pub preview_mode: bool,

    /// Pre-existing transcript; skips the transcription stage.
    pub existing_transcript: Option<String>,
}

impl Default for DubbingRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            test_mode: false,
            breath_detection: true,
            use_postprocess: false,
            postprocess_model: None,
            source_language: "hu-HU".to_string(),
            enable_translation: false,
            target_language: "en-US".to_string(),
            translation_context: TranslationContext::Casual,
            target_audience: "general public".to_string(),
            desired_tone: "neutral".to_string(),
            enable_synthesis: false,
            tts_provider: TtsProviderChoice::Auto,
            voice_id: None,
            audio_quality: AudioQuality::High,
            enable_video_muxing: false,
            video_format: VideoFormat::Mp4,
            preserve_video_quality: true,
            max_cost_usd: None,
            preview_mode: false,
            existing_transcript: None,
        }
    }
}

impl DubbingRequest {
    /// Decode a JSON submission body into a validated request.
    pub fn decode(body: &str) -> Result<Self> {
        let request: DubbingRequest = serde_json::from_str(body)
            .map_err(|e| DubberError::InvalidInput(format!("Malformed request body: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    /// Cross-field validation. Every violation maps to `InvalidInput`.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(DubberError::InvalidInput("url is required".to_string()));
        }

        let is_remote = self.url.starts_with("http://") || self.url.starts_with("https://");
        if !is_remote && !std::path::Path::new(&self.url).exists() {
            return Err(DubberError::InvalidInput(format!(
                "url must be an http(s) URL or an existing local path: {}",
                self.url
            )));
        }

        if self.enable_video_muxing && !self.enable_synthesis {
            return Err(DubberError::InvalidInput(
                "enable_video_muxing requires enable_synthesis".to_string(),
            ));
        }

        // AUTO selection can fall back to a per-language default voice;
        // an explicit provider needs an explicit voice.
        if self.enable_synthesis
            && self.voice_id.as_deref().map_or(true, str::is_empty)
            && self.tts_provider.explicit().is_some()
        {
            return Err(DubberError::InvalidInput(
                "voice_id is required when a TTS provider is selected explicitly".to_string(),
            ));
        }

        if let Some(budget) = self.max_cost_usd {
            if !budget.is_finite() || budget < 0.0 {
                return Err(DubberError::InvalidInput(format!(
                    "max_cost_usd must be a non-negative number, got {budget}"
                )));
            }
        }

        if self.enable_translation && self.target_language.trim().is_empty() {
            return Err(DubberError::InvalidInput(
                "target_language is required when translation is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// A minimal valid request, used by tests.
    pub fn example() -> Self {
        Self {
            url: "https://example.com/watch?v=abc123".to_string(),
            ..Default::default()
        }
    }
}

/// Response to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub estimated_duration_minutes: f64,
    pub estimated_cost_usd: f64,
}

impl From<&Job> for SubmitResponse {
    fn from(job: &Job) -> Self {
        let estimated_duration_minutes = if job.request.test_mode { 1.0 } else { 30.0 };
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            progress: job.progress,
            estimated_duration_minutes,
            estimated_cost_usd: job.estimated_cost.total_cost,
        }
    }
}

/// Response to a status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::job::JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_breakdown: Option<crate::cost::CostBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
}

impl From<&Job> for StatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            progress: job.progress,
            error: job.error.clone(),
            transcript_file: job
                .transcription_result
                .as_ref()
                .map(|t| t.transcript_file.clone()),
            translation_file: job
                .translation_result
                .as_ref()
                .and_then(|t| t.translated_file.clone()),
            audio_file: job
                .synthesis_result
                .as_ref()
                .map(|s| s.audio_file_path.clone()),
            video_file: job
                .muxing_result
                .as_ref()
                .map(|m| m.video_file_path.clone()),
            cost_breakdown: Some(job.actual_cost.clone()),
            processing_time_seconds: job.processing_time_seconds(),
        }
    }
}

/// Response to a listing query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub total_count: usize,
}

/// File kinds servable from a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    Transcript,
    Audio,
    Video,
}

impl std::str::FromStr for DownloadKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transcript" => Ok(DownloadKind::Transcript),
            "audio" => Ok(DownloadKind::Audio),
            "video" => Ok(DownloadKind::Video),
            _ => Err(format!("Unknown file_type: {s}")),
        }
    }
}

impl DownloadKind {
    /// Resolve the on-disk file backing a download request. Errors carry
    /// the kind the HTTP layer maps onto 404 (not ready) vs 400 (job of
    /// the wrong kind).
    pub fn resolve(&self, job: &Job) -> Result<PathBuf> {
        let (enabled, path) = match self {
            DownloadKind::Transcript => (
                true,
                job.transcription_result
                    .as_ref()
                    .map(|t| t.transcript_file.clone()),
            ),
            DownloadKind::Audio => (
                job.request.enable_synthesis,
                job.synthesis_result
                    .as_ref()
                    .map(|s| s.audio_file_path.clone()),
            ),
            DownloadKind::Video => (
                job.request.enable_video_muxing,
                job.muxing_result
                    .as_ref()
                    .map(|m| m.video_file_path.clone()),
            ),
        };

        if !enabled {
            return Err(DubberError::InvalidInput(format!(
                "Job {} did not request this output kind",
                job.job_id
            )));
        }

        path.ok_or_else(|| {
            DubberError::InvalidInput(format!("Job {} output is not ready", job.job_id))
        })
        .and_then(|p| {
            if p.exists() {
                Ok(p)
            } else {
                Err(DubberError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Result file missing: {}", p.display()),
                )))
            }
        })
    }
}

/// HTTP status code for an error kind, per the error-taxonomy contract.
pub fn http_status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::InvalidInput => 400,
        ErrorKind::ProviderNotAvailable => 503,
        ErrorKind::VoiceNotFound => 400,
        ErrorKind::TranscriptionFailed
        | ErrorKind::TranslationFailed
        | ErrorKind::SynthesisFailed
        | ErrorKind::MuxingFailed => 502,
        ErrorKind::BudgetExceeded => 402,
        ErrorKind::Cancelled => 409,
        ErrorKind::Timeout => 504,
        ErrorKind::Internal => 500,
    }
}
