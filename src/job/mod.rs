pub mod orchestrator;
pub mod progress;
pub mod registry;

pub use orchestrator::Orchestrator;
pub use registry::JobRegistry;

use crate::cost::CostBreakdown;
use crate::error::ErrorKind;
use crate::mux::MuxingResult;
use crate::request::DubbingRequest;
use crate::transcribe::TranscriptionResult;
use crate::translate::TranslationResult;
use crate::tts::SynthesisResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a dubbing job. Transitions are strictly forward except
/// into `Failed`/`Cancelled`, which are reachable from any non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Transcribing,
    Translating,
    Synthesizing,
    Muxing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Translating => "translating",
            JobStatus::Synthesizing => "synthesizing",
            JobStatus::Muxing => "muxing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error recorded on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    pub stage_of_failure: JobStatus,
}

/// A dubbing job and everything it has produced so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub request: DubbingRequest,
    pub status: JobStatus,
    pub progress: u8,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub transcription_result: Option<TranscriptionResult>,
    pub translation_result: Option<TranslationResult>,
    pub synthesis_result: Option<SynthesisResult>,
    pub muxing_result: Option<MuxingResult>,

    pub estimated_cost: CostBreakdown,
    pub actual_cost: CostBreakdown,

    pub error: Option<JobError>,
}

impl Job {
    pub fn new(job_id: String, request: DubbingRequest) -> Self {
        Self {
            job_id,
            request,
            status: JobStatus::Pending,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            transcription_result: None,
            translation_result: None,
            synthesis_result: None,
            muxing_result: None,
            estimated_cost: CostBreakdown::default(),
            actual_cost: CostBreakdown::default(),
            error: None,
        }
    }

    /// Seconds between start and completion, once both are known.
    pub fn processing_time_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// Every artifact path referenced by a stage result. These are the
    /// files kept on success and deleted on failure.
    pub fn result_files(&self) -> Vec<std::path::PathBuf> {
        let mut files = Vec::new();
        if let Some(t) = &self.transcription_result {
            files.push(t.transcript_file.clone());
        }
        if let Some(t) = &self.translation_result {
            if let Some(f) = &t.translated_file {
                files.push(f.clone());
            }
        }
        if let Some(s) = &self.synthesis_result {
            files.push(s.audio_file_path.clone());
        }
        if let Some(m) = &self.muxing_result {
            files.push(m.video_file_path.clone());
        }
        files
    }
}
