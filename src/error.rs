use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DubberError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Translation failed: {0}")]
    TranslationFailed(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Muxing failed: {0}")]
    MuxingFailed(String),

    #[error("Estimated cost ${estimated:.4} exceeds budget ${budget:.4}")]
    BudgetExceeded { estimated: f64, budget: f64 },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Stage timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error classification used by the HTTP layer to pick status codes
/// and by the orchestrator to record `error.kind` on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ProviderNotAvailable,
    VoiceNotFound,
    TranscriptionFailed,
    TranslationFailed,
    SynthesisFailed,
    MuxingFailed,
    BudgetExceeded,
    Cancelled,
    Timeout,
    Internal,
}

impl DubberError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DubberError::InvalidInput(_) => ErrorKind::InvalidInput,
            DubberError::ProviderNotAvailable(_) => ErrorKind::ProviderNotAvailable,
            DubberError::VoiceNotFound(_) => ErrorKind::VoiceNotFound,
            DubberError::TranscriptionFailed(_) => ErrorKind::TranscriptionFailed,
            DubberError::TranslationFailed(_) => ErrorKind::TranslationFailed,
            DubberError::SynthesisFailed(_) => ErrorKind::SynthesisFailed,
            DubberError::MuxingFailed(_) => ErrorKind::MuxingFailed,
            DubberError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            DubberError::Cancelled => ErrorKind::Cancelled,
            DubberError::Timeout(_) => ErrorKind::Timeout,
            DubberError::Config(_)
            | DubberError::Io(_)
            | DubberError::Http(_)
            | DubberError::Json(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, DubberError>;
