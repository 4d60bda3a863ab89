//! Pre- and post-hoc cost arithmetic per stage.

use serde::{Deserialize, Serialize};

/// Transcription: $0.016 per minute of audio.
pub const TRANSCRIPTION_COST_PER_MINUTE: f64 = 0.016;

/// Translation: $20 per 1M characters.
pub const TRANSLATION_COST_PER_MILLION_CHARS: f64 = 20.0;

/// Fixed muxing and storage estimates.
pub const VIDEO_PROCESSING_COST: f64 = 0.05;
pub const STORAGE_COST: f64 = 0.10;

/// Speaking-rate assumptions for estimating transcript size from duration.
const WORDS_PER_MINUTE: f64 = 150.0;
const CHARS_PER_WORD: f64 = 5.0;

/// Per-stage cost breakdown. `total_cost` is always the exact sum of the
/// components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub transcription_cost: f64,
    pub translation_cost: f64,
    pub synthesis_cost: f64,
    pub video_processing_cost: f64,
    pub storage_cost: f64,
    pub total_cost: f64,
}

impl CostBreakdown {
    /// Recompute the total from the components.
    pub fn finalize(mut self) -> Self {
        self.total_cost = self.transcription_cost
            + self.translation_cost
            + self.synthesis_cost
            + self.video_processing_cost
            + self.storage_cost;
        self
    }
}

/// Inputs to the a-priori estimate.
#[derive(Debug, Clone)]
pub struct EstimateParams {
    /// Known transcript length; when absent, estimated from duration.
    pub transcript_chars: Option<usize>,
    pub estimated_duration_seconds: f64,
    pub enable_translation: bool,
    pub enable_synthesis: bool,
    pub enable_video_muxing: bool,
    /// Synthesis rate of the (expected) provider, USD per 1K characters.
    pub synthesis_rate_per_1k: f64,
}

/// Estimate the cost of a job before running it.
pub fn estimate(params: &EstimateParams) -> CostBreakdown {
    let duration_minutes = params.estimated_duration_seconds / 60.0;

    let chars = params
        .transcript_chars
        .map(|c| c as f64)
        .unwrap_or(duration_minutes * WORDS_PER_MINUTE * CHARS_PER_WORD);

    let mut breakdown = CostBreakdown {
        transcription_cost: duration_minutes * TRANSCRIPTION_COST_PER_MINUTE,
        ..Default::default()
    };

    if params.enable_translation {
        breakdown.translation_cost = (chars / 1_000_000.0) * TRANSLATION_COST_PER_MILLION_CHARS;
    }
    if params.enable_synthesis {
        breakdown.synthesis_cost =
            ((chars / 1000.0) * params.synthesis_rate_per_1k).max(crate::tts::MIN_COST_USD);
    }
    if params.enable_video_muxing {
        breakdown.video_processing_cost = VIDEO_PROCESSING_COST;
        breakdown.storage_cost = STORAGE_COST;
    }

    breakdown.finalize()
}
