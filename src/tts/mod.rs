pub mod assemble;
pub mod elevenlabs;
pub mod google;
pub mod plan;
pub mod registry;

pub use elevenlabs::ElevenLabsSynthesizer;
pub use google::GoogleTtsSynthesizer;
pub use registry::{ProviderInfo, ProviderPreference, ProviderRegistry};

use crate::error::{DubberError, Result};
use crate::job::progress::ProgressFn;
use crate::tts::assemble::{assemble_groups, read_pcm_samples};
use crate::tts::plan::SegmentGroup;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Identifier for a TTS provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsProvider {
    Elevenlabs,
    GoogleTts,
}

impl TtsProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsProvider::Elevenlabs => "elevenlabs",
            TtsProvider::GoogleTts => "google_tts",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TtsProvider::Elevenlabs => "ElevenLabs",
            TtsProvider::GoogleTts => "Google Cloud Text-to-Speech",
        }
    }
}

impl std::fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output audio quality requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl std::str::FromStr for AudioQuality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(AudioQuality::Low),
            "medium" => Ok(AudioQuality::Medium),
            "high" => Ok(AudioQuality::High),
            _ => Err(format!("Unknown audio quality: {s}. Use low, medium, high")),
        }
    }
}

/// A voice as presented by a provider, normalized across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub voice_id: String,
    pub display_name: String,
    pub language_tag: String,
    pub gender: Option<String>,
    pub provider: TtsProvider,
    pub premium: bool,
    pub category: Option<String>,
    pub preview_url: Option<String>,
    pub labels: Option<std::collections::HashMap<String, String>>,
}

/// How a synthesis was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMethod {
    SingleCall,
    Chunked,
}

/// Result of synthesizing a timed script to an audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub audio_file_path: PathBuf,
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    pub format: String,
    pub sample_rate: u32,
    pub estimated_cost: f64,
    pub processing_time_seconds: f64,
    pub provider: TtsProvider,
    pub voice_id: String,
    pub model_used: Option<String>,
    pub method: SynthesisMethod,
    pub segments_processed: usize,
    pub total_characters: usize,
}

/// Minimum accountable synthesis cost in USD.
pub const MIN_COST_USD: f64 = 0.0001;

/// Inputs at or below these limits use single-call mode.
pub const SHORT_SYNTH_THRESHOLD_CHARS: usize = 10_000;
pub const SHORT_SYNTH_THRESHOLD_SEGMENTS: usize = 50;

/// Capability set every TTS provider exposes. The orchestrator and registry
/// depend only on this trait.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn provider(&self) -> TtsProvider;

    /// Cost per 1 000 characters in USD.
    fn cost_per_1k_chars(&self) -> f64;

    /// Minimal capability probe: list voices. Availability is defined as
    /// this call succeeding.
    async fn list_voices(&self) -> Result<Vec<VoiceProfile>>;

    async fn validate_voice_id(&self, voice_id: &str) -> Result<bool>;

    /// Synthesize a timed script to `output_path`.
    async fn synthesize_script(
        &self,
        script: &str,
        voice_id: &str,
        output_path: &Path,
        quality: AudioQuality,
        progress: ProgressFn,
        cancelled: Arc<AtomicBool>,
    ) -> Result<SynthesisResult>;

    fn estimate_cost(&self, character_count: usize) -> f64 {
        let cost = (character_count as f64 / 1000.0) * self.cost_per_1k_chars();
        cost.max(MIN_COST_USD)
    }
}

/// File extension the synthesizer will effectively produce for a script of
/// this size: chunked mode always assembles WAV; single-call mode writes
/// whatever container the provider returns.
pub fn suggested_extension(
    provider: TtsProvider,
    quality: AudioQuality,
    script_chars: usize,
) -> &'static str {
    if script_chars > SHORT_SYNTH_THRESHOLD_CHARS {
        return "wav";
    }
    match (provider, quality) {
        (TtsProvider::GoogleTts, AudioQuality::High) => "wav",
        _ => "mp3",
    }
}

/// Find a voice by display name (case-insensitive).
pub async fn find_voice_by_name(
    synthesizer: &dyn Synthesizer,
    name: &str,
) -> Result<Option<VoiceProfile>> {
    let voices = synthesizer.list_voices().await?;
    Ok(voices
        .into_iter()
        .find(|v| v.display_name.eq_ignore_ascii_case(name)))
}

/// Narrow a voice listing by language tag and/or gender.
pub fn filter_voices(
    voices: Vec<VoiceProfile>,
    language: Option<&str>,
    gender: Option<&str>,
) -> Vec<VoiceProfile> {
    voices
        .into_iter()
        .filter(|v| language.map_or(true, |l| v.language_tag.eq_ignore_ascii_case(l)))
        .filter(|v| {
            gender.map_or(true, |g| {
                v.gender
                    .as_deref()
                    .map_or(false, |vg| vg.eq_ignore_ascii_case(g))
            })
        })
        .collect()
}

/// Pick a voice for the given criteria, preferring premium voices.
pub async fn recommended_voice(
    synthesizer: &dyn Synthesizer,
    language: &str,
    gender: Option<&str>,
) -> Result<Option<VoiceProfile>> {
    let voices = filter_voices(synthesizer.list_voices().await?, Some(language), gender);
    Ok(voices
        .iter()
        .find(|v| v.premium)
        .cloned()
        .or_else(|| voices.into_iter().next()))
}

/// Drive the chunked synthesis engine: synthesize each segment group to a
/// temp PCM file with bounded parallelism, then assemble the final track by
/// overlaying each group at its declared start time.
///
/// The assembled audio is deterministic regardless of completion order.
/// Any group failure fails the whole synthesis and removes temps.
pub(crate) async fn run_chunked<F, Fut>(
    groups: &[SegmentGroup],
    max_parallel: usize,
    sample_rate: u32,
    output_path: &Path,
    synth_group: F,
    progress: ProgressFn,
    cancelled: Arc<AtomicBool>,
) -> Result<f64>
where
    F: Fn(usize, SegmentGroup, PathBuf) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let temp_base = output_path.to_path_buf();
    let temp_path = |i: usize| -> PathBuf {
        let mut p = temp_base.as_os_str().to_owned();
        p.push(format!(".group_{i}.pcm"));
        PathBuf::from(p)
    };

    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let total = groups.len();
    let done = std::sync::atomic::AtomicUsize::new(0);

    let mut futures = FuturesUnordered::new();
    for (i, group) in groups.iter().enumerate() {
        let sem = semaphore.clone();
        let cancelled = cancelled.clone();
        let path = temp_path(i);
        let group = group.clone();
        let synth = &synth_group;
        let progress = progress.clone();
        let done = &done;

        futures.push(async move {
            if cancelled.load(Ordering::Relaxed) {
                return Err(DubberError::Cancelled);
            }
            let _permit = sem.acquire().await.map_err(|_| {
                DubberError::SynthesisFailed("Synthesis semaphore closed".to_string())
            })?;

            debug!("Synthesizing group {}/{}", i + 1, total);
            synth(i, group, path).await?;

            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            progress((finished * 90 / total) as u8);
            Ok::<_, DubberError>(())
        });
    }

    let mut failure: Option<DubberError> = None;
    while let Some(result) = futures.next().await {
        if let Err(e) = result {
            if failure.is_none() {
                failure = Some(e);
            }
        }
    }
    drop(futures);

    if let Some(e) = failure {
        for i in 0..total {
            let _ = std::fs::remove_file(temp_path(i));
        }
        return Err(e);
    }

    // Load every group's PCM and place it at its group start time.
    let mut placed = Vec::with_capacity(total);
    for (i, group) in groups.iter().enumerate() {
        let path = temp_path(i);
        let samples = read_pcm_samples(&path, sample_rate)?;
        placed.push((group.start_seconds, samples));
    }

    let total_duration = groups
        .iter()
        .map(|g| g.end_seconds)
        .fold(0.0f64, f64::max);

    let duration = assemble_groups(&placed, total_duration, sample_rate, output_path)?;

    for i in 0..total {
        if let Err(e) = std::fs::remove_file(temp_path(i)) {
            warn!("Failed to remove synthesis temp file: {e}");
        }
    }

    progress(100);
    Ok(duration)
}
