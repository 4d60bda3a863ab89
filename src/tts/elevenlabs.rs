//! ElevenLabs premium-voice synthesizer.

use crate::error::{DubberError, Result};
use crate::job::progress::ProgressFn;
use crate::tts::plan::{estimate_duration_seconds, group_segments, plan_segments};
use crate::tts::{
    assemble, run_chunked, AudioQuality, SynthesisMethod, SynthesisResult, Synthesizer,
    TtsProvider, VoiceProfile, SHORT_SYNTH_THRESHOLD_CHARS, SHORT_SYNTH_THRESHOLD_SEGMENTS,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

/// ElevenLabs pricing: roughly $0.30 per 1K characters.
const COST_PER_1K_CHARS: f64 = 0.30;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_parallel: usize,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_parallel: 4,
        }
    }

    /// Point the client at a different endpoint (tests use a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Container format for single-call output.
    fn output_format(quality: AudioQuality) -> &'static str {
        match quality {
            AudioQuality::Low => "mp3_22050_32",
            AudioQuality::Medium => "mp3_44100_64",
            AudioQuality::High => "mp3_44100_128",
        }
    }

    /// Raw PCM sample rate used for chunked-mode requests.
    fn pcm_sample_rate(quality: AudioQuality) -> u32 {
        match quality {
            AudioQuality::Low => 16_000,
            AudioQuality::Medium => 22_050,
            AudioQuality::High => 44_100,
        }
    }

    fn voice_settings(quality: AudioQuality) -> VoiceSettings {
        match quality {
            AudioQuality::High => VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
                style: 0.0,
                use_speaker_boost: true,
            },
            AudioQuality::Medium => VoiceSettings {
                stability: 0.6,
                similarity_boost: 0.7,
                style: 0.0,
                use_speaker_boost: false,
            },
            AudioQuality::Low => VoiceSettings {
                stability: 0.7,
                similarity_boost: 0.6,
                style: 0.0,
                use_speaker_boost: false,
            },
        }
    }

    /// One text-to-speech request with retry on transient failures.
    async fn synthesize_raw(
        &self,
        text: &str,
        voice_id: &str,
        output_format: &str,
        quality: AudioQuality,
    ) -> Result<Vec<u8>> {
        let url = format!("{}/text-to-speech/{voice_id}", self.base_url);
        let body = TtsRequest {
            text: text.to_string(),
            model_id: self.model.clone(),
            output_format: output_format.to_string(),
            voice_settings: Self::voice_settings(quality),
        };

        let mut last_error: Option<DubberError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("ElevenLabs retry attempt {} after {}ms", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = self
                .client
                .post(&url)
                .header("xi-api-key", &self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.bytes().await?.to_vec());
                    }

                    let error_body = resp.text().await.unwrap_or_default();
                    match status.as_u16() {
                        401 => {
                            return Err(DubberError::ProviderNotAvailable(format!(
                                "ElevenLabs authentication failed: {error_body}"
                            )))
                        }
                        404 => {
                            return Err(DubberError::VoiceNotFound(format!(
                                "ElevenLabs voice {voice_id}: {error_body}"
                            )))
                        }
                        429 if error_body.contains("quota_exceeded") => {
                            return Err(DubberError::SynthesisFailed(format!(
                                "ElevenLabs quota exhausted: {error_body}"
                            )))
                        }
                        429 | 500..=599 => {
                            warn!("ElevenLabs transient error ({status}): {error_body}");
                            last_error = Some(DubberError::SynthesisFailed(format!(
                                "ElevenLabs error {status}: {error_body}"
                            )));
                        }
                        _ => {
                            return Err(DubberError::SynthesisFailed(format!(
                                "ElevenLabs error ({status}): {error_body}"
                            )))
                        }
                    }
                }
                Err(e) => {
                    warn!("ElevenLabs request failed: {e}");
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DubberError::SynthesisFailed("Unknown ElevenLabs error".into())))
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesizer {
    fn provider(&self) -> TtsProvider {
        TtsProvider::Elevenlabs
    }

    fn cost_per_1k_chars(&self) -> f64 {
        COST_PER_1K_CHARS
    }

    async fn list_voices(&self) -> Result<Vec<VoiceProfile>> {
        if self.api_key.is_empty() {
            return Err(DubberError::ProviderNotAvailable(
                "ELEVENLABS_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/voices", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DubberError::ProviderNotAvailable(format!(
                "ElevenLabs voice listing failed ({status}): {body}"
            )));
        }

        let parsed: VoicesResponse = response.json().await?;
        Ok(parsed
            .voices
            .into_iter()
            .map(|v| {
                let language = v
                    .labels
                    .as_ref()
                    .and_then(|l| l.get("language").cloned())
                    .unwrap_or_else(|| "en".to_string());
                let premium = v.category.as_deref() == Some("premium");
                VoiceProfile {
                    voice_id: v.voice_id,
                    display_name: v.name,
                    language_tag: language,
                    gender: v.labels.as_ref().and_then(|l| l.get("gender").cloned()),
                    provider: TtsProvider::Elevenlabs,
                    premium,
                    category: v.category,
                    preview_url: v.preview_url,
                    labels: v.labels,
                }
            })
            .collect())
    }

    async fn validate_voice_id(&self, voice_id: &str) -> Result<bool> {
        if voice_id.is_empty() {
            return Ok(false);
        }
        let voices = self.list_voices().await?;
        Ok(voices.iter().any(|v| v.voice_id == voice_id))
    }

    async fn synthesize_script(
        &self,
        script: &str,
        voice_id: &str,
        output_path: &Path,
        quality: AudioQuality,
        progress: ProgressFn,
        cancelled: Arc<AtomicBool>,
    ) -> Result<SynthesisResult> {
        let start_time = Instant::now();
        let segments = plan_segments(script)?;
        let total_characters: usize = segments.iter().map(|s| s.text.len()).sum();
        progress(5);

        // A script with no speakable segments is valid input and yields an
        // empty, well-formed audio file.
        if segments.is_empty() {
            let sample_rate = Self::pcm_sample_rate(quality);
            assemble::assemble_groups(&[], 0.0, sample_rate, output_path)?;
            progress(100);
            return Ok(SynthesisResult {
                audio_file_path: output_path.to_path_buf(),
                duration_seconds: 0.0,
                file_size_bytes: std::fs::metadata(output_path)?.len(),
                format: "wav".to_string(),
                sample_rate,
                estimated_cost: self.estimate_cost(0),
                processing_time_seconds: start_time.elapsed().as_secs_f64(),
                provider: TtsProvider::Elevenlabs,
                voice_id: voice_id.to_string(),
                model_used: Some(self.model.clone()),
                method: SynthesisMethod::SingleCall,
                segments_processed: 0,
                total_characters: 0,
            });
        }

        info!(
            "ElevenLabs synthesis: {} segments, {} characters, voice {}",
            segments.len(),
            total_characters,
            voice_id
        );

        let use_single_call = total_characters <= SHORT_SYNTH_THRESHOLD_CHARS
            && segments.len() <= SHORT_SYNTH_THRESHOLD_SEGMENTS;

        if use_single_call {
            let full_text = segments
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let format = Self::output_format(quality);
            debug!("Single-call synthesis ({} characters)", full_text.len());

            let audio = self
                .synthesize_raw(&full_text, voice_id, format, quality)
                .await?;
            progress(90);

            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(output_path, &audio)?;
            progress(100);

            return Ok(SynthesisResult {
                audio_file_path: output_path.to_path_buf(),
                duration_seconds: estimate_duration_seconds(&full_text),
                file_size_bytes: audio.len() as u64,
                format: format.to_string(),
                sample_rate: Self::pcm_sample_rate(quality),
                estimated_cost: self.estimate_cost(total_characters),
                processing_time_seconds: start_time.elapsed().as_secs_f64(),
                provider: TtsProvider::Elevenlabs,
                voice_id: voice_id.to_string(),
                model_used: Some(self.model.clone()),
                method: SynthesisMethod::SingleCall,
                segments_processed: segments.len(),
                total_characters,
            });
        }

        // Chunked mode: synthesize bounded groups as raw PCM in parallel,
        // then overlay them on a silent base track.
        let groups = group_segments(&segments);
        let sample_rate = Self::pcm_sample_rate(quality);
        let pcm_format = format!("pcm_{sample_rate}");
        debug!("Chunked synthesis: {} groups", groups.len());
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let duration = run_chunked(
            &groups,
            self.max_parallel,
            sample_rate,
            output_path,
            |_i, group, temp_path| {
                let pcm_format = pcm_format.clone();
                async move {
                    let audio = self
                        .synthesize_raw(&group.joined_text(), voice_id, &pcm_format, quality)
                        .await?;
                    std::fs::write(&temp_path, audio)?;
                    Ok(())
                }
            },
            progress.clone(),
            cancelled,
        )
        .await?;

        Ok(SynthesisResult {
            audio_file_path: output_path.to_path_buf(),
            duration_seconds: duration,
            file_size_bytes: std::fs::metadata(output_path)?.len(),
            format: "wav".to_string(),
            sample_rate,
            estimated_cost: self.estimate_cost(total_characters),
            processing_time_seconds: start_time.elapsed().as_secs_f64(),
            provider: TtsProvider::Elevenlabs,
            voice_id: voice_id.to_string(),
            model_used: Some(self.model.clone()),
            method: SynthesisMethod::Chunked,
            segments_processed: segments.len(),
            total_characters,
        })
    }
}

// Request/Response types

#[derive(Serialize)]
struct TtsRequest {
    text: String,
    model_id: String,
    output_format: String,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceData>,
}

#[derive(Deserialize)]
struct VoiceData {
    voice_id: String,
    name: String,
    category: Option<String>,
    preview_url: Option<String>,
    labels: Option<std::collections::HashMap<String, String>>,
}
