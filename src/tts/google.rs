//! Google Cloud Text-to-Speech synthesizer. Input is SSML with `<break>`
//! tags standing in for pause markers.

use crate::auth::AccessTokenCache;
use crate::error::{DubberError, Result};
use crate::job::progress::ProgressFn;
use crate::script::timestamp::{parse_script, LineBody};
use crate::tts::plan::{estimate_duration_seconds, group_segments, plan_segments, SegmentGroup};
use crate::tts::{
    assemble, run_chunked, AudioQuality, SynthesisMethod, SynthesisResult, Synthesizer,
    TtsProvider, VoiceProfile, SHORT_SYNTH_THRESHOLD_CHARS, SHORT_SYNTH_THRESHOLD_SEGMENTS,
};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com/v1";

/// Neural2/WaveNet pricing: $16 per 1M characters.
const COST_PER_1K_CHARS: f64 = 0.016;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

/// Longest break Google accepts in a single SSML tag.
const MAX_BREAK_SECONDS: f64 = 10.0;

pub struct GoogleTtsSynthesizer {
    client: reqwest::Client,
    tokens: Arc<AccessTokenCache>,
    base_url: String,
    max_parallel: usize,
}

impl GoogleTtsSynthesizer {
    pub fn new(tokens: Arc<AccessTokenCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_parallel: 4,
        }
    }

    /// Point the client at a different endpoint (tests use a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    fn sample_rate(quality: AudioQuality) -> u32 {
        match quality {
            AudioQuality::Low => 16_000,
            AudioQuality::Medium => 24_000,
            AudioQuality::High => 48_000,
        }
    }

    fn single_call_encoding(quality: AudioQuality) -> &'static str {
        match quality {
            AudioQuality::Low | AudioQuality::Medium => "MP3",
            AudioQuality::High => "LINEAR16",
        }
    }

    /// Language code is the leading `ll-CC` of the voice name
    /// (`en-US-Neural2-F` → `en-US`).
    fn language_code(voice_id: &str) -> String {
        voice_id
            .splitn(3, '-')
            .take(2)
            .collect::<Vec<_>>()
            .join("-")
    }

    fn escape_ssml(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    }

    /// Convert a whole timed script to SSML: prose becomes prosody-wrapped
    /// text, pause markers become `<break>` tags sized from the gap to the
    /// next timestamp.
    fn script_to_ssml(script: &str) -> Result<String> {
        let segments = parse_script(script)?;
        let mut parts = vec!["<speak>".to_string()];

        for (i, seg) in segments.iter().enumerate() {
            match &seg.body {
                LineBody::Pause(_) => {
                    let gap = segments
                        .get(i + 1)
                        .map(|next| next.start.as_seconds().saturating_sub(seg.start.as_seconds()))
                        .unwrap_or(1);
                    let gap = (gap as f64).clamp(0.2, MAX_BREAK_SECONDS);
                    parts.push(format!("<break time=\"{gap}s\"/>"));
                }
                LineBody::Text(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        parts.push(format!(
                            "<prosody rate=\"medium\">{}</prosody>",
                            Self::escape_ssml(text)
                        ));
                    }
                }
            }
        }

        parts.push("</speak>".to_string());
        Ok(parts.concat())
    }

    /// SSML for one chunked-mode group: segment texts separated by breaks
    /// matching the planned gaps.
    fn group_to_ssml(group: &SegmentGroup) -> String {
        let mut parts = vec!["<speak>".to_string()];
        for (i, seg) in group.segments.iter().enumerate() {
            if i > 0 {
                let gap = seg.start_seconds - group.segments[i - 1].end_seconds;
                if gap > 0.2 {
                    parts.push(format!(
                        "<break time=\"{:.1}s\"/>",
                        gap.min(MAX_BREAK_SECONDS)
                    ));
                }
            }
            parts.push(format!(
                "<prosody rate=\"medium\">{}</prosody>",
                Self::escape_ssml(&seg.text)
            ));
        }
        parts.push("</speak>".to_string());
        parts.concat()
    }

    async fn synthesize_ssml(
        &self,
        ssml: &str,
        voice_id: &str,
        encoding: &str,
        sample_rate: u32,
    ) -> Result<Vec<u8>> {
        let url = format!("{}/text:synthesize", self.base_url);
        let body = SynthesizeRequest {
            input: SynthesisInput {
                ssml: ssml.to_string(),
            },
            voice: VoiceSelection {
                language_code: Self::language_code(voice_id),
                name: voice_id.to_string(),
            },
            audio_config: AudioConfig {
                audio_encoding: encoding.to_string(),
                sample_rate_hertz: sample_rate,
            },
        };

        let mut last_error: Option<DubberError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Google TTS retry attempt {} after {}ms", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let token = self.tokens.token().await?;
            let response = self
                .client
                .post(&url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: SynthesizeResponse = resp.json().await?;
                        return base64::engine::general_purpose::STANDARD
                            .decode(&parsed.audio_content)
                            .map_err(|e| {
                                DubberError::SynthesisFailed(format!(
                                    "Google TTS returned undecodable audio: {e}"
                                ))
                            });
                    }

                    let error_body = resp.text().await.unwrap_or_default();
                    match status.as_u16() {
                        401 => {
                            self.tokens.invalidate().await;
                            return Err(DubberError::ProviderNotAvailable(format!(
                                "Google TTS authentication failed: {error_body}"
                            )));
                        }
                        400 if error_body.to_lowercase().contains("voice") => {
                            return Err(DubberError::VoiceNotFound(format!(
                                "Google TTS voice {voice_id}: {error_body}"
                            )))
                        }
                        429 if error_body.contains("RESOURCE_EXHAUSTED") => {
                            return Err(DubberError::SynthesisFailed(format!(
                                "Google TTS quota exhausted: {error_body}"
                            )))
                        }
                        429 | 500..=599 => {
                            warn!("Google TTS transient error ({status}): {error_body}");
                            last_error = Some(DubberError::SynthesisFailed(format!(
                                "Google TTS error {status}: {error_body}"
                            )));
                        }
                        _ => {
                            return Err(DubberError::SynthesisFailed(format!(
                                "Google TTS error ({status}): {error_body}"
                            )))
                        }
                    }
                }
                Err(e) => {
                    warn!("Google TTS request failed: {e}");
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DubberError::SynthesisFailed("Unknown Google TTS error".into())))
    }
}

#[async_trait]
impl Synthesizer for GoogleTtsSynthesizer {
    fn provider(&self) -> TtsProvider {
        TtsProvider::GoogleTts
    }

    fn cost_per_1k_chars(&self) -> f64 {
        COST_PER_1K_CHARS
    }

    async fn list_voices(&self) -> Result<Vec<VoiceProfile>> {
        let url = format!("{}/voices", self.base_url);
        let token = self.tokens.token().await?;
        let response = self.client.get(&url).bearer_auth(&token).send().await?;

        let status = response.status();
        if status.as_u16() == 401 {
            self.tokens.invalidate().await;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DubberError::ProviderNotAvailable(format!(
                "Google TTS voice listing failed ({status}): {body}"
            )));
        }

        let parsed: VoicesResponse = response.json().await?;
        Ok(parsed
            .voices
            .into_iter()
            .map(|v| {
                let language = v
                    .language_codes
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "en-US".to_string());
                let premium = v.name.contains("Neural2") || v.name.contains("Wavenet");
                VoiceProfile {
                    voice_id: v.name.clone(),
                    display_name: v.name,
                    language_tag: language,
                    gender: v.ssml_gender.map(|g| g.to_lowercase()),
                    provider: TtsProvider::GoogleTts,
                    premium,
                    category: None,
                    preview_url: None,
                    labels: None,
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
        let sample_rate = Self::sample_rate(quality);
        progress(5);

        if segments.is_empty() {
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
                provider: TtsProvider::GoogleTts,
                voice_id: voice_id.to_string(),
                model_used: None,
                method: SynthesisMethod::SingleCall,
                segments_processed: 0,
                total_characters: 0,
            });
        }

        info!(
            "Google TTS synthesis: {} segments, {} characters, voice {}",
            segments.len(),
            total_characters,
            voice_id
        );

        let use_single_call = total_characters <= SHORT_SYNTH_THRESHOLD_CHARS
            && segments.len() <= SHORT_SYNTH_THRESHOLD_SEGMENTS;

        if use_single_call {
            let ssml = Self::script_to_ssml(script)?;
            let encoding = Self::single_call_encoding(quality);
            debug!("Single-call SSML synthesis ({} bytes)", ssml.len());

            let audio = self
                .synthesize_ssml(&ssml, voice_id, encoding, sample_rate)
                .await?;
            progress(90);

            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(output_path, &audio)?;
            progress(100);

            return Ok(SynthesisResult {
                audio_file_path: output_path.to_path_buf(),
                duration_seconds: estimate_duration_seconds(
                    &segments
                        .iter()
                        .map(|s| s.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" "),
                ),
                file_size_bytes: audio.len() as u64,
                format: encoding.to_lowercase(),
                sample_rate,
                estimated_cost: self.estimate_cost(total_characters),
                processing_time_seconds: start_time.elapsed().as_secs_f64(),
                provider: TtsProvider::GoogleTts,
                voice_id: voice_id.to_string(),
                model_used: None,
                method: SynthesisMethod::SingleCall,
                segments_processed: segments.len(),
                total_characters,
            });
        }

        let groups = group_segments(&segments);
        debug!("Chunked SSML synthesis: {} groups", groups.len());
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let duration = run_chunked(
            &groups,
            self.max_parallel,
            sample_rate,
            output_path,
            |_i, group, temp_path| async move {
                let ssml = Self::group_to_ssml(&group);
                let audio = self
                    .synthesize_ssml(&ssml, voice_id, "LINEAR16", sample_rate)
                    .await?;
                std::fs::write(&temp_path, audio)?;
                Ok(())
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
            provider: TtsProvider::GoogleTts,
            voice_id: voice_id.to_string(),
            model_used: None,
            method: SynthesisMethod::Chunked,
            segments_processed: segments.len(),
            total_characters,
        })
    }
}

// Request/Response types

#[derive(Serialize)]
struct SynthesizeRequest {
    input: SynthesisInput,
    voice: VoiceSelection,
    #[serde(rename = "audioConfig")]
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput {
    ssml: String,
}

#[derive(Serialize)]
struct VoiceSelection {
    #[serde(rename = "languageCode")]
    language_code: String,
    name: String,
}

#[derive(Serialize)]
struct AudioConfig {
    #[serde(rename = "audioEncoding")]
    audio_encoding: String,
    #[serde(rename = "sampleRateHertz")]
    sample_rate_hertz: u32,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<VoiceData>,
}

#[derive(Deserialize)]
struct VoiceData {
    name: String,
    #[serde(rename = "languageCodes", default)]
    language_codes: Vec<String>,
    #[serde(rename = "ssmlGender")]
    ssml_gender: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_code_from_voice() {
        assert_eq!(
            GoogleTtsSynthesizer::language_code("en-US-Neural2-F"),
            "en-US"
        );
        assert_eq!(
            GoogleTtsSynthesizer::language_code("hu-HU-Wavenet-A"),
            "hu-HU"
        );
    }

    #[test]
    fn test_script_to_ssml_breaks_from_gaps() {
        let script = "[00:00:01] Hello everyone.\n\
                      [00:00:04] [long pause]\n\
                      [00:00:07] Welcome back.";
        let ssml = GoogleTtsSynthesizer::script_to_ssml(script).unwrap();
        assert!(ssml.starts_with("<speak>"));
        assert!(ssml.ends_with("</speak>"));
        // The pause marker at 4 s runs until the next line at 7 s.
        assert!(ssml.contains("<break time=\"3s\"/>"), "{ssml}");
        assert!(ssml.contains("Hello everyone."));
    }

    #[test]
    fn test_ssml_escaping() {
        assert_eq!(
            GoogleTtsSynthesizer::escape_ssml("a < b & c > d"),
            "a &lt; b &amp; c &gt; d"
        );
    }

    #[test]
    fn test_group_to_ssml_inserts_inter_segment_breaks() {
        let group = SegmentGroup {
            segments: vec![
                crate::tts::plan::PlannedSegment {
                    start_seconds: 0.0,
                    end_seconds: 2.0,
                    text: "First part.".to_string(),
                },
                crate::tts::plan::PlannedSegment {
                    start_seconds: 5.0,
                    end_seconds: 7.0,
                    text: "Second part.".to_string(),
                },
            ],
            start_seconds: 0.0,
            end_seconds: 7.0,
            char_count: 23,
        };
        let ssml = GoogleTtsSynthesizer::group_to_ssml(&group);
        assert!(ssml.contains("<break time=\"3.0s\"/>"), "{ssml}");
    }

    #[test]
    fn test_sample_rates() {
        assert_eq!(GoogleTtsSynthesizer::sample_rate(AudioQuality::Low), 16_000);
        assert_eq!(
            GoogleTtsSynthesizer::sample_rate(AudioQuality::Medium),
            24_000
        );
        assert_eq!(
            GoogleTtsSynthesizer::sample_rate(AudioQuality::High),
            48_000
        );
    }

    #[test]
    fn test_cost_rate() {
        let synth = GoogleTtsSynthesizer::new(Arc::new(AccessTokenCache::new()));
        assert!((synth.estimate_cost(1_000_000) - 16.0).abs() < 1e-9);
    }
}
