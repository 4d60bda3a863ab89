//! Context-aware timed-script translation over Vertex AI with region and
//! model fallback.

use crate::error::{DubberError, Result};
use crate::llm::{auto_detect_order, VertexClient, VertexModel};
use crate::script::chunk::{chunk_text, needs_chunking, reassemble, Chunk, ChunkConfig};
use crate::script::timestamp::extract_timestamps;
use crate::translate::{
    ProgressFn, TranslationMethod, TranslationRequest, TranslationResult, Translator,
};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Translation cost: $20 per 1M characters.
const COST_PER_MILLION_CHARS: f64 = 20.0;

/// Word-count sanity bounds relative to the source.
const MIN_WORD_RATIO: f64 = 0.3;
const MAX_WORD_RATIO: f64 = 3.0;

pub struct VertexTranslator {
    client: VertexClient,
    regions: Vec<String>,
    models: Vec<VertexModel>,
    chunk_config: ChunkConfig,
}

impl VertexTranslator {
    pub fn new(client: VertexClient) -> Self {
        Self {
            client,
            regions: crate::llm::models::default_regions()
                .iter()
                .map(|r| r.to_string())
                .collect(),
            models: auto_detect_order().to_vec(),
            chunk_config: ChunkConfig::default(),
        }
    }

    /// Put a preferred region at the front of the fallback order.
    pub fn with_preferred_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        self.regions.retain(|r| *r != region);
        self.regions.insert(0, region);
        self
    }

    /// Replace the model fallback order (e.g. a single explicit model).
    pub fn with_models(mut self, models: Vec<VertexModel>) -> Self {
        self.models = models;
        self
    }

    fn build_prompt(&self, chunk: &str, request: &TranslationRequest) -> String {
        let profile = request.context.profile();

        let quality_hint = match request.quality {
            crate::translate::TranslationQuality::Fast => {
                "Fast translation, efficiency is the priority."
            }
            crate::translate::TranslationQuality::Balanced => {
                "Balanced speed and quality."
            }
            crate::translate::TranslationQuality::High => {
                "High quality, accuracy is the priority."
            }
        };

        let timing_rules = if request.preserve_timing {
            "TIMING PRESERVATION RULES:\n\
             1. Preserve EVERY [HH:MM:SS] timestamp EXACTLY as written.\n\
             2. The translated text must fit the SAME time slots.\n\
             3. If the translation runs long, split lines but KEEP the timestamps.\n\
             4. If the translation runs short, adjacent lines may be merged.\n\
             5. Preserve pause markers one-to-one: [levegővétel] → [breath], \
             [rövid szünet] → [short pause], [hosszú szünet] → [long pause], \
             [TÉMAVÁLTÁS] → [TOPIC CHANGE].\n"
        } else {
            ""
        };

        format!(
            "Translate this timed script from {} to {}.\n\n\
             CRITICAL: This is a TIMED SCRIPT for audio synthesis. Timing is sacred.\n\n\
             TRANSLATION CONTEXT:\n\
             - Content type: {}\n\
             - Target audience: {}\n\
             - Desired tone: {}\n\
             - Special instruction: {}\n\
             - Terminology: {}\n\
             - Mood: {}\n\n\
             {}\
             TRANSLATION QUALITY: {}\n\n\
             ORIGINAL SCRIPT:\n{}\n\n\
             TRANSLATED {} SCRIPT:",
            request.source_language,
            request.target_language,
            request.context.as_str(),
            request.audience,
            request.tone,
            profile.instruction,
            profile.terminology,
            profile.tone,
            timing_rules,
            quality_hint,
            chunk,
            request.target_language.to_uppercase(),
        )
    }

    /// Translate one chunk, iterating region × model in priority order and
    /// accepting the first response that validates.
    async fn translate_chunk(
        &self,
        chunk: &str,
        request: &TranslationRequest,
    ) -> Result<(String, String, String)> {
        let prompt = self.build_prompt(chunk, request);
        let config = request.quality.generation_config();

        let mut last_error: Option<DubberError> = None;

        for region in &self.regions {
            for model in &self.models {
                match self
                    .client
                    .generate(region, model.as_str(), &prompt, config)
                    .await
                {
                    Ok(translated) => {
                        if validate_translation(chunk, &translated, request.preserve_timing) {
                            debug!("Accepted translation from {}@{}", model.as_str(), region);
                            return Ok((translated, model.as_str().to_string(), region.clone()));
                        }
                        warn!(
                            "Translation validation failed for {}@{}",
                            model.as_str(),
                            region
                        );
                        last_error = Some(DubberError::TranslationFailed(format!(
                            "{}@{} produced invalid output",
                            model.as_str(),
                            region
                        )));
                    }
                    Err(e) => {
                        warn!("{}@{} failed: {}", model.as_str(), region, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(DubberError::TranslationFailed(format!(
            "All region/model combinations failed; last cause: {}",
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "none".to_string())
        )))
    }
}

/// A translation is accepted iff it is non-empty, differs from the input,
/// preserves the timestamp sequence (when requested), and lands within the
/// word-count sanity bounds.
pub fn validate_translation(original: &str, translated: &str, preserve_timing: bool) -> bool {
    if translated.trim().is_empty() {
        return false;
    }

    if translated == original {
        return false;
    }

    if preserve_timing {
        let original_stamps = extract_timestamps(original);
        let translated_stamps = extract_timestamps(translated);
        if original_stamps != translated_stamps {
            return false;
        }
    }

    let original_words = original.split_whitespace().count();
    let translated_words = translated.split_whitespace().count();
    if original_words > 0 {
        let ratio = translated_words as f64 / original_words as f64;
        if !(MIN_WORD_RATIO..=MAX_WORD_RATIO).contains(&ratio) {
            return false;
        }
    }

    true
}

fn estimate_cost(text: &str) -> f64 {
    (text.len() as f64 / 1_000_000.0) * COST_PER_MILLION_CHARS
}

#[async_trait]
impl Translator for VertexTranslator {
    async fn translate(
        &self,
        request: &TranslationRequest,
        progress: ProgressFn,
    ) -> Result<TranslationResult> {
        let start_time = Instant::now();

        let chunked = needs_chunking(&request.script, &self.chunk_config);
        if chunked {
            info!(
                "Long script detected ({} bytes), translating in chunks",
                request.script.len()
            );
        }
        let chunks: Vec<Chunk> = chunk_text(&request.script, &self.chunk_config);

        if chunks.is_empty() {
            return Err(DubberError::InvalidInput(
                "Cannot translate an empty script".to_string(),
            ));
        }

        let total = chunks.len();
        let mut translated_chunks = Vec::with_capacity(total);
        let mut model_used = None;
        let mut region_used = None;
        let mut total_cost = 0.0;

        for (i, chunk) in chunks.iter().enumerate() {
            debug!(
                "Translating chunk {}/{} ({} bytes)",
                i + 1,
                total,
                chunk.text.len()
            );

            let (translated, model, region) = self.translate_chunk(&chunk.text, request).await?;
            total_cost += estimate_cost(&chunk.text);
            model_used.get_or_insert(model);
            region_used.get_or_insert(region);
            translated_chunks.push(translated);

            progress(((i + 1) * 100 / total) as u8);
        }

        let translated_text = if total == 1 {
            translated_chunks.into_iter().next().unwrap_or_default()
        } else {
            reassemble(&translated_chunks, &chunks)
        };

        // Whole-output timing check; chunk merges must not lose stamps.
        if request.preserve_timing {
            let original = extract_timestamps(&request.script);
            let merged = extract_timestamps(&translated_text);
            if original != merged {
                return Err(DubberError::TranslationFailed(format!(
                    "Timestamp sequence changed during translation ({} -> {})",
                    original.len(),
                    merged.len()
                )));
            }
        }

        let word_count = translated_text.split_whitespace().count();
        info!(
            "Translation complete: {} words across {} chunk(s)",
            word_count, total
        );

        Ok(TranslationResult {
            translated_text,
            source_language: request.source_language.clone(),
            target_language: request.target_language.clone(),
            translation_context: request.context,
            word_count,
            estimated_cost: total_cost,
            processing_time_seconds: start_time.elapsed().as_secs_f64(),
            model_used,
            region_used,
            chunks_processed: total,
            method: if chunked {
                TranslationMethod::Chunked
            } else {
                TranslationMethod::SinglePass
            },
            translated_file: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::TranslationContext;

    #[test]
    fn test_validate_rejects_empty() {
        assert!(!validate_translation("[00:00:01] Hello.", "", true));
        assert!(!validate_translation("[00:00:01] Hello.", "   ", true));
    }

    #[test]
    fn test_validate_rejects_identity() {
        let text = "[00:00:01] Hello.";
        assert!(!validate_translation(text, text, true));
    }

    #[test]
    fn test_validate_timestamp_preservation() {
        let original = "[00:00:01] Szia.\n[00:00:05] Viszlát.";
        let good = "[00:00:01] Hello.\n[00:00:05] Goodbye.";
        let dropped = "[00:00:01] Hello and goodbye.";
        let shifted = "[00:00:01] Hello.\n[00:00:06] Goodbye.";

        assert!(validate_translation(original, good, true));
        assert!(!validate_translation(original, dropped, true));
        assert!(!validate_translation(original, shifted, true));
        // Without timing preservation the dropped stamp is acceptable.
        assert!(validate_translation(original, dropped, false));
    }

    #[test]
    fn test_validate_word_ratio() {
        let original = "[00:00:01] one two three four five six seven eight nine ten";
        let too_short = "[00:00:01] one";
        let reasonable = "[00:00:01] uno dos tres cuatro cinco seis siete ocho nueve diez";
        assert!(!validate_translation(original, too_short, false));
        assert!(validate_translation(original, reasonable, false));
    }

    #[test]
    fn test_estimate_cost() {
        let text = "x".repeat(1_000_000);
        assert!((estimate_cost(&text) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_prompt_contains_context_directives() {
        let translator = VertexTranslator::new(VertexClient::new(
            "p".into(),
            std::sync::Arc::new(crate::auth::AccessTokenCache::new()),
        ));
        let request = TranslationRequest {
            script: "[00:00:01] Szia.".into(),
            source_language: "hu-HU".into(),
            target_language: "en-US".into(),
            context: TranslationContext::Legal,
            audience: "lawyers".into(),
            tone: "formal".into(),
            quality: crate::translate::TranslationQuality::High,
            preserve_timing: true,
        };
        let prompt = translator.build_prompt(&request.script, &request);
        assert!(prompt.contains("legal"));
        assert!(prompt.contains("lawyers"));
        assert!(prompt.contains("TIMING PRESERVATION RULES"));
        assert!(prompt.contains("[00:00:01] Szia."));
    }

    #[test]
    fn test_preferred_region_moves_to_front() {
        let translator = VertexTranslator::new(VertexClient::new(
            "p".into(),
            std::sync::Arc::new(crate::auth::AccessTokenCache::new()),
        ))
        .with_preferred_region("europe-west4");
        assert_eq!(translator.regions[0], "europe-west4");
        assert_eq!(translator.regions.len(), 4);
    }
}
