//! LLM-based transcript reformatting. Takes a raw timed script and asks a
//! Vertex model to regularize line lengths and replace pause glyphs with
//! the bracketed marker vocabulary.

use crate::error::{DubberError, Result};
use crate::llm::models::{auto_detect_order, AUTO_DETECT};
use crate::llm::{GenerationConfig, VertexClient, VertexModel};
use crate::script::timestamp::extract_timestamps;
use tracing::{debug, warn};

pub struct VertexPostProcessor {
    client: VertexClient,
    region: String,
}

impl VertexPostProcessor {
    pub fn new(client: VertexClient, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    fn generation_config() -> GenerationConfig {
        GenerationConfig {
            temperature: 0.1,
            top_p: 0.8,
            max_output_tokens: 8192,
        }
    }

    fn build_prompt(transcript: &str) -> String {
        format!(
            "Reformat this timed transcript for audio production.\n\n\
             RULES:\n\
             1. Keep every [HH:MM:SS] timestamp exactly as written.\n\
             2. Break lines at sentence ends; keep lines under 15 words.\n\
             3. Replace pause glyphs with markers on their own timestamped \
             lines: a single • becomes [breath], a double •• becomes \
             [long pause], a blank line becomes [TOPIC CHANGE].\n\
             4. Do not rewrite, summarize, or translate the spoken text.\n\
             5. Return ONLY the reformatted script.\n\n\
             TRANSCRIPT:\n{transcript}\n\n\
             REFORMATTED SCRIPT:"
        )
    }

    /// Models to attempt, in order. An explicit model is tried alone;
    /// `"auto-detect"` (or nothing) walks the fallback order.
    fn models_for(choice: Option<&str>) -> Vec<VertexModel> {
        match choice {
            Some(AUTO_DETECT) | None => auto_detect_order().to_vec(),
            Some(name) => match VertexModel::parse(name) {
                Some(model) => vec![model],
                None => {
                    warn!("Unknown postprocess model {name}, using auto-detect order");
                    auto_detect_order().to_vec()
                }
            },
        }
    }

    /// A reformat is usable iff it is non-empty and kept every original
    /// timestamp in order. Inserted marker lines may add timestamps, so the
    /// original sequence must survive as a subsequence.
    fn validate(original: &str, reformatted: &str) -> bool {
        if reformatted.trim().is_empty() {
            return false;
        }
        let original_stamps = extract_timestamps(original);
        let reformatted_stamps = extract_timestamps(reformatted);
        if original_stamps.is_empty() {
            return false;
        }

        let mut it = reformatted_stamps.iter();
        original_stamps
            .iter()
            .all(|stamp| it.any(|candidate| candidate == stamp))
    }

    /// Reformat a transcript, falling through the model order until one
    /// produces valid output.
    pub async fn process(&self, transcript: &str, model_choice: Option<&str>) -> Result<String> {
        let prompt = Self::build_prompt(transcript);
        let mut last_error: Option<DubberError> = None;

        for model in Self::models_for(model_choice) {
            match self
                .client
                .generate(
                    &self.region,
                    model.as_str(),
                    &prompt,
                    Self::generation_config(),
                )
                .await
            {
                Ok(output) => {
                    if Self::validate(transcript, &output) {
                        debug!("Postprocess accepted from {}", model.as_str());
                        return Ok(output);
                    }
                    warn!("Postprocess output from {} failed validation", model.as_str());
                    last_error = Some(DubberError::TranscriptionFailed(format!(
                        "{} dropped or altered timestamps",
                        model.as_str()
                    )));
                }
                Err(e) => {
                    warn!("Postprocess model {} failed: {e}", model.as_str());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DubberError::TranscriptionFailed("No postprocess model produced output".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_for_auto_detect() {
        let models = VertexPostProcessor::models_for(Some("auto-detect"));
        assert_eq!(models, auto_detect_order().to_vec());
        assert_eq!(VertexPostProcessor::models_for(None), models);
    }

    #[test]
    fn test_models_for_explicit() {
        let models = VertexPostProcessor::models_for(Some("gemini-1.5-pro"));
        assert_eq!(models, vec![VertexModel::Gemini15Pro]);
    }

    #[test]
    fn test_models_for_unknown_falls_back() {
        let models = VertexPostProcessor::models_for(Some("mystery-model"));
        assert_eq!(models, auto_detect_order().to_vec());
    }

    #[test]
    fn test_validate_timestamp_subsequence() {
        let original = "[00:00:01] hello • world\n[00:00:05] more";

        // Marker lines may add timestamps between the originals.
        let with_markers = "[00:00:01] hello\n[00:00:03] [breath]\n[00:00:05] more";
        assert!(VertexPostProcessor::validate(original, with_markers));

        let exact = "[00:00:01] hello world\n[00:00:05] more";
        assert!(VertexPostProcessor::validate(original, exact));

        // Dropping an original timestamp is rejected, as is empty output.
        let dropped = "[00:00:01] hello world more";
        assert!(!VertexPostProcessor::validate(original, dropped));
        assert!(!VertexPostProcessor::validate(original, ""));
    }

    #[test]
    fn test_prompt_mentions_markers() {
        let prompt = VertexPostProcessor::build_prompt("[00:00:01] x");
        assert!(prompt.contains("[breath]"));
        assert!(prompt.contains("[long pause]"));
        assert!(prompt.contains("[TOPIC CHANGE]"));
    }
}
