pub mod context;
pub mod vertex;

pub use context::TranslationContext;
pub use vertex::VertexTranslator;

use crate::error::Result;
use crate::llm::GenerationConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::job::progress::ProgressFn;

/// Translation quality levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationQuality {
    Fast,
    #[default]
    Balanced,
    High,
}

impl TranslationQuality {
    /// Generation parameters for this quality level.
    pub fn generation_config(&self) -> GenerationConfig {
        match self {
            TranslationQuality::Fast => GenerationConfig {
                temperature: 0.1,
                top_p: 0.8,
                max_output_tokens: 8192,
            },
            TranslationQuality::Balanced => GenerationConfig {
                temperature: 0.2,
                top_p: 0.85,
                max_output_tokens: 8192,
            },
            TranslationQuality::High => GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                max_output_tokens: 8192,
            },
        }
    }
}

/// Parameters for one timed-script translation.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub script: String,
    pub source_language: String,
    pub target_language: String,
    pub context: TranslationContext,
    pub audience: String,
    pub tone: String,
    pub quality: TranslationQuality,
    pub preserve_timing: bool,
}

/// Result of a timed-script translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
    pub translation_context: TranslationContext,
    pub word_count: usize,
    pub estimated_cost: f64,
    pub processing_time_seconds: f64,
    pub model_used: Option<String>,
    pub region_used: Option<String>,
    pub chunks_processed: usize,
    pub method: TranslationMethod,
    /// Set by the orchestrator once the text is persisted.
    pub translated_file: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMethod {
    SinglePass,
    Chunked,
}

/// Seam between the orchestrator and the remote translation provider.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        request: &TranslationRequest,
        progress: ProgressFn,
    ) -> Result<TranslationResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_generation_configs() {
        let fast = TranslationQuality::Fast.generation_config();
        let high = TranslationQuality::High.generation_config();
        assert!(fast.temperature < high.temperature);
        assert!(fast.top_p < high.top_p);
        assert_eq!(fast.max_output_tokens, 8192);
    }

    #[test]
    fn test_quality_default() {
        assert_eq!(TranslationQuality::default(), TranslationQuality::Balanced);
    }
}
