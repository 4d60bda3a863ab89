pub mod auth;
pub mod config;
pub mod cost;
pub mod error;
pub mod job;
pub mod llm;
pub mod mux;
pub mod request;
pub mod script;
pub mod transcribe;
pub mod translate;
pub mod tts;

pub use config::Config;
pub use error::{DubberError, ErrorKind, Result};
pub use job::{Job, JobRegistry, JobStatus, Orchestrator};
pub use request::{DubbingRequest, JobListResponse, StatusResponse, SubmitResponse};

use crate::auth::AccessTokenCache;
use crate::llm::VertexClient;
use crate::mux::FfmpegMuxer;
use crate::transcribe::{SpeechClient, SpeechTranscriber, VertexPostProcessor};
use crate::translate::VertexTranslator;
use crate::tts::{ElevenLabsSynthesizer, GoogleTtsSynthesizer, ProviderRegistry, Synthesizer};
use std::sync::Arc;

/// Wire up the production pipeline from configuration. The HTTP layer (or
/// the CLI) owns one of these per process and hands jobs to the
/// orchestrator.
pub fn build_orchestrator(config: &Config) -> Result<(Arc<JobRegistry>, Arc<Orchestrator>)> {
    config.validate()?;

    let tokens = Arc::new(AccessTokenCache::new());
    let project_id = config.vertex_project_id.clone().unwrap_or_default();

    let mut translator =
        VertexTranslator::new(VertexClient::new(project_id.clone(), tokens.clone()));
    if let Some(region) = &config.vertex_region {
        translator = translator.with_preferred_region(region.clone());
    }

    let postprocessor = (!project_id.is_empty()).then(|| {
        VertexPostProcessor::new(
            VertexClient::new(project_id.clone(), tokens.clone()),
            config
                .vertex_region
                .clone()
                .unwrap_or_else(|| "us-central1".to_string()),
        )
    });

    let transcriber = SpeechTranscriber::new(
        SpeechClient::new(tokens.clone(), config.gcs_bucket.clone()),
        postprocessor,
        config.data_dir.clone(),
        config.temp_dir.clone(),
    );

    // Listing order is the auto-selection tie-break order.
    let providers: Vec<Arc<dyn Synthesizer>> = vec![
        Arc::new(
            ElevenLabsSynthesizer::new(config.elevenlabs_api_key.clone().unwrap_or_default())
                .with_max_parallel(config.max_parallel_synthesis),
        ),
        Arc::new(
            GoogleTtsSynthesizer::new(tokens.clone())
                .with_max_parallel(config.max_parallel_synthesis),
        ),
    ];

    let registry = Arc::new(JobRegistry::new(config.data_dir.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        Arc::new(transcriber),
        Arc::new(translator),
        Arc::new(ProviderRegistry::new(providers)),
        Arc::new(FfmpegMuxer::new(config.temp_dir.clone())),
        config.data_dir.clone(),
    ));

    Ok((registry, orchestrator))
}
