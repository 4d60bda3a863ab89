//! Job orchestration: drives the four-stage state machine for one job,
//! enforcing the cost budget, per-stage deadlines, cooperative
//! cancellation, and cleanup on every exit path.

use crate::cost::{self, EstimateParams, VIDEO_PROCESSING_COST};
use crate::error::{DubberError, Result};
use crate::job::progress::{ProgressAggregator, ProgressListener, Stage};
use crate::job::registry::JobRegistry;
use crate::job::{Job, JobError, JobStatus};
use crate::request::DubbingRequest;
use crate::transcribe::{TranscriptionRequest, Transcriber};
use crate::translate::{TranslationRequest, Translator};
use crate::tts::registry::{ProviderPreference, ProviderRegistry};
use crate::tts::{Synthesizer, TtsProvider};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-stage soft deadlines.
const TRANSCRIPTION_DEADLINE: Duration = Duration::from_secs(30 * 60);
const TRANSLATION_DEADLINE: Duration = Duration::from_secs(10 * 60);
const SYNTHESIS_DEADLINE: Duration = Duration::from_secs(30 * 60);
const MUXING_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Preview videos cap out at this length.
const PREVIEW_SECONDS: u32 = 30;

/// Storage pricing used for post-hoc muxing cost.
const STORAGE_COST_PER_GB: f64 = 0.02;

pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    transcriber: Arc<dyn Transcriber>,
    translator: Arc<dyn Translator>,
    tts: Arc<ProviderRegistry>,
    muxer: Arc<dyn crate::mux::Muxer>,
    listener: Option<ProgressListener>,
    data_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        transcriber: Arc<dyn Transcriber>,
        translator: Arc<dyn Translator>,
        tts: Arc<ProviderRegistry>,
        muxer: Arc<dyn crate::mux::Muxer>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            transcriber,
            translator,
            tts,
            muxer,
            listener: None,
            data_dir,
        }
    }

    pub fn with_listener(mut self, listener: ProgressListener) -> Self {
        self.listener = Some(listener);
        self
    }

    fn preference(request: &DubbingRequest) -> ProviderPreference {
        match request.tts_provider.explicit() {
            Some(id) => ProviderPreference::Explicit(id),
            None => ProviderPreference::Auto,
        }
    }

    /// Validate a request, create the job, and record its a-priori cost
    /// estimate. The job is not started yet.
    pub fn submit(&self, request: DubbingRequest) -> Result<Job> {
        request.validate()?;

        let estimate = cost::estimate(&EstimateParams {
            transcript_chars: request.existing_transcript.as_ref().map(|t| t.len()),
            estimated_duration_seconds: if request.test_mode { 60.0 } else { 1800.0 },
            enable_translation: request.enable_translation,
            enable_synthesis: request.enable_synthesis,
            enable_video_muxing: request.enable_video_muxing,
            synthesis_rate_per_1k: self.tts.rate_for(Self::preference(&request)),
        });

        let job = self.registry.create(request);
        self.registry.update(&job.job_id, |j| {
            j.estimated_cost = estimate.clone();
        });

        self.registry.get(&job.job_id).ok_or_else(|| {
            DubberError::InvalidInput(format!("Job {} vanished after creation", job.job_id))
        })
    }

    /// Run a submitted job on its own task.
    pub fn spawn(orchestrator: &Arc<Self>, job_id: String) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::clone(orchestrator);
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(&job_id).await {
                warn!("Job {job_id} runner error: {e}");
            }
        })
    }

    /// Drive one job to a terminal state. Errors are recorded on the job;
    /// the returned `Err` only signals an unknown job id.
    pub async fn run(&self, job_id: &str) -> Result<()> {
        let Some(job) = self.registry.get(job_id) else {
            return Err(DubberError::InvalidInput(format!("Unknown job: {job_id}")));
        };
        let request = job.request.clone();
        let cancelled = self
            .registry
            .cancel_flag(job_id)
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        let aggregator = Arc::new(ProgressAggregator::new(
            job_id.to_string(),
            self.registry.clone(),
            self.listener.clone(),
        ));

        self.registry.update(job_id, |j| {
            j.started_at = Some(chrono::Utc::now());
        });
        info!("Starting job {job_id}");

        let mut cleanup: Vec<PathBuf> = Vec::new();
        let outcome = self
            .execute_stages(job_id, &request, &cancelled, &aggregator, &mut cleanup)
            .await;

        match outcome {
            Ok(()) => {
                aggregator.report(Stage::Finalizing, 100);
                self.registry.update(job_id, |j| {
                    j.status = JobStatus::Completed;
                    j.progress = 100;
                    j.completed_at = Some(chrono::Utc::now());
                });
                info!("Job {job_id} completed");
            }
            Err(e) => {
                let terminal = if matches!(e, DubberError::Cancelled) {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Failed
                };
                warn!("Job {job_id} ended {terminal}: {e}");

                self.registry.update(job_id, |j| {
                    j.error = Some(JobError {
                        kind: e.kind(),
                        message: e.to_string(),
                        stage_of_failure: j.status,
                    });
                    j.status = terminal;
                    j.completed_at = Some(chrono::Utc::now());
                    // No result files survive a failed or cancelled job.
                    j.transcription_result = None;
                    j.translation_result = None;
                    j.synthesis_result = None;
                    j.muxing_result = None;
                });

                for path in &cleanup {
                    if path.exists() {
                        if let Err(err) = std::fs::remove_file(path) {
                            warn!("Cleanup failed for {}: {err}", path.display());
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn execute_stages(
        &self,
        job_id: &str,
        request: &DubbingRequest,
        cancelled: &Arc<AtomicBool>,
        aggregator: &Arc<ProgressAggregator>,
        cleanup: &mut Vec<PathBuf>,
    ) -> Result<()> {
        // Hard budget gate before any external call.
        if let Some(budget) = request.max_cost_usd {
            let estimated = self
                .registry
                .get(job_id)
                .map(|j| j.estimated_cost.total_cost)
                .unwrap_or(0.0);
            if estimated > budget {
                return Err(DubberError::BudgetExceeded {
                    estimated,
                    budget,
                });
            }
        }

        check_cancelled(cancelled)?;

        // Stage 1: Transcription (skipped when a transcript is supplied).
        let mut script = match &request.existing_transcript {
            Some(existing) => existing.clone(),
            None => {
                self.enter_stage(job_id, aggregator, Stage::Transcribing);

                let transcription_request = TranscriptionRequest {
                    url: request.url.clone(),
                    job_id: job_id.to_string(),
                    test_mode: request.test_mode,
                    breath_detection: request.breath_detection,
                    use_postprocess: request.use_postprocess,
                    postprocess_model: request.postprocess_model.clone(),
                    language_code: request.source_language.clone(),
                };
                let result = with_deadline(
                    TRANSCRIPTION_DEADLINE,
                    self.transcriber.transcribe(
                        &transcription_request,
                        ProgressAggregator::stage_callback(aggregator, Stage::Transcribing),
                        cancelled.clone(),
                    ),
                )
                .await?;

                cleanup.push(result.transcript_file.clone());
                let transcript_text = std::fs::read_to_string(&result.transcript_file)?;
                let stage_cost = result.estimated_cost;
                self.registry.update(job_id, |j| {
                    j.transcription_result = Some(result);
                    j.actual_cost.transcription_cost = stage_cost;
                    j.actual_cost = std::mem::take(&mut j.actual_cost).finalize();
                });
                self.warn_if_over_budget(job_id, request);

                crate::transcribe::format::script_body(&transcript_text)
            }
        };

        check_cancelled(cancelled)?;

        // Stage 2: Translation.
        let mut synthesis_language = request.source_language.clone();
        if request.enable_translation {
            self.enter_stage(job_id, aggregator, Stage::Translating);

            let translation_request = TranslationRequest {
                script: script.clone(),
                source_language: request.source_language.clone(),
                target_language: request.target_language.clone(),
                context: request.translation_context,
                audience: request.target_audience.clone(),
                tone: request.desired_tone.clone(),
                quality: if request.use_postprocess {
                    crate::translate::TranslationQuality::High
                } else {
                    crate::translate::TranslationQuality::Balanced
                },
                preserve_timing: true,
            };

            let mut result = with_deadline(
                TRANSLATION_DEADLINE,
                self.translator.translate(
                    &translation_request,
                    ProgressAggregator::stage_callback(aggregator, Stage::Translating),
                ),
            )
            .await?;

            std::fs::create_dir_all(&self.data_dir)?;
            let translated_file = self.data_dir.join(format!(
                "translated_{}_{job_id}.txt",
                request.target_language
            ));
            std::fs::write(&translated_file, &result.translated_text)?;
            cleanup.push(translated_file.clone());
            result.translated_file = Some(translated_file);

            script = result.translated_text.clone();
            synthesis_language = request.target_language.clone();
            let stage_cost = result.estimated_cost;
            self.registry.update(job_id, |j| {
                j.translation_result = Some(result);
                j.actual_cost.translation_cost = stage_cost;
                j.actual_cost = std::mem::take(&mut j.actual_cost).finalize();
            });
            self.warn_if_over_budget(job_id, request);
        }

        check_cancelled(cancelled)?;

        // Stage 3: Synthesis.
        if request.enable_synthesis {
            if script.trim().is_empty() {
                return Err(DubberError::InvalidInput(
                    "Synthesis requires a transcript or translation result".to_string(),
                ));
            }
            self.enter_stage(job_id, aggregator, Stage::Synthesizing);

            let synthesizer = self.tts.select(Self::preference(request)).await?;
            let voice_id = self
                .resolve_voice(&synthesizer, request, &synthesis_language)
                .await?;

            let extension =
                crate::tts::suggested_extension(synthesizer.provider(), request.audio_quality, script.len());
            let audio_path = self
                .data_dir
                .join(format!("dubbed_audio_{job_id}.{extension}"));

            let result = with_deadline(
                SYNTHESIS_DEADLINE,
                synthesizer.synthesize_script(
                    &script,
                    &voice_id,
                    &audio_path,
                    request.audio_quality,
                    ProgressAggregator::stage_callback(aggregator, Stage::Synthesizing),
                    cancelled.clone(),
                ),
            )
            .await?;

            cleanup.push(result.audio_file_path.clone());
            let stage_cost = result.estimated_cost;
            info!(
                "Synthesis done via {} ({:.1}s audio, ${:.4})",
                result.provider, result.duration_seconds, stage_cost
            );
            self.registry.update(job_id, |j| {
                j.synthesis_result = Some(result);
                j.actual_cost.synthesis_cost = stage_cost;
                j.actual_cost = std::mem::take(&mut j.actual_cost).finalize();
            });
            self.warn_if_over_budget(job_id, request);
        }

        check_cancelled(cancelled)?;

        // Stage 4: Muxing.
        if request.enable_video_muxing {
            let audio_file = self
                .registry
                .get(job_id)
                .and_then(|j| j.synthesis_result.map(|s| s.audio_file_path))
                .ok_or_else(|| {
                    DubberError::InvalidInput(
                        "Muxing requires a synthesis result".to_string(),
                    )
                })?;
            self.enter_stage(job_id, aggregator, Stage::Muxing);

            let video_path = self.data_dir.join(format!(
                "dubbed_video_{job_id}.{}",
                request.video_format.extension()
            ));

            let result = if request.preview_mode {
                with_deadline(
                    MUXING_DEADLINE,
                    self.muxer.create_preview(
                        &request.url,
                        &audio_file,
                        &video_path,
                        PREVIEW_SECONDS,
                        ProgressAggregator::stage_callback(aggregator, Stage::Muxing),
                    ),
                )
                .await?
            } else {
                with_deadline(
                    MUXING_DEADLINE,
                    self.muxer.replace_audio(
                        &request.url,
                        &audio_file,
                        &video_path,
                        request.preserve_video_quality,
                        request.video_format,
                        ProgressAggregator::stage_callback(aggregator, Stage::Muxing),
                    ),
                )
                .await?
            };

            cleanup.push(result.video_file_path.clone());
            let storage_cost =
                result.file_size_bytes as f64 / (1024.0 * 1024.0 * 1024.0) * STORAGE_COST_PER_GB;
            self.registry.update(job_id, |j| {
                j.muxing_result = Some(result);
                j.actual_cost.video_processing_cost = VIDEO_PROCESSING_COST;
                j.actual_cost.storage_cost = storage_cost;
                j.actual_cost = std::mem::take(&mut j.actual_cost).finalize();
            });
            self.warn_if_over_budget(job_id, request);
        }

        check_cancelled(cancelled)?;
        Ok(())
    }

    fn enter_stage(&self, job_id: &str, aggregator: &Arc<ProgressAggregator>, stage: Stage) {
        self.registry.update(job_id, |j| {
            j.status = stage.status();
        });
        aggregator.report(stage, 0);
    }

    /// Budget overruns after work has started only warn; the budget is a
    /// pre-flight gate, not a runtime kill switch.
    fn warn_if_over_budget(&self, job_id: &str, request: &DubbingRequest) {
        let Some(budget) = request.max_cost_usd else {
            return;
        };
        if let Some(job) = self.registry.get(job_id) {
            if job.actual_cost.total_cost > budget {
                warn!(
                    "Job {job_id} cost ${:.4} exceeds budget ${budget:.4}",
                    job.actual_cost.total_cost
                );
            }
        }
    }

    /// Decide the voice to synthesize with. A missing voice id falls back
    /// to the provider's default for the language. A voice the selected
    /// provider does not know is assumed to come from the other provider's
    /// namespace (auto-selection changed providers underneath the caller)
    /// and is translated through the static mapping table.
    async fn resolve_voice(
        &self,
        synthesizer: &Arc<dyn Synthesizer>,
        request: &DubbingRequest,
        language: &str,
    ) -> Result<String> {
        let provider = synthesizer.provider();

        let Some(requested) = request.voice_id.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(default_voice(provider, language).to_string());
        };

        match synthesizer.validate_voice_id(requested).await {
            Ok(true) => return Ok(requested.to_string()),
            Ok(false) => {}
            // A failed listing should not kill an otherwise-valid job; the
            // synthesis call itself will reject a bad voice.
            Err(e) => {
                warn!("Voice validation unavailable, proceeding: {e}");
                return Ok(requested.to_string());
            }
        }

        let other = match provider {
            TtsProvider::Elevenlabs => TtsProvider::GoogleTts,
            TtsProvider::GoogleTts => TtsProvider::Elevenlabs,
        };
        match ProviderRegistry::map_voice(other, provider, requested) {
            Some(mapped) => {
                info!("Mapped voice {requested} ({other}) to {mapped} ({provider})");
                Ok(mapped.to_string())
            }
            None => Err(DubberError::VoiceNotFound(format!(
                "Voice {requested} is not known to {provider} and has no equivalent"
            ))),
        }
    }
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(DubberError::Cancelled);
    }
    Ok(())
}

async fn with_deadline<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(DubberError::Timeout(deadline)),
    }
}

fn default_voice(provider: TtsProvider, language: &str) -> &'static str {
    match provider {
        TtsProvider::GoogleTts => {
            if language.starts_with("en") {
                "en-US-Neural2-F"
            } else {
                "hu-HU-Wavenet-A"
            }
        }
        // Rachel, the stock multilingual default.
        TtsProvider::Elevenlabs => "21m00Tcm4TlvDq8ikWAM",
    }
}
