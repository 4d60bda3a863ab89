//! Transcription stage: source download, speech-to-text, pause-aware
//! formatting, and optional LLM post-processing, behind a narrow trait.

pub mod format;
pub mod media;
pub mod postprocess;
pub mod segment;
pub mod speech;

pub use postprocess::VertexPostProcessor;
pub use speech::SpeechClient;

use crate::cost::TRANSCRIPTION_COST_PER_MINUTE;
use crate::error::{DubberError, Result};
use crate::job::progress::ProgressFn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Parameters for one transcription run.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub url: String,
    pub job_id: String,
    /// Limit processing to the first 60 seconds of the source.
    pub test_mode: bool,
    /// Detect pauses from word timing and mark them in the output.
    pub breath_detection: bool,
    /// Reformat the transcript with an LLM before saving.
    pub use_postprocess: bool,
    /// Post-processing model; `"auto-detect"` walks the fallback order.
    pub postprocess_model: Option<String>,
    pub language_code: String,
}

/// Result of the transcription stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub transcript_file: PathBuf,
    pub video_title: String,
    pub duration_seconds: f64,
    pub language: String,
    pub word_count: usize,
    pub postprocessed: bool,
    pub estimated_cost: f64,
}

/// Seam between the orchestrator and the speech-to-text pipeline.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
        progress: ProgressFn,
        cancelled: Arc<AtomicBool>,
    ) -> Result<TranscriptionResult>;
}

/// Production transcriber: yt-dlp download, ffmpeg conversion, remote
/// speech recognition, pause segmentation, transcript file emission.
pub struct SpeechTranscriber {
    speech: SpeechClient,
    postprocessor: Option<VertexPostProcessor>,
    data_dir: PathBuf,
    temp_dir: PathBuf,
}

impl SpeechTranscriber {
    pub fn new(
        speech: SpeechClient,
        postprocessor: Option<VertexPostProcessor>,
        data_dir: PathBuf,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            speech,
            postprocessor,
            data_dir,
            temp_dir,
        }
    }

    fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
        if cancelled.load(Ordering::Relaxed) {
            return Err(DubberError::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
impl Transcriber for SpeechTranscriber {
    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
        progress: ProgressFn,
        cancelled: Arc<AtomicBool>,
    ) -> Result<TranscriptionResult> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.temp_dir)?;

        // Step 1: fetch source info and audio.
        progress(5);
        let source = media::fetch_source_info(&request.url).await?;
        info!(
            "Transcribing \"{}\" ({:.0}s)",
            source.title, source.duration_seconds
        );

        let audio_path = media::download_audio(&request.url, &self.temp_dir).await?;
        let mut temp_files = vec![audio_path.clone()];
        progress(25);
        Self::check_cancelled(&cancelled)?;

        // Step 2: convert to 16 kHz mono LINEAR16, trimmed in test mode.
        let wav_path = self.temp_dir.join(format!("audio_{}.wav", request.job_id));
        let limit = request.test_mode.then_some(60);
        media::convert_to_wav(&audio_path, &wav_path, limit).await?;
        temp_files.push(wav_path.clone());
        progress(35);
        Self::check_cancelled(&cancelled)?;

        let duration_seconds = if request.test_mode {
            source.duration_seconds.min(60.0)
        } else {
            source.duration_seconds
        };

        // Step 3: remote speech recognition with word offsets.
        let words = self
            .speech
            .transcribe(&wav_path, duration_seconds, &request.language_code)
            .await?;
        progress(70);
        Self::check_cancelled(&cancelled)?;

        let word_count = words.len();
        if word_count == 0 {
            warn!("Speech recognition returned no words");
        }

        // Step 4: pause segmentation and formatting.
        let segments = segment::segment_words(&words);
        let body = format::render_script_body(&segments, request.breath_detection);
        progress(80);

        // Step 5: optional LLM reformatting.
        let mut final_body = body;
        let mut postprocessed = false;
        if request.use_postprocess {
            if let Some(postprocessor) = &self.postprocessor {
                Self::check_cancelled(&cancelled)?;
                match postprocessor
                    .process(&final_body, request.postprocess_model.as_deref())
                    .await
                {
                    Ok(reformatted) => {
                        final_body = reformatted;
                        postprocessed = true;
                    }
                    Err(e) => warn!("Post-processing failed, keeping raw transcript: {e}"),
                }
            } else {
                warn!("Post-processing requested but no LLM is configured");
            }
        }
        progress(90);

        // Step 6: save the finalized transcript.
        let transcript_file = format::write_transcript(
            &self.data_dir,
            &request.job_id,
            &source.title,
            &final_body,
            postprocessed.then(|| {
                request
                    .postprocess_model
                    .clone()
                    .unwrap_or_else(|| crate::llm::models::AUTO_DETECT.to_string())
            }),
            duration_seconds,
        )?;
        progress(95);

        // Step 7: remove intermediate audio.
        for temp in temp_files {
            if temp.exists() {
                if let Err(e) = std::fs::remove_file(&temp) {
                    warn!("Failed to remove temp audio {}: {e}", temp.display());
                }
            }
        }
        progress(100);

        Ok(TranscriptionResult {
            transcript_file,
            video_title: source.title,
            duration_seconds,
            language: request.language_code.clone(),
            word_count,
            postprocessed,
            estimated_cost: duration_seconds / 60.0 * TRANSCRIPTION_COST_PER_MINUTE,
        })
    }
}
