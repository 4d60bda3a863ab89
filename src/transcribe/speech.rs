//! Remote speech-to-text client. Small files go inline through the
//! synchronous endpoint; larger ones are staged in a GCS bucket and run
//! through the long-running endpoint with operation polling.

use crate::auth::AccessTokenCache;
use crate::error::{DubberError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://speech.googleapis.com/v1";
const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";

/// Inline requests are limited to this payload size.
const SYNC_SIZE_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
/// Inline requests are limited to roughly a minute of audio.
const SYNC_DURATION_LIMIT_SECONDS: f64 = 60.0;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

/// Long-running operations are polled at this interval, bounded overall by
/// the orchestrator's stage deadline.
const POLL_INTERVAL: Duration = Duration::from_secs(10);
const MAX_POLLS: u32 = 180;

/// One recognized word with its clock offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct WordInfo {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

pub struct SpeechClient {
    client: reqwest::Client,
    tokens: Arc<AccessTokenCache>,
    base_url: String,
    storage_url: String,
    gcs_bucket: Option<String>,
}

impl SpeechClient {
    pub fn new(tokens: Arc<AccessTokenCache>, gcs_bucket: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            base_url: DEFAULT_BASE_URL.to_string(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            gcs_bucket,
        }
    }

    /// Point the client at different endpoints (tests use a mock server).
    pub fn with_base_urls(
        mut self,
        base_url: impl Into<String>,
        storage_url: impl Into<String>,
    ) -> Self {
        self.base_url = base_url.into();
        self.storage_url = storage_url.into();
        self
    }

    fn recognition_config(language_code: &str) -> RecognitionConfig {
        RecognitionConfig {
            encoding: "LINEAR16".to_string(),
            sample_rate_hertz: 16_000,
            language_code: language_code.to_string(),
            enable_word_time_offsets: true,
            enable_automatic_punctuation: true,
        }
    }

    /// Transcribe a LINEAR16 WAV file into word-level offsets.
    pub async fn transcribe(
        &self,
        wav_path: &Path,
        duration_seconds: f64,
        language_code: &str,
    ) -> Result<Vec<WordInfo>> {
        let size = std::fs::metadata(wav_path)?.len();
        let use_async =
            size > SYNC_SIZE_LIMIT_BYTES || duration_seconds > SYNC_DURATION_LIMIT_SECONDS;

        let response = if use_async {
            self.transcribe_long(wav_path, language_code).await?
        } else {
            self.transcribe_short(wav_path, language_code).await?
        };

        Ok(collect_words(response))
    }

    async fn transcribe_short(
        &self,
        wav_path: &Path,
        language_code: &str,
    ) -> Result<RecognizeResponse> {
        debug!("Synchronous recognition for {}", wav_path.display());
        let audio_bytes = tokio::fs::read(wav_path).await?;
        let content = base64::engine::general_purpose::STANDARD.encode(&audio_bytes);

        let request = RecognizeRequest {
            config: Self::recognition_config(language_code),
            audio: RecognitionAudio {
                content: Some(content),
                uri: None,
            },
        };

        let url = format!("{}/speech:recognize", self.base_url);
        self.post_with_retry(&url, &request).await
    }

    async fn transcribe_long(
        &self,
        wav_path: &Path,
        language_code: &str,
    ) -> Result<RecognizeResponse> {
        let bucket = self.gcs_bucket.as_ref().ok_or_else(|| {
            DubberError::TranscriptionFailed(
                "Audio exceeds inline limits and no GCS bucket is configured".to_string(),
            )
        })?;

        let object = format!(
            "dubber/{}.wav",
            uuid::Uuid::new_v4().simple()
        );
        let gcs_uri = format!("gs://{bucket}/{object}");
        info!("Staging large audio to {gcs_uri}");

        self.upload_to_gcs(wav_path, bucket, &object).await?;

        let request = RecognizeRequest {
            config: Self::recognition_config(language_code),
            audio: RecognitionAudio {
                content: None,
                uri: Some(gcs_uri.clone()),
            },
        };

        let url = format!("{}/speech:longrunningrecognize", self.base_url);
        let started: OperationHandle = self.post_with_retry(&url, &request).await?;

        let result = self.poll_operation(&started.name).await;
        self.delete_gcs_object(bucket, &object).await;
        result
    }

    async fn upload_to_gcs(&self, wav_path: &Path, bucket: &str, object: &str) -> Result<()> {
        let url = format!(
            "{}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={object}",
            self.storage_url
        );
        let bytes = tokio::fs::read(wav_path).await?;
        let token = self.tokens.token().await?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Content-Type", "audio/wav")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 {
            self.tokens.invalidate().await;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DubberError::TranscriptionFailed(format!(
                "GCS upload failed ({status}): {body}"
            )));
        }
        Ok(())
    }

    async fn delete_gcs_object(&self, bucket: &str, object: &str) {
        let url = format!("{}/storage/v1/b/{bucket}/o/{object}", self.storage_url);
        let Ok(token) = self.tokens.token().await else {
            return;
        };
        if let Err(e) = self.client.delete(&url).bearer_auth(&token).send().await {
            warn!("Failed to delete staged audio from GCS: {e}");
        }
    }

    async fn poll_operation(&self, name: &str) -> Result<RecognizeResponse> {
        let url = format!("{}/operations/{name}", self.base_url);

        for _ in 0..MAX_POLLS {
            tokio::time::sleep(POLL_INTERVAL).await;

            let token = self.tokens.token().await?;
            let response = self.client.get(&url).bearer_auth(&token).send().await?;
            let status = response.status();

            if status.as_u16() == 401 {
                self.tokens.invalidate().await;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DubberError::TranscriptionFailed(format!(
                    "Operation poll failed ({status}): {body}"
                )));
            }

            let operation: Operation = response.json().await?;
            if let Some(error) = operation.error {
                return Err(DubberError::TranscriptionFailed(format!(
                    "Recognition operation failed: {}",
                    error.message
                )));
            }
            if operation.done {
                return operation.response.ok_or_else(|| {
                    DubberError::TranscriptionFailed(
                        "Recognition operation finished without a response".to_string(),
                    )
                });
            }
            debug!("Recognition operation still running");
        }

        Err(DubberError::TranscriptionFailed(
            "Recognition operation did not finish in time".to_string(),
        ))
    }

    async fn post_with_retry<T, R>(&self, url: &str, request: &T) -> Result<R>
    where
        T: Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let mut last_error: Option<DubberError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Speech API retry attempt {} after {}ms", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let token = self.tokens.token().await?;
            let response = self
                .client
                .post(url)
                .bearer_auth(&token)
                .json(request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json().await?);
                    }

                    let body = resp.text().await.unwrap_or_default();
                    if status.as_u16() == 401 {
                        self.tokens.invalidate().await;
                        return Err(DubberError::ProviderNotAvailable(format!(
                            "Speech API authentication failed: {body}"
                        )));
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!("Speech API transient error ({status}): {body}");
                        last_error = Some(DubberError::TranscriptionFailed(format!(
                            "Speech API error {status}: {body}"
                        )));
                        continue;
                    }
                    return Err(DubberError::TranscriptionFailed(format!(
                        "Speech API error ({status}): {body}"
                    )));
                }
                Err(e) => {
                    warn!("Speech API request failed: {e}");
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DubberError::TranscriptionFailed("Unknown Speech API error".into())))
    }
}

fn collect_words(response: RecognizeResponse) -> Vec<WordInfo> {
    let mut words = Vec::new();
    for result in response.results {
        let Some(alternative) = result.alternatives.into_iter().next() else {
            continue;
        };
        for word in alternative.words {
            words.push(WordInfo {
                start: parse_offset(&word.start_time),
                end: parse_offset(&word.end_time),
                word: word.word,
            });
        }
    }
    words
}

/// Offsets arrive as `"12.500s"`.
fn parse_offset(offset: &str) -> f64 {
    offset.trim_end_matches('s').parse().unwrap_or(0.0)
}

// Request/Response types

#[derive(Serialize)]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Serialize)]
struct RecognitionConfig {
    encoding: String,
    #[serde(rename = "sampleRateHertz")]
    sample_rate_hertz: u32,
    #[serde(rename = "languageCode")]
    language_code: String,
    #[serde(rename = "enableWordTimeOffsets")]
    enable_word_time_offsets: bool,
    #[serde(rename = "enableAutomaticPunctuation")]
    enable_automatic_punctuation: bool,
}

#[derive(Serialize)]
struct RecognitionAudio {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    words: Vec<ResponseWord>,
}

#[derive(Deserialize)]
struct ResponseWord {
    word: String,
    #[serde(rename = "startTime", default)]
    start_time: String,
    #[serde(rename = "endTime", default)]
    end_time: String,
}

#[derive(Deserialize)]
struct OperationHandle {
    name: String,
}

#[derive(Deserialize)]
struct Operation {
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<RecognizeResponse>,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}
