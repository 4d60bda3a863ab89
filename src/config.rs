use crate::error::{DubberError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-wide configuration, merged from an optional TOML file and
/// environment variables. Environment wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ElevenLabs API key (premium TTS provider).
    pub elevenlabs_api_key: Option<String>,
    /// Path to a Google service-account credentials file (speech + TTS).
    pub google_credentials_path: Option<PathBuf>,
    /// Vertex AI project id for LLM translation / post-processing.
    pub vertex_project_id: Option<String>,
    /// Preferred Vertex AI region; prepended to the default fallback order.
    pub vertex_region: Option<String>,
    /// Optional GCS bucket for async large-file transcription.
    pub gcs_bucket: Option<String>,
    /// Directory for finalized artifacts (transcripts, audio, video).
    pub data_dir: PathBuf,
    /// Directory for per-job temp files.
    pub temp_dir: PathBuf,
    /// Bounded concurrency for chunked synthesis.
    pub max_parallel_synthesis: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elevenlabs_api_key: None,
            google_credentials_path: None,
            vertex_project_id: None,
            vertex_region: None,
            gcs_bucket: None,
            data_dir: PathBuf::from("data"),
            temp_dir: std::env::temp_dir().join("dubber"),
            max_parallel_synthesis: 4,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Override with environment variables
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            config.elevenlabs_api_key = Some(key);
        }
        if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            config.google_credentials_path = Some(PathBuf::from(path));
        }
        if let Ok(project) = std::env::var("VERTEX_PROJECT_ID") {
            config.vertex_project_id = Some(project);
        }
        if let Ok(region) = std::env::var("VERTEX_REGION") {
            config.vertex_region = Some(region);
        }
        if let Ok(bucket) = std::env::var("DUBBER_GCS_BUCKET") {
            config.gcs_bucket = Some(bucket);
        }
        if let Ok(dir) = std::env::var("DUBBER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DUBBER_TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Ok(n) = std::env::var("DUBBER_MAX_PARALLEL_SYNTHESIS") {
            if let Ok(n) = n.parse() {
                config.max_parallel_synthesis = n;
            }
        }

        Ok(config)
    }

    /// Validate the pieces every job needs. Provider-specific credentials
    /// are checked lazily by the provider probes instead.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_synthesis == 0 {
            return Err(DubberError::Config(
                "max_parallel_synthesis must be greater than 0".to_string(),
            ));
        }

        if let Some(bucket) = &self.gcs_bucket {
            if !is_valid_bucket_name(bucket) {
                return Err(DubberError::Config(format!(
                    "Invalid GCS bucket name: {bucket}"
                )));
            }
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dubber").join("config.toml"))
    }
}

/// GCS bucket names: 3-63 chars, lowercase alphanumerics, dashes, dots,
/// must start and end alphanumeric, no "goog" prefix or "..".
fn is_valid_bucket_name(bucket: &str) -> bool {
    let bytes = bucket.as_bytes();
    if bytes.len() < 3 || bytes.len() > 63 {
        return false;
    }
    if !bytes[0].is_ascii_lowercase() && !bytes[0].is_ascii_digit() {
        return false;
    }
    if !bytes[bytes.len() - 1].is_ascii_lowercase() && !bytes[bytes.len() - 1].is_ascii_digit() {
        return false;
    }
    if bucket.starts_with("goog") || bucket.contains("..") {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-' || *b == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_parallel_synthesis, 4);
        assert!(config.elevenlabs_api_key.is_none());
    }

    #[test]
    fn test_validate_zero_parallelism() {
        let config = Config {
            max_parallel_synthesis: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bucket_name_validation() {
        assert!(is_valid_bucket_name("audio-transcripts-2025"));
        assert!(is_valid_bucket_name("my.bucket.name"));
        assert!(!is_valid_bucket_name("goog-reserved"));
        assert!(!is_valid_bucket_name("UPPER"));
        assert!(!is_valid_bucket_name("a..b"));
        assert!(!is_valid_bucket_name("-leading"));
        assert!(!is_valid_bucket_name("xy"));
    }

    #[test]
    fn test_validate_bad_bucket() {
        let config = Config {
            gcs_bucket: Some("Bad_Bucket".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
