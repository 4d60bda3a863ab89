use crate::error::{DubberError, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Process-wide Google access-token cache.
///
/// The token is fetched lazily on first use and invalidated whenever a
/// caller observes an authentication failure; the next call re-fetches.
pub struct AccessTokenCache {
    token: Mutex<Option<String>>,
}

impl AccessTokenCache {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }

    /// Return the cached token, fetching one if the cache is empty.
    pub async fn token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let token = fetch_token().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token after an authentication failure.
    pub async fn invalidate(&self) {
        warn!("Invalidating cached Google access token");
        let mut guard = self.token.lock().await;
        *guard = None;
    }
}

impl Default for AccessTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch an access token from the environment, falling back to the gcloud
/// CLI when `GOOGLE_ACCESS_TOKEN` is not set.
async fn fetch_token() -> Result<String> {
    if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
        if !token.trim().is_empty() {
            debug!("Using access token from GOOGLE_ACCESS_TOKEN");
            return Ok(token.trim().to_string());
        }
    }

    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| {
            DubberError::Config(format!(
                "No GOOGLE_ACCESS_TOKEN set and gcloud not runnable: {e}"
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DubberError::Config(format!(
            "gcloud auth print-access-token failed: {}",
            stderr.trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(DubberError::Config(
            "gcloud returned an empty access token".to_string(),
        ));
    }

    Ok(token)
}
